//! disklift - cloud disk-image import pipeline
//!
//! Converts an externally supplied virtual-disk artifact (raw/VMDK/VHD/
//! qcow2 file or an existing cloud image) into a cloud-native bootable
//! image: format inflation, boot-compatibility detection, OS-specific
//! translation and resource bookkeeping.
//!
//! The pipeline is a staged state machine (validate, inflate, process,
//! cleanup) driven by the [`importer::Importer`]. Cloud APIs, the remote
//! workflow engine and disk inspection are consumed through traits; real
//! transports live outside this crate.

pub mod cancel;
pub mod compute;
pub mod engine;
pub mod errors;
pub mod importer;
pub mod inflate;
pub mod inspect;
pub mod osid;
pub mod plan;
pub mod process;
pub mod request;
pub mod worker;

pub use errors::{DiskliftError, DiskliftResult};
pub use importer::{ImportStage, Importer, ImporterEnv};
pub use inflate::{InflationInfo, PersistentDisk};
pub use request::{EnvironmentSettings, ImageImportRequest, InflationStrategy, Source};
