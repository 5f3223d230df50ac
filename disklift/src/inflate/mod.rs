//! Disk inflation.
//!
//! An [`Inflater`] converts a [`Source`](crate::request::Source) into a
//! mountable cloud disk. Two concrete strategies exist (engine-driven and
//! direct-API), plus two compositions: a format-aware failover and a
//! shadow-test facade that races both purely for drift telemetry.

mod api;
mod engine;
mod failover;
mod shadow;

pub use api::ApiInflater;
pub use engine::EngineInflater;
pub use failover::FailoverInflater;
pub use shadow::{compare_inflation, ShadowTestedInflater};

use crate::cancel::Cancellable;
use crate::compute::ComputeClient;
use crate::engine::WorkflowEngine;
use crate::errors::{DiskliftError, DiskliftResult};
use crate::inspect::FileInspector;
use crate::request::{ImageImportRequest, InflationStrategy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Serial-output keys reported by inflation jobs.
pub const KEY_TARGET_SIZE_GB: &str = "target-size-gb";
pub const KEY_SOURCE_SIZE_GB: &str = "source-size-gb";
pub const KEY_IMPORT_FILE_FORMAT: &str = "import-file-format";
pub const KEY_DISK_CHECKSUM: &str = "disk-checksum";

/// Smallest disk the pipeline will create, used when source inspection
/// fails or reports less.
pub const MINIMUM_DISK_GB: i64 = 10;

/// Which implementation produced a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InflationType {
    Engine,
    Api,
}

/// The physical disk under construction. Produced by an inflater,
/// consumed (and possibly replaced) by processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentDisk {
    pub uri: String,
    pub size_gb: i64,
    pub source_gb: i64,
    /// Source artifact format as detected during inflation (e.g. `vmdk`).
    pub source_type: String,
}

/// Side-channel inflation telemetry. Never affects control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflationInfo {
    pub checksum: String,
    pub inflation_time: Duration,
    pub inflation_type: InflationType,
    pub completed_at: DateTime<Utc>,
}

impl InflationInfo {
    pub fn new(checksum: String, inflation_time: Duration, inflation_type: InflationType) -> Self {
        Self {
            checksum,
            inflation_time,
            inflation_type,
            completed_at: Utc::now(),
        }
    }
}

/// Converts a source descriptor into a persistent disk.
///
/// `inflate` must be called at most once per instance. A cancelled
/// inflater cleans up its own partial resources.
#[async_trait]
pub trait Inflater: Cancellable {
    async fn inflate(&self) -> DiskliftResult<(PersistentDisk, InflationInfo)>;

    /// Stable name of the strategy, for logs and selection tests.
    fn describe(&self) -> &'static str;
}

/// Guest OS features the created disk needs, derived from the request.
pub(crate) fn disk_features(request: &ImageImportRequest) -> Vec<crate::compute::GuestOsFeature> {
    let mut features = Vec::new();
    if request.uefi_compatible {
        features.push(crate::compute::GuestOsFeature::UefiCompatible);
    }
    if request.is_windows() {
        features.push(crate::compute::GuestOsFeature::Windows);
    }
    features
}

/// External collaborators every inflater composition draws from.
#[derive(Clone)]
pub struct InflaterEnv {
    pub engine: Arc<dyn WorkflowEngine>,
    pub compute: Arc<dyn ComputeClient>,
    pub file_inspector: Arc<dyn FileInspector>,
}

/// Select and build the inflater for a request.
///
/// Image sources always use the engine-driven inflater (the API path
/// cannot start from an image). File sources use the configured strategy
/// composition.
pub fn new_inflater(
    request: &ImageImportRequest,
    env: &InflaterEnv,
) -> DiskliftResult<Arc<dyn Inflater>> {
    let source = request
        .source
        .as_ref()
        .ok_or_else(|| DiskliftError::Config("source has to be specified".into()))?;

    let main = EngineInflater::new(request, env.engine.clone(), env.file_inspector.clone())?;
    if source.is_image() {
        return Ok(Arc::new(main));
    }

    match request.inflation_strategy {
        InflationStrategy::ShadowTested => {
            let shadow = ApiInflater::shadow(
                request,
                env.compute.clone(),
                env.engine.clone(),
                env.file_inspector.clone(),
            );
            Ok(Arc::new(ShadowTestedInflater::new(
                Arc::new(main),
                Arc::new(shadow),
            )))
        }
        InflationStrategy::ApiFailover => {
            let api = ApiInflater::new(
                request,
                env.compute.clone(),
                env.engine.clone(),
                env.file_inspector.clone(),
            );
            Ok(Arc::new(FailoverInflater::new(
                Arc::new(api),
                Arc::new(main),
            )))
        }
    }
}
