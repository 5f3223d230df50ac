//! Import request configuration.
//!
//! [`ImageImportRequest`] is the validated configuration aggregate the
//! whole pipeline reads from. It is constructed once from user input,
//! normalized ([`ImageImportRequest::fix_byol_and_os`]), validated, and
//! never mutated afterwards.

mod source;

pub use source::Source;

use crate::errors::{DiskliftError, DiskliftResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const BYOL_SUFFIX: &str = "-byol";

/// Which inflater composition handles file sources.
///
/// Both orderings exist on purpose: `ShadowTested` treats the
/// engine-driven path as authoritative and runs the API path only for
/// drift telemetry; `ApiFailover` inverts the priority, falling back to
/// the engine only on unsupported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InflationStrategy {
    #[default]
    ShadowTested,
    ApiFailover,
}

/// Deployment environment settings shared by every remote job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    pub project: String,
    pub zone: String,
    pub network: String,
    pub subnet: String,
    /// Storage path for job scratch artifacts.
    pub scratch_bucket_path: String,
    /// Service account the job instances run as; empty uses the default.
    pub compute_service_account: String,
    /// Directory holding the workflow templates.
    pub workflow_dir: PathBuf,
    /// Strip external IPs from every created instance.
    pub no_external_ip: bool,
}

/// Immutable, validated import request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageImportRequest {
    /// Unique id for this execution; names transient resources.
    pub execution_id: String,
    pub environment: EnvironmentSettings,
    pub source: Option<Source>,

    pub image_name: String,
    pub family: String,
    pub description: String,
    #[serde(default)]
    pub labels: Vec<(String, String)>,

    /// Import OS identifier (e.g. `ubuntu-2004`). Empty means detect.
    #[serde(default)]
    pub os: String,
    /// Custom translation workflow path, bypassing OS detection entirely.
    #[serde(default)]
    pub custom_workflow: String,

    #[serde(default)]
    pub uefi_compatible: bool,
    #[serde(default)]
    pub data_disk: bool,
    #[serde(default)]
    pub byol: bool,
    #[serde(default)]
    pub no_guest_environment: bool,
    #[serde(default)]
    pub sysprep_windows: bool,

    /// Total wall-clock budget for the whole import.
    pub timeout: Duration,
    #[serde(default)]
    pub inflation_strategy: InflationStrategy,
}

impl ImageImportRequest {
    /// Reconcile the BYOL flag with the OS identifier. Applied before
    /// validation.
    ///
    /// When both an OS and `byol` are supplied, the licensing mode is
    /// folded into the identifier (`rhel-8` becomes `rhel-8-byol`) and the
    /// flag is cleared. An already-suffixed identifier is left as is, and
    /// `byol` without an OS is kept for detection-time suffixing.
    pub fn fix_byol_and_os(&mut self) {
        if !self.byol || self.os.is_empty() {
            return;
        }
        if !self.os.ends_with(BYOL_SUFFIX) {
            self.os.push_str(BYOL_SUFFIX);
        }
        self.byol = false;
    }

    /// Validate the request. Must pass before the pipeline starts; no
    /// resource is touched beforehand.
    pub fn validate(&self) -> DiskliftResult<()> {
        Self::require(&self.image_name, "image_name")?;
        Self::require(&self.execution_id, "execution_id")?;
        Self::require(&self.environment.project, "project")?;
        Self::require(&self.environment.zone, "zone")?;
        Self::require(&self.environment.scratch_bucket_path, "scratch_bucket_path")?;
        if self.source.is_none() {
            return Err(DiskliftError::Config("source has to be specified".into()));
        }
        if self.timeout.is_zero() {
            return Err(DiskliftError::Config("timeout has to be specified".into()));
        }

        if self.byol && (!self.os.is_empty() || self.data_disk) {
            return Err(DiskliftError::Config(
                "byol cannot be combined with os or data_disk".into(),
            ));
        }
        if !self.os.is_empty() && !self.custom_workflow.is_empty() {
            return Err(DiskliftError::Config(
                "os and custom_workflow can't be both specified".into(),
            ));
        }
        if self.data_disk && (!self.os.is_empty() || !self.custom_workflow.is_empty()) {
            return Err(DiskliftError::Config(
                "data_disk cannot be combined with os or custom_workflow".into(),
            ));
        }
        Ok(())
    }

    fn require(value: &str, field: &str) -> DiskliftResult<()> {
        if value.is_empty() {
            return Err(DiskliftError::Config(format!("{field} has to be specified")));
        }
        Ok(())
    }

    /// Name of the transient disk this import inflates into.
    pub fn transient_disk_name(&self) -> String {
        format!("disklift-{}", self.execution_id)
    }

    /// Whether the requested OS (or BYOL mode) names a Windows guest.
    pub fn is_windows(&self) -> bool {
        self.os.starts_with("windows-")
    }
}

impl Default for ImageImportRequest {
    fn default() -> Self {
        Self {
            execution_id: String::new(),
            environment: EnvironmentSettings::default(),
            source: None,
            image_name: String::new(),
            family: String::new(),
            description: String::new(),
            labels: Vec::new(),
            os: String::new(),
            custom_workflow: String::new(),
            uefi_compatible: false,
            data_disk: false,
            byol: false,
            no_guest_environment: false,
            sysprep_windows: false,
            timeout: Duration::ZERO,
            inflation_strategy: InflationStrategy::default(),
        }
    }
}
