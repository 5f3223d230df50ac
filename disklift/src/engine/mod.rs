//! Workflow engine boundary.
//!
//! The remote workflow engine runs a declarative job graph against cloud
//! compute/storage resources. Its semantics are opaque to this crate; the
//! pipeline only loads job templates, binds variables, runs jobs, and
//! reads key/value pairs back from serial-console output.

use crate::compute::DiskDefinition;
use crate::errors::{DiskliftError, DiskliftResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Key/value pairs read back from a job's serial-console output.
pub type SerialValues = BTreeMap<String, String>;

/// An instance created by a workflow job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDefinition {
    pub name: String,
    pub machine_type: String,
    /// Names of disks attached to this instance, boot disk first.
    #[serde(default)]
    pub attached_disks: Vec<String>,
    /// Whether the instance gets an external IP.
    #[serde(default = "default_external_ip")]
    pub external_ip: bool,
}

// Matches the serde default: instances get an external IP unless a hook
// strips it.
impl Default for InstanceDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            machine_type: String::new(),
            attached_disks: Vec::new(),
            external_ip: true,
        }
    }
}

fn default_external_ip() -> bool {
    true
}

/// A workflow job: template identity plus the bindings and resource
/// definitions the engine will realize.
///
/// Hooks mutate a `JobSpec` before each run attempt; the engine treats it
/// as read-only input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub project: String,
    pub zone: String,
    /// Scratch storage path for job intermediates.
    pub scratch_path: String,
    pub network: String,
    pub subnet: String,
    pub service_account: String,
    /// Variable bindings applied to the template.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Variables the template requires; missing bindings are a deployment
    /// error, not a user error.
    #[serde(default)]
    pub required_vars: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub create_disks: Vec<DiskDefinition>,
    #[serde(default)]
    pub create_instances: Vec<InstanceDefinition>,
}

impl JobSpec {
    /// Bindings missing for required template variables.
    pub fn missing_required_vars(&self) -> Vec<&str> {
        self.required_vars
            .iter()
            .filter(|v| !self.vars.contains_key(v.as_str()))
            .map(|v| v.as_str())
            .collect()
    }
}

/// Outcome of one job run.
///
/// Serial values are populated even when the run fails, so callers can
/// recover partial results (e.g. the OS detected before translation broke).
#[derive(Debug)]
pub struct JobOutcome {
    pub serial_values: SerialValues,
    pub result: DiskliftResult<()>,
}

impl JobOutcome {
    pub fn success(serial_values: SerialValues) -> Self {
        Self {
            serial_values,
            result: Ok(()),
        }
    }

    pub fn failure(serial_values: SerialValues, err: DiskliftError) -> Self {
        Self {
            serial_values,
            result: Err(err),
        }
    }
}

/// Executes declarative workflow jobs. Treated as opaque.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Load a job template into a [`JobSpec`].
    fn load_template(&self, path: &Path) -> DiskliftResult<JobSpec>;

    /// Run a job to completion or cancellation.
    ///
    /// Cancelling `cancel` tears the job down; the engine still returns
    /// whatever serial values were observed before teardown.
    async fn run_job(&self, spec: &JobSpec, cancel: CancellationToken) -> JobOutcome;
}
