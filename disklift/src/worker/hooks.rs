//! Pre/post run hooks for the workflow worker.
//!
//! Hooks form an ordered, open set. Each hook declares which phases it
//! supports via explicit `supports_pre_run`/`supports_post_run` checks;
//! the worker applies only the supported phases, in order.

use crate::compute::classify::is_caused_by_ssd_quota;
use crate::compute::{DiskType, GuestOsFeature};
use crate::engine::JobSpec;
use crate::errors::{DiskliftError, DiskliftResult};
use crate::request::EnvironmentSettings;

/// What a post-run hook wants the worker to do with a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    /// Keep the failure.
    Continue,
    /// Re-run the job once with the hook's adjustments applied.
    Retry,
}

/// A unit of job customization applied around each run attempt.
pub trait WorkerHook: Send {
    fn name(&self) -> &'static str;

    fn supports_pre_run(&self) -> bool {
        false
    }

    /// Adjust the job before a run attempt.
    fn pre_run(&mut self, _job: &mut JobSpec) -> DiskliftResult<()> {
        Ok(())
    }

    fn supports_post_run(&self) -> bool {
        false
    }

    /// Inspect a failed run; may adjust the job and request a retry.
    fn post_run(&mut self, _job: &mut JobSpec, _error: &DiskliftError) -> HookDecision {
        HookDecision::Continue
    }
}

/// Applies deployment environment settings onto the job.
pub struct ApplyEnvHook {
    env: EnvironmentSettings,
}

impl ApplyEnvHook {
    pub fn new(env: EnvironmentSettings) -> Self {
        Self { env }
    }
}

impl WorkerHook for ApplyEnvHook {
    fn name(&self) -> &'static str {
        "apply-env"
    }

    fn supports_pre_run(&self) -> bool {
        true
    }

    fn pre_run(&mut self, job: &mut JobSpec) -> DiskliftResult<()> {
        job.project = self.env.project.clone();
        job.zone = self.env.zone.clone();
        job.scratch_path = self.env.scratch_bucket_path.clone();
        job.network = self.env.network.clone();
        job.subnet = self.env.subnet.clone();
        job.service_account = self.env.compute_service_account.clone();
        Ok(())
    }
}

/// Verifies every template-required variable has a binding.
///
/// A missing binding means the deployed template and this binary disagree,
/// which is a broken deployment rather than a user mistake.
pub struct BackfillVarsHook;

impl WorkerHook for BackfillVarsHook {
    fn name(&self) -> &'static str {
        "backfill-vars"
    }

    fn supports_pre_run(&self) -> bool {
        true
    }

    fn pre_run(&mut self, job: &mut JobSpec) -> DiskliftResult<()> {
        let missing = job.missing_required_vars();
        if !missing.is_empty() {
            return Err(DiskliftError::Internal(format!(
                "job `{}` is missing required variables: {}",
                job.name,
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// Labels every created resource with the execution identity plus any
/// user-supplied labels.
pub struct LabelResourcesHook {
    execution_id: String,
    user_labels: Vec<(String, String)>,
}

impl LabelResourcesHook {
    pub fn new(execution_id: impl Into<String>, user_labels: Vec<(String, String)>) -> Self {
        Self {
            execution_id: execution_id.into(),
            user_labels,
        }
    }
}

impl WorkerHook for LabelResourcesHook {
    fn name(&self) -> &'static str {
        "label-resources"
    }

    fn supports_pre_run(&self) -> bool {
        true
    }

    fn pre_run(&mut self, job: &mut JobSpec) -> DiskliftResult<()> {
        job.labels
            .insert("disklift-execution".into(), self.execution_id.clone());
        for (k, v) in &self.user_labels {
            job.labels.insert(k.clone(), v.clone());
        }
        Ok(())
    }
}

/// Points job logging at the scratch bucket so serial output survives the
/// job's teardown.
pub struct ConfigureLoggingHook;

impl WorkerHook for ConfigureLoggingHook {
    fn name(&self) -> &'static str {
        "configure-logging"
    }

    fn supports_pre_run(&self) -> bool {
        true
    }

    fn pre_run(&mut self, job: &mut JobSpec) -> DiskliftResult<()> {
        if !job.scratch_path.is_empty() {
            job.vars
                .insert("logs_path".into(), format!("{}/logs", job.scratch_path));
        }
        Ok(())
    }
}

/// Strips external IPs from every instance the job creates.
pub struct RemoveExternalIpHook;

impl WorkerHook for RemoveExternalIpHook {
    fn name(&self) -> &'static str {
        "remove-external-ip"
    }

    fn supports_pre_run(&self) -> bool {
        true
    }

    fn pre_run(&mut self, job: &mut JobSpec) -> DiskliftResult<()> {
        for instance in &mut job.create_instances {
            instance.external_ip = false;
        }
        Ok(())
    }
}

/// Adds guest OS features to every disk the job creates.
pub struct AddDiskFeaturesHook {
    features: Vec<GuestOsFeature>,
}

impl AddDiskFeaturesHook {
    pub fn new(features: Vec<GuestOsFeature>) -> Self {
        Self { features }
    }
}

impl WorkerHook for AddDiskFeaturesHook {
    fn name(&self) -> &'static str {
        "add-disk-features"
    }

    fn supports_pre_run(&self) -> bool {
        true
    }

    fn pre_run(&mut self, job: &mut JobSpec) -> DiskliftResult<()> {
        for disk in &mut job.create_disks {
            for feature in &self.features {
                if !disk.guest_os_features.contains(feature) {
                    disk.guest_os_features.push(*feature);
                }
            }
        }
        Ok(())
    }
}

/// Falls back to standard persistent disks on SSD quota exhaustion.
///
/// Requests exactly one retry per worker instance: once the fallback is
/// applied, a second quota failure is final.
pub struct StandardDiskFallbackHook {
    fallback_applied: bool,
}

impl StandardDiskFallbackHook {
    pub fn new() -> Self {
        Self {
            fallback_applied: false,
        }
    }
}

impl Default for StandardDiskFallbackHook {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerHook for StandardDiskFallbackHook {
    fn name(&self) -> &'static str {
        "standard-disk-fallback"
    }

    fn supports_post_run(&self) -> bool {
        true
    }

    fn post_run(&mut self, job: &mut JobSpec, error: &DiskliftError) -> HookDecision {
        if self.fallback_applied || !is_caused_by_ssd_quota(error) {
            return HookDecision::Continue;
        }
        self.fallback_applied = true;
        for disk in &mut job.create_disks {
            disk.disk_type = DiskType::Standard;
        }
        tracing::warn!(
            job = %job.name,
            "SSD quota exhausted, retrying with standard persistent disks"
        );
        HookDecision::Retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::DiskDefinition;
    use crate::engine::InstanceDefinition;

    fn job_with_disks() -> JobSpec {
        JobSpec {
            name: "inflate".into(),
            create_disks: vec![
                DiskDefinition {
                    name: "scratch".into(),
                    ..Default::default()
                },
                DiskDefinition {
                    name: "target".into(),
                    ..Default::default()
                },
            ],
            create_instances: vec![InstanceDefinition {
                name: "worker".into(),
                external_ip: true,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_env_sets_job_environment() {
        let env = EnvironmentSettings {
            project: "p".into(),
            zone: "z".into(),
            scratch_bucket_path: "gs://scratch".into(),
            network: "net".into(),
            subnet: "sub".into(),
            ..Default::default()
        };
        let mut job = job_with_disks();
        ApplyEnvHook::new(env).pre_run(&mut job).unwrap();
        assert_eq!(job.project, "p");
        assert_eq!(job.zone, "z");
        assert_eq!(job.scratch_path, "gs://scratch");
        assert_eq!(job.subnet, "sub");
    }

    #[test]
    fn test_backfill_vars_reports_missing_as_internal() {
        let mut job = job_with_disks();
        job.required_vars = vec!["image_name".into()];
        let err = BackfillVarsHook.pre_run(&mut job).unwrap_err();
        assert!(matches!(err, DiskliftError::Internal(_)));
        assert!(err.to_string().contains("image_name"));
    }

    #[test]
    fn test_label_resources_merges_user_labels() {
        let mut job = job_with_disks();
        let mut hook = LabelResourcesHook::new("exec-1", vec![("team".into(), "infra".into())]);
        hook.pre_run(&mut job).unwrap();
        assert_eq!(job.labels.get("disklift-execution").unwrap(), "exec-1");
        assert_eq!(job.labels.get("team").unwrap(), "infra");
    }

    #[test]
    fn test_remove_external_ip() {
        let mut job = job_with_disks();
        RemoveExternalIpHook.pre_run(&mut job).unwrap();
        assert!(job.create_instances.iter().all(|i| !i.external_ip));
    }

    #[test]
    fn test_quota_fallback_retries_once() {
        let mut job = job_with_disks();
        let mut hook = StandardDiskFallbackHook::new();
        let quota_err = DiskliftError::Engine("Quota 'SSD_TOTAL_GB' exceeded".into());

        assert_eq!(hook.post_run(&mut job, &quota_err), HookDecision::Retry);
        assert!(job
            .create_disks
            .iter()
            .all(|d| d.disk_type == DiskType::Standard));

        // Second quota failure with the fallback already applied: final.
        assert_eq!(hook.post_run(&mut job, &quota_err), HookDecision::Continue);
    }

    #[test]
    fn test_quota_fallback_ignores_other_errors() {
        let mut job = job_with_disks();
        let mut hook = StandardDiskFallbackHook::new();
        let err = DiskliftError::Engine("instance preempted".into());
        assert_eq!(hook.post_run(&mut job, &err), HookDecision::Continue);
        assert!(job.create_disks.iter().all(|d| d.disk_type == DiskType::Ssd));
    }
}
