//! Bootable-disk processor.
//!
//! Runs the plan's translation workflow through a worker: a translation
//! instance boots with the imported disk attached, customizes the guest
//! and promotes the result into the final image. On failure the error may
//! be rewritten into a detection-mismatch diagnostic when the OS found
//! during translation disagrees with what the user specified.

use super::Processor;
use crate::cancel::Cancellable;
use crate::compute::{image_uri, parse_disk_uri};
use crate::engine::{JobSpec, WorkflowEngine};
use crate::errors::{DiskliftError, DiskliftResult};
use crate::inflate::PersistentDisk;
use crate::osid::OsRelease;
use crate::plan::ProcessingPlan;
use crate::request::ImageImportRequest;
use crate::worker::{Worker, WorkerHook};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

const KEY_DETECTED_DISTRO: &str = "detected_distro";
const KEY_DETECTED_MAJOR: &str = "detected_major_version";
const KEY_DETECTED_MINOR: &str = "detected_minor_version";

/// Attaches named disks to every instance the translation job creates,
/// after the boot disk.
struct AttachDisksHook {
    disk_names: Vec<String>,
}

impl WorkerHook for AttachDisksHook {
    fn name(&self) -> &'static str {
        "attach-disks"
    }

    fn supports_pre_run(&self) -> bool {
        true
    }

    fn pre_run(&mut self, job: &mut JobSpec) -> DiskliftResult<()> {
        for instance in &mut job.create_instances {
            for name in &self.disk_names {
                if !instance.attached_disks.contains(name) {
                    instance.attached_disks.push(name.clone());
                }
            }
        }
        Ok(())
    }
}

pub struct BootableDiskProcessor {
    worker: Worker,
    project: String,
    image_name: String,
    family: String,
    description: String,
    install_guest_environment: bool,
    sysprep: bool,
    specified_os: String,
}

impl BootableDiskProcessor {
    pub fn new(
        request: &ImageImportRequest,
        plan: &ProcessingPlan,
        engine: Arc<dyn WorkflowEngine>,
    ) -> DiskliftResult<Self> {
        let worker = Worker::for_request(engine, request, &plan.translation_workflow_path)?;
        Ok(Self {
            worker,
            project: request.environment.project.clone(),
            image_name: request.image_name.clone(),
            family: request.family.clone(),
            description: request.description.clone(),
            install_guest_environment: !request.no_guest_environment,
            sysprep: request.sysprep_windows,
            specified_os: request.os.clone(),
        })
    }

    /// Rewrite a translation failure into a mismatch diagnostic when the
    /// user-specified OS and the one translation detected both parse and
    /// disagree. Anything less certain passes the original error through.
    fn reinterpret_failure(&self, err: DiskliftError) -> DiskliftError {
        let specified = match OsRelease::from_import_id(&self.specified_os) {
            Some(os) => os,
            None => return err,
        };
        let detected = match self.detected_os() {
            Some(os) => os,
            None => return err,
        };
        if specified.import_compatible(&detected) {
            return err;
        }
        tracing::info!(
            original_error = %err,
            detected = %detected,
            specified = %self.specified_os,
            "translation failed on a mismatched operating system"
        );
        DiskliftError::Config(format!(
            "\"{}\" was detected on your disk, but \"{}\" was specified; \
             rerun the import specifying the detected operating system",
            detected.as_import_id(),
            self.specified_os
        ))
    }

    fn detected_os(&self) -> Option<OsRelease> {
        let distro = self.worker.serial_value(KEY_DETECTED_DISTRO)?;
        let major = self.worker.serial_value(KEY_DETECTED_MAJOR)?;
        if distro.is_empty() || major.is_empty() {
            return None;
        }
        let minor = self.worker.serial_value(KEY_DETECTED_MINOR).unwrap_or_default();
        Some(OsRelease::new(distro, major, minor))
    }
}

#[async_trait]
impl Processor for BootableDiskProcessor {
    async fn process(&self, disk: PersistentDisk) -> DiskliftResult<PersistentDisk> {
        if let Some((_, _, disk_name)) = parse_disk_uri(&disk.uri) {
            self.worker.add_hook(Box::new(AttachDisksHook {
                disk_names: vec![disk_name],
            }));
        }

        let mut vars = BTreeMap::new();
        vars.insert("image_name".to_string(), self.image_name.clone());
        vars.insert("source_disk".to_string(), disk.uri.clone());
        vars.insert(
            "install_guest_environment".to_string(),
            self.install_guest_environment.to_string(),
        );
        vars.insert("sysprep".to_string(), self.sysprep.to_string());
        vars.insert("family".to_string(), self.family.clone());
        vars.insert("description".to_string(), self.description.clone());

        if let Err(err) = self.worker.run(vars).await {
            return Err(self.reinterpret_failure(err));
        }

        // Translation promoted the transient disk into the final image.
        Ok(PersistentDisk {
            uri: image_uri(&self.project, &self.image_name),
            ..disk
        })
    }

    fn describe(&self) -> &'static str {
        "bootable-disk"
    }
}

#[async_trait]
impl Cancellable for BootableDiskProcessor {
    async fn cancel(&self, reason: &str) -> bool {
        self.worker.cancel(reason)
    }
}
