//! Process planning.
//!
//! After inflation the [`Planner`] decides what remaining work a disk
//! needs: which translation workflow to run, which licenses and guest-OS
//! features the disk must carry. The decision combines what the user
//! asked for with what inspection found, user input always winning.

mod registry;

pub use registry::{OsRegistry, OsSettings};

use crate::compute::GuestOsFeature;
use crate::errors::{DiskliftError, DiskliftResult};
use crate::inflate::PersistentDisk;
use crate::inspect::{DiskInspector, InspectionResult};
use crate::osid::OsRelease;
use crate::request::ImageImportRequest;
use std::path::PathBuf;
use std::sync::Arc;

const BYOL_SUFFIX: &str = "-byol";

/// What a disk needs after inflation. Computed once per import.
#[derive(Debug, Clone)]
pub struct ProcessingPlan {
    pub required_licenses: Vec<String>,
    pub required_features: Vec<GuestOsFeature>,
    /// Absolute path of the translation workflow to run.
    pub translation_workflow_path: PathBuf,
    /// Release identity found by inspection, when available.
    pub detected_os: Option<OsRelease>,
}

impl ProcessingPlan {
    /// Whether the disk needs a metadata patch before translation.
    pub fn metadata_changes_required(&self) -> bool {
        !self.required_licenses.is_empty() || !self.required_features.is_empty()
    }
}

pub struct Planner {
    request: ImageImportRequest,
    inspector: Arc<dyn DiskInspector>,
    registry: Arc<OsRegistry>,
}

impl Planner {
    pub fn new(
        request: ImageImportRequest,
        inspector: Arc<dyn DiskInspector>,
        registry: Arc<OsRegistry>,
    ) -> Self {
        Self {
            request,
            inspector,
            registry,
        }
    }

    pub async fn plan(&self, disk: &PersistentDisk) -> DiskliftResult<ProcessingPlan> {
        // A custom workflow overrides everything: no inspection, no
        // registry lookup, the user owns the translation semantics.
        if !self.request.custom_workflow.is_empty() {
            return Ok(ProcessingPlan {
                required_licenses: Vec::new(),
                required_features: Vec::new(),
                translation_workflow_path: self
                    .request
                    .environment
                    .workflow_dir
                    .join(&self.request.custom_workflow),
                detected_os: None,
            });
        }

        let inspection = self.inspect(disk).await?;
        let os_id = self.effective_os_id(&inspection)?;
        let uefi_required = self.uefi_required(&inspection);

        let settings = self.registry.get(&os_id).ok_or_else(|| {
            DiskliftError::Unsupported(format!(
                "os `{os_id}` isn't supported for import; supported values: {}",
                self.registry.supported_ids().join(", ")
            ))
        })?;

        let mut features = Vec::new();
        if settings.windows {
            features.push(GuestOsFeature::Windows);
        }
        if uefi_required {
            features.push(GuestOsFeature::UefiCompatible);
        }

        Ok(ProcessingPlan {
            required_licenses: settings.licenses.clone(),
            required_features: features,
            translation_workflow_path: self
                .request
                .environment
                .workflow_dir
                .join(&settings.workflow_path),
            detected_os: inspection.os_release,
        })
    }

    /// Inspection failure is tolerated when the user named the OS
    /// themselves; detection is advisory in that case.
    async fn inspect(&self, disk: &PersistentDisk) -> DiskliftResult<InspectionResult> {
        match self.inspector.inspect(&disk.uri).await {
            Ok(result) => {
                tracing::debug!(
                    disk = %disk.uri,
                    os_count = result.os_count,
                    bios_bootable = result.bios_bootable,
                    uefi_bootable = result.uefi_bootable,
                    "disk inspection finished"
                );
                Ok(result)
            }
            Err(err) if !self.request.os.is_empty() => {
                tracing::warn!(
                    disk = %disk.uri,
                    error = %err,
                    "disk inspection failed, continuing with the specified OS"
                );
                Ok(InspectionResult::default())
            }
            Err(err) => Err(err),
        }
    }

    fn effective_os_id(&self, inspection: &InspectionResult) -> DiskliftResult<String> {
        if !self.request.os.is_empty() {
            return Ok(self.request.os.clone());
        }
        if inspection.os_count == 1 {
            if let Some(detected) = &inspection.os_release {
                let mut id = detected.as_import_id();
                if self.request.byol {
                    id.push_str(BYOL_SUFFIX);
                }
                tracing::info!(os = %id, "using detected operating system");
                return Ok(id);
            }
        }
        Err(DiskliftError::Config(
            "could not determine the operating system on the disk; \
             re-run the import specifying the OS explicitly"
                .into(),
        ))
    }

    fn uefi_required(&self, inspection: &InspectionResult) -> bool {
        if self.request.uefi_compatible {
            return true;
        }
        if inspection.uefi_bootable && inspection.bios_bootable {
            // Hybrid GPT boots either way; BIOS is the safer default.
            tracing::info!(
                "disk is bootable via both BIOS and UEFI, defaulting to BIOS boot"
            );
            return false;
        }
        inspection.uefi_bootable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{EnvironmentSettings, Source};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct FixedInspector {
        result: DiskliftResult<InspectionResult>,
        calls: Mutex<u32>,
    }

    impl FixedInspector {
        fn ok(result: InspectionResult) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(result),
                calls: Mutex::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                result: Err(DiskliftError::Inspection("inspection instance died".into())),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl DiskInspector for FixedInspector {
        async fn inspect(&self, _disk_uri: &str) -> DiskliftResult<InspectionResult> {
            *self.calls.lock() += 1;
            match &self.result {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(DiskliftError::Inspection(e.to_string())),
            }
        }
    }

    fn request() -> ImageImportRequest {
        ImageImportRequest {
            execution_id: "exec1".into(),
            environment: EnvironmentSettings {
                project: "p".into(),
                zone: "z".into(),
                scratch_bucket_path: "gs://scratch".into(),
                workflow_dir: PathBuf::from("workflows"),
                ..Default::default()
            },
            source: Some(Source::file("gs://b/d.vmdk").unwrap()),
            image_name: "img".into(),
            timeout: Duration::from_secs(600),
            ..Default::default()
        }
    }

    fn disk() -> PersistentDisk {
        PersistentDisk {
            uri: "projects/p/zones/z/disks/disklift-exec1".into(),
            size_gb: 100,
            source_gb: 10,
            source_type: "vmdk".into(),
        }
    }

    fn planner(request: ImageImportRequest, inspector: Arc<FixedInspector>) -> Planner {
        Planner::new(request, inspector, Arc::new(OsRegistry::default()))
    }

    #[tokio::test]
    async fn test_custom_workflow_skips_inspection() {
        let mut req = request();
        req.custom_workflow = "my_translate.wf.json".into();
        let inspector = FixedInspector::ok(InspectionResult::default());
        let plan = planner(req, inspector.clone()).plan(&disk()).await.unwrap();

        assert_eq!(
            plan.translation_workflow_path,
            PathBuf::from("workflows/my_translate.wf.json")
        );
        assert!(!plan.metadata_changes_required());
        assert_eq!(*inspector.calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_user_os_wins_over_detection() {
        let mut req = request();
        req.os = "rhel-8".into();
        let inspector = FixedInspector::ok(InspectionResult {
            os_count: 1,
            os_release: Some(OsRelease::new("debian", "11", "")),
            bios_bootable: true,
            uefi_bootable: false,
        });
        let plan = planner(req, inspector).plan(&disk()).await.unwrap();

        assert!(plan
            .translation_workflow_path
            .to_string_lossy()
            .contains("rhel_8"));
        assert_eq!(plan.detected_os, Some(OsRelease::new("debian", "11", "")));
    }

    #[tokio::test]
    async fn test_single_detected_os_used_with_byol_suffix() {
        let mut req = request();
        req.byol = true;
        let inspector = FixedInspector::ok(InspectionResult {
            os_count: 1,
            os_release: Some(OsRelease::new("rhel", "8", "")),
            bios_bootable: true,
            uefi_bootable: false,
        });
        let plan = planner(req, inspector).plan(&disk()).await.unwrap();

        assert!(plan
            .translation_workflow_path
            .to_string_lossy()
            .contains("rhel_8_byol"));
    }

    #[tokio::test]
    async fn test_no_os_anywhere_is_fatal_with_remediation() {
        let inspector = FixedInspector::ok(InspectionResult::default());
        let err = planner(request(), inspector)
            .plan(&disk())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("specifying the OS"), "{err}");
    }

    #[tokio::test]
    async fn test_inspection_failure_tolerated_with_user_os() {
        let mut req = request();
        req.os = "debian-11".into();
        let plan = planner(req, FixedInspector::failing())
            .plan(&disk())
            .await
            .unwrap();
        assert!(plan
            .translation_workflow_path
            .to_string_lossy()
            .contains("debian_11"));
        assert!(plan.detected_os.is_none());
    }

    #[tokio::test]
    async fn test_inspection_failure_escalated_without_user_os() {
        let err = planner(request(), FixedInspector::failing())
            .plan(&disk())
            .await
            .unwrap_err();
        assert!(matches!(err, DiskliftError::Inspection(_)));
    }

    #[tokio::test]
    async fn test_hybrid_boot_defaults_to_bios() {
        let inspector = FixedInspector::ok(InspectionResult {
            os_count: 1,
            os_release: Some(OsRelease::new("ubuntu", "20", "04")),
            bios_bootable: true,
            uefi_bootable: true,
        });
        let plan = planner(request(), inspector).plan(&disk()).await.unwrap();
        assert!(!plan.required_features.contains(&GuestOsFeature::UefiCompatible));
    }

    #[tokio::test]
    async fn test_uefi_only_disk_requires_feature() {
        let inspector = FixedInspector::ok(InspectionResult {
            os_count: 1,
            os_release: Some(OsRelease::new("ubuntu", "20", "04")),
            bios_bootable: false,
            uefi_bootable: true,
        });
        let plan = planner(request(), inspector).plan(&disk()).await.unwrap();
        assert!(plan.required_features.contains(&GuestOsFeature::UefiCompatible));
    }

    #[tokio::test]
    async fn test_explicit_uefi_flag_wins() {
        let mut req = request();
        req.uefi_compatible = true;
        let inspector = FixedInspector::ok(InspectionResult {
            os_count: 1,
            os_release: Some(OsRelease::new("ubuntu", "20", "04")),
            bios_bootable: true,
            uefi_bootable: true,
        });
        let plan = planner(req, inspector).plan(&disk()).await.unwrap();
        assert!(plan.required_features.contains(&GuestOsFeature::UefiCompatible));
    }

    #[tokio::test]
    async fn test_windows_id_adds_windows_feature() {
        let mut req = request();
        req.os = "windows-2019".into();
        let inspector = FixedInspector::ok(InspectionResult::default());
        let plan = planner(req, inspector).plan(&disk()).await.unwrap();
        assert!(plan.required_features.contains(&GuestOsFeature::Windows));
        assert!(plan.metadata_changes_required());
    }

    #[tokio::test]
    async fn test_unsupported_os_enumerates_registry() {
        let mut req = request();
        req.os = "plan9-4".into();
        let inspector = FixedInspector::ok(InspectionResult::default());
        let err = planner(req, inspector).plan(&disk()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("plan9-4"));
        assert!(message.contains("ubuntu-2004"), "{message}");
    }
}
