//! Metadata processor.

use super::Processor;
use crate::cancel::Cancellable;
use crate::compute::{parse_disk_uri, ComputeClient, GuestOsFeature};
use crate::errors::{DiskliftError, DiskliftResult};
use crate::inflate::PersistentDisk;
use async_trait::async_trait;
use std::sync::Arc;

/// Applies the plan's licenses and guest OS features directly through
/// the compute API. No remote job, no disk replacement.
pub struct MetadataProcessor {
    compute: Arc<dyn ComputeClient>,
    licenses: Vec<String>,
    features: Vec<GuestOsFeature>,
}

impl MetadataProcessor {
    pub fn new(
        compute: Arc<dyn ComputeClient>,
        licenses: Vec<String>,
        features: Vec<GuestOsFeature>,
    ) -> Self {
        Self {
            compute,
            licenses,
            features,
        }
    }
}

#[async_trait]
impl Processor for MetadataProcessor {
    async fn process(&self, disk: PersistentDisk) -> DiskliftResult<PersistentDisk> {
        let (project, zone, name) = parse_disk_uri(&disk.uri).ok_or_else(|| {
            DiskliftError::Internal(format!("malformed disk uri `{}`", disk.uri))
        })?;
        tracing::info!(
            disk = %disk.uri,
            licenses = ?self.licenses,
            features = ?self.features,
            "patching disk metadata"
        );
        self.compute
            .patch_disk_metadata(&project, &zone, &name, &self.licenses, &self.features)
            .await?;
        Ok(disk)
    }

    fn describe(&self) -> &'static str {
        "metadata"
    }
}

#[async_trait]
impl Cancellable for MetadataProcessor {
    async fn cancel(&self, reason: &str) -> bool {
        // A single API patch cannot be interrupted midway.
        tracing::debug!(reason, "metadata processing does not support cancellation");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{DiskDefinition, DiskResource, ImageDefinition};
    use parking_lot::Mutex;

    struct PatchRecorder {
        patches: Mutex<Vec<(String, Vec<String>, Vec<GuestOsFeature>)>>,
    }

    #[async_trait]
    impl ComputeClient for PatchRecorder {
        async fn create_disk(
            &self,
            _project: &str,
            _zone: &str,
            _disk: &DiskDefinition,
        ) -> DiskliftResult<DiskResource> {
            Err(DiskliftError::Internal("unused".into()))
        }

        async fn get_disk(
            &self,
            _project: &str,
            _zone: &str,
            _name: &str,
        ) -> DiskliftResult<DiskResource> {
            Err(DiskliftError::Internal("unused".into()))
        }

        async fn delete_disk(&self, _project: &str, _zone: &str, _name: &str) -> DiskliftResult<()> {
            Ok(())
        }

        async fn patch_disk_metadata(
            &self,
            _project: &str,
            _zone: &str,
            name: &str,
            licenses: &[String],
            features: &[GuestOsFeature],
        ) -> DiskliftResult<()> {
            self.patches
                .lock()
                .push((name.to_string(), licenses.to_vec(), features.to_vec()));
            Ok(())
        }

        async fn create_image(&self, _project: &str, _image: &ImageDefinition) -> DiskliftResult<()> {
            Ok(())
        }

        async fn delete_image(&self, _project: &str, _name: &str) -> DiskliftResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_patches_and_returns_same_disk() {
        let compute = Arc::new(PatchRecorder {
            patches: Mutex::new(Vec::new()),
        });
        let processor = MetadataProcessor::new(
            compute.clone(),
            vec!["projects/vm-images/global/licenses/rhel-8-server".into()],
            vec![GuestOsFeature::UefiCompatible],
        );
        let disk = PersistentDisk {
            uri: "projects/p/zones/z/disks/d".into(),
            size_gb: 100,
            source_gb: 10,
            source_type: "vmdk".into(),
        };

        let out = processor.process(disk.clone()).await.unwrap();
        assert_eq!(out, disk);

        let patches = compute.patches.lock();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].0, "d");
        assert_eq!(patches[0].2, vec![GuestOsFeature::UefiCompatible]);
    }

    #[tokio::test]
    async fn test_malformed_uri_is_internal_error() {
        let compute = Arc::new(PatchRecorder {
            patches: Mutex::new(Vec::new()),
        });
        let processor = MetadataProcessor::new(compute, Vec::new(), Vec::new());
        let disk = PersistentDisk {
            uri: "not-a-disk-uri".into(),
            size_gb: 100,
            source_gb: 10,
            source_type: "vmdk".into(),
        };
        let err = processor.process(disk).await.unwrap_err();
        assert!(matches!(err, DiskliftError::Internal(_)));
    }
}
