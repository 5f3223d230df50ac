//! Data-disk processor.

use super::Processor;
use crate::cancel::Cancellable;
use crate::compute::{image_uri, ComputeClient, ImageDefinition};
use crate::errors::DiskliftResult;
use crate::inflate::PersistentDisk;
use crate::request::ImageImportRequest;
use async_trait::async_trait;
use std::sync::Arc;

/// Non-bootable path: the inflated disk becomes an image directly, with
/// request metadata and no translation job.
pub struct DataDiskProcessor {
    compute: Arc<dyn ComputeClient>,
    project: String,
    image: ImageDefinition,
}

impl DataDiskProcessor {
    pub fn new(request: &ImageImportRequest, compute: Arc<dyn ComputeClient>) -> Self {
        Self {
            compute,
            project: request.environment.project.clone(),
            image: ImageDefinition {
                name: request.image_name.clone(),
                family: request.family.clone(),
                description: request.description.clone(),
                labels: request.labels.clone(),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl Processor for DataDiskProcessor {
    async fn process(&self, disk: PersistentDisk) -> DiskliftResult<PersistentDisk> {
        let mut image = self.image.clone();
        image.source_disk_uri = disk.uri.clone();
        tracing::info!(image = %image.name, source = %disk.uri, "creating data-disk image");
        self.compute.create_image(&self.project, &image).await?;
        Ok(PersistentDisk {
            uri: image_uri(&self.project, &image.name),
            ..disk
        })
    }

    fn describe(&self) -> &'static str {
        "data-disk"
    }
}

#[async_trait]
impl Cancellable for DataDiskProcessor {
    async fn cancel(&self, reason: &str) -> bool {
        tracing::debug!(reason, "data-disk processing does not support cancellation");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{DiskDefinition, DiskResource, GuestOsFeature};
    use crate::errors::DiskliftError;
    use crate::request::{EnvironmentSettings, Source};
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::time::Duration;

    struct ImageRecorder {
        images: Mutex<Vec<ImageDefinition>>,
    }

    #[async_trait]
    impl ComputeClient for ImageRecorder {
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
            _name: &str,
            _licenses: &[String],
            _features: &[GuestOsFeature],
        ) -> DiskliftResult<()> {
            Ok(())
        }

        async fn create_image(&self, _project: &str, image: &ImageDefinition) -> DiskliftResult<()> {
            self.images.lock().push(image.clone());
            Ok(())
        }

        async fn delete_image(&self, _project: &str, _name: &str) -> DiskliftResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_creates_image_from_disk() {
        let compute = Arc::new(ImageRecorder {
            images: Mutex::new(Vec::new()),
        });
        let request = ImageImportRequest {
            execution_id: "exec1".into(),
            environment: EnvironmentSettings {
                project: "p".into(),
                zone: "z".into(),
                scratch_bucket_path: "gs://scratch".into(),
                workflow_dir: PathBuf::from("workflows"),
                ..Default::default()
            },
            source: Some(Source::file("gs://b/d.vmdk").unwrap()),
            image_name: "data-image".into(),
            family: "data".into(),
            data_disk: true,
            timeout: Duration::from_secs(600),
            ..Default::default()
        };
        let processor = DataDiskProcessor::new(&request, compute.clone());
        let disk = PersistentDisk {
            uri: "projects/p/zones/z/disks/disklift-exec1".into(),
            size_gb: 100,
            source_gb: 10,
            source_type: "vmdk".into(),
        };

        let out = processor.process(disk).await.unwrap();
        assert_eq!(out.uri, "projects/p/global/images/data-image");

        let images = compute.images.lock();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].name, "data-image");
        assert_eq!(images[0].family, "data");
        assert_eq!(
            images[0].source_disk_uri,
            "projects/p/zones/z/disks/disklift-exec1"
        );
    }
}
