//! Direct-API inflater.
//!
//! Creates the disk with a single compute API call referencing the source
//! storage object, skipping the workflow engine for the disk-creation
//! step. In shadow mode the created disk exists only for comparison and
//! is always deleted afterwards.

use super::{
    disk_features, InflationInfo, InflationType, Inflater, PersistentDisk, KEY_DISK_CHECKSUM,
};
use crate::cancel::Cancellable;
use crate::compute::{ComputeClient, DiskDefinition};
use crate::engine::WorkflowEngine;
use crate::errors::{DiskliftError, DiskliftResult};
use crate::inspect::FileInspector;
use crate::request::{ImageImportRequest, Source};
use crate::worker::Worker;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TEMPLATE_COMPUTE_CHECKSUM: &str = "compute_checksum.wf.json";

/// Budget for the advisory source-size inspection.
const FILE_INSPECTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Source formats whose API-side inflation reorders content, making a
/// checksum comparison against the engine path meaningless.
const CHECKSUM_DEFEATING_FORMATS: &[&str] = &["vhd", "vhdx"];

pub struct ApiInflater {
    request: ImageImportRequest,
    compute: Arc<dyn ComputeClient>,
    engine: Arc<dyn WorkflowEngine>,
    file_inspector: Arc<dyn FileInspector>,
    disk_name: String,
    shadow: bool,
    started: AtomicBool,
    cancelled: AtomicBool,
}

impl ApiInflater {
    pub fn new(
        request: &ImageImportRequest,
        compute: Arc<dyn ComputeClient>,
        engine: Arc<dyn WorkflowEngine>,
        file_inspector: Arc<dyn FileInspector>,
    ) -> Self {
        Self::build(request, compute, engine, file_inspector, false)
    }

    /// Shadow variant: the disk is named apart from the authoritative one
    /// and always deleted after inflation.
    pub fn shadow(
        request: &ImageImportRequest,
        compute: Arc<dyn ComputeClient>,
        engine: Arc<dyn WorkflowEngine>,
        file_inspector: Arc<dyn FileInspector>,
    ) -> Self {
        Self::build(request, compute, engine, file_inspector, true)
    }

    fn build(
        request: &ImageImportRequest,
        compute: Arc<dyn ComputeClient>,
        engine: Arc<dyn WorkflowEngine>,
        file_inspector: Arc<dyn FileInspector>,
        shadow: bool,
    ) -> Self {
        let disk_name = if shadow {
            format!("shadow-{}", request.transient_disk_name())
        } else {
            request.transient_disk_name()
        };
        Self {
            request: request.clone(),
            compute,
            engine,
            file_inspector,
            disk_name,
            shadow,
            started: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    fn object_path(&self) -> DiskliftResult<&str> {
        match &self.request.source {
            Some(Source::File { object_path }) => Ok(object_path),
            _ => Err(DiskliftError::Internal(
                "API inflation requires a file source".into(),
            )),
        }
    }

    /// Source format guessed from the object name; the authoritative
    /// format comes from the engine path's serial output.
    fn source_format(&self) -> String {
        self.object_path()
            .ok()
            .and_then(|p| p.rsplit('.').next())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn checksum_comparable(&self) -> bool {
        !CHECKSUM_DEFEATING_FORMATS.contains(&self.source_format().as_str())
    }

    async fn do_inflate(&self) -> DiskliftResult<(PersistentDisk, InflationInfo)> {
        let start = Instant::now();
        let object_path = self.object_path()?.to_string();
        let definition = DiskDefinition {
            name: self.disk_name.clone(),
            source_storage_object: Some(object_path.clone()),
            guest_os_features: disk_features(&self.request),
            ..Default::default()
        };
        let created = self
            .compute
            .create_disk(
                &self.request.environment.project,
                &self.request.environment.zone,
                &definition,
            )
            .await?;

        let source_gb = match self
            .file_inspector
            .inspect(&object_path, FILE_INSPECTION_TIMEOUT)
            .await
        {
            Ok(meta) => meta.physical_size_gb,
            Err(err) => {
                tracing::warn!(source = %object_path, error = %err, "source size unavailable");
                0
            }
        };

        let checksum = if self.shadow && self.checksum_comparable() {
            self.compute_checksum().await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "checksum computation failed");
                String::new()
            })
        } else {
            String::new()
        };

        let disk = PersistentDisk {
            uri: created.uri,
            size_gb: created.size_gb,
            source_gb,
            source_type: self.source_format(),
        };
        let info = InflationInfo::new(checksum, start.elapsed(), InflationType::Api);
        Ok((disk, info))
    }

    /// Run the checksum job against the freshly created disk.
    async fn compute_checksum(&self) -> DiskliftResult<String> {
        let template_path = self
            .request
            .environment
            .workflow_dir
            .join(TEMPLATE_COMPUTE_CHECKSUM);
        let worker = Worker::for_request(self.engine.clone(), &self.request, &template_path)?;
        let mut vars = BTreeMap::new();
        vars.insert("disk_name".to_string(), self.disk_name.clone());
        let (values, result) = worker
            .run_and_read_serial_values(vars, &[KEY_DISK_CHECKSUM])
            .await;
        result?;
        values
            .get(KEY_DISK_CHECKSUM)
            .cloned()
            .ok_or_else(|| DiskliftError::Internal("checksum job reported no checksum".into()))
    }

    async fn delete_disk_best_effort(&self) {
        let project = &self.request.environment.project;
        let zone = &self.request.environment.zone;
        if let Err(err) = self.compute.delete_disk(project, zone, &self.disk_name).await {
            if !err.is_not_found() {
                tracing::warn!(disk = %self.disk_name, error = %err, "failed to delete API-inflated disk");
            }
        }
    }

    /// Confirm the disk is gone; a 404 on read is the confirmation.
    async fn verify_deleted(&self) -> bool {
        let project = &self.request.environment.project;
        let zone = &self.request.environment.zone;
        match self.compute.get_disk(project, zone, &self.disk_name).await {
            Err(err) if err.is_not_found() => true,
            Ok(_) => {
                tracing::warn!(disk = %self.disk_name, "disk still present after cancellation cleanup");
                false
            }
            Err(err) => {
                tracing::warn!(disk = %self.disk_name, error = %err, "cleanup verification inconclusive");
                false
            }
        }
    }
}

#[async_trait]
impl Inflater for ApiInflater {
    async fn inflate(&self) -> DiskliftResult<(PersistentDisk, InflationInfo)> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DiskliftError::Internal(
                "inflater instances are single-use; inflate was called twice".into(),
            ));
        }
        let result = self.do_inflate().await;
        if self.shadow {
            // Shadow disks exist only for comparison.
            self.delete_disk_best_effort().await;
        }
        result
    }

    fn describe(&self) -> &'static str {
        "api"
    }
}

#[async_trait]
impl Cancellable for ApiInflater {
    async fn cancel(&self, reason: &str) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return true;
        }
        tracing::info!(disk = %self.disk_name, reason, "cancelling API inflation");
        self.delete_disk_best_effort().await;
        self.verify_deleted().await
    }
}
