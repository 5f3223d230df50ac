//! Engine-driven inflater.
//!
//! Runs the inflation as a workflow job: the engine creates the target
//! disk, streams the source artifact into it and reports sizes, format
//! and checksum over serial output.

use super::{
    disk_features, InflationInfo, InflationType, Inflater, PersistentDisk, KEY_DISK_CHECKSUM,
    KEY_IMPORT_FILE_FORMAT, KEY_SOURCE_SIZE_GB, KEY_TARGET_SIZE_GB, MINIMUM_DISK_GB,
};
use crate::cancel::Cancellable;
use crate::compute::disk_uri;
use crate::engine::WorkflowEngine;
use crate::errors::{DiskliftError, DiskliftResult};
use crate::inspect::FileInspector;
use crate::request::{ImageImportRequest, Source};
use crate::worker::{AddDiskFeaturesHook, Worker};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TEMPLATE_INFLATE_FILE: &str = "inflate_file.wf.json";
const TEMPLATE_INFLATE_IMAGE: &str = "inflate_image.wf.json";

/// Budget for the pre-flight source file inspection. Inspection is
/// advisory; on timeout or failure the fixed minimum size is used.
const FILE_INSPECTION_TIMEOUT: Duration = Duration::from_secs(20);

pub struct EngineInflater {
    source: Source,
    project: String,
    zone: String,
    disk_name: String,
    worker: Worker,
    file_inspector: Arc<dyn FileInspector>,
}

impl EngineInflater {
    pub fn new(
        request: &ImageImportRequest,
        engine: Arc<dyn WorkflowEngine>,
        file_inspector: Arc<dyn FileInspector>,
    ) -> DiskliftResult<Self> {
        let source = request
            .source
            .clone()
            .ok_or_else(|| DiskliftError::Config("source has to be specified".into()))?;
        let template = match source {
            Source::File { .. } => TEMPLATE_INFLATE_FILE,
            Source::Image { .. } => TEMPLATE_INFLATE_IMAGE,
        };
        let template_path = request.environment.workflow_dir.join(template);
        let worker = Worker::for_request(engine, request, &template_path)?;
        worker.add_hook(Box::new(AddDiskFeaturesHook::new(disk_features(request))));
        Ok(Self {
            source,
            project: request.environment.project.clone(),
            zone: request.environment.zone.clone(),
            disk_name: request.transient_disk_name(),
            worker,
            file_inspector,
        })
    }

    /// Compute the disk-size variables for a file source.
    ///
    /// Failure is non-fatal: sizing falls back to the fixed minimum and
    /// the engine grows the disk as needed.
    async fn disk_size_vars(&self, object_path: &str) -> (i64, i64) {
        match self
            .file_inspector
            .inspect(object_path, FILE_INSPECTION_TIMEOUT)
            .await
        {
            Ok(meta) => {
                let inflated = meta.virtual_size_gb.max(MINIMUM_DISK_GB);
                // Scratch holds the packed artifact plus ~10% headroom.
                let scratch = (meta.physical_size_gb * 11 / 10 + 1).max(MINIMUM_DISK_GB);
                (inflated, scratch)
            }
            Err(err) => {
                tracing::warn!(
                    source = object_path,
                    error = %err,
                    "source file inspection failed, using minimum disk sizes"
                );
                (MINIMUM_DISK_GB, MINIMUM_DISK_GB)
            }
        }
    }

    fn parse_size(values: &BTreeMap<String, String>, key: &str) -> DiskliftResult<i64> {
        let raw = values
            .get(key)
            .ok_or_else(|| DiskliftError::Internal(format!("job did not report `{key}`")))?;
        raw.parse::<i64>()
            .map_err(|_| DiskliftError::Internal(format!("job reported invalid `{key}`: {raw}")))
    }
}

#[async_trait]
impl Inflater for EngineInflater {
    async fn inflate(&self) -> DiskliftResult<(PersistentDisk, InflationInfo)> {
        let start = Instant::now();
        let mut vars = BTreeMap::new();
        vars.insert("disk_name".to_string(), self.disk_name.clone());
        match &self.source {
            Source::File { object_path } => {
                let (inflated_gb, scratch_gb) = self.disk_size_vars(object_path).await;
                vars.insert("source_disk_file".to_string(), object_path.clone());
                vars.insert("inflated_disk_size_gb".to_string(), inflated_gb.to_string());
                vars.insert("scratch_disk_size_gb".to_string(), scratch_gb.to_string());
            }
            Source::Image { uri } => {
                vars.insert("source_image".to_string(), uri.clone());
            }
        }

        let (values, result) = self
            .worker
            .run_and_read_serial_values(
                vars,
                &[
                    KEY_TARGET_SIZE_GB,
                    KEY_SOURCE_SIZE_GB,
                    KEY_IMPORT_FILE_FORMAT,
                    KEY_DISK_CHECKSUM,
                ],
            )
            .await;
        result?;

        let disk = PersistentDisk {
            uri: disk_uri(&self.project, &self.zone, &self.disk_name),
            size_gb: Self::parse_size(&values, KEY_TARGET_SIZE_GB)?,
            source_gb: Self::parse_size(&values, KEY_SOURCE_SIZE_GB).unwrap_or(0),
            source_type: values
                .get(KEY_IMPORT_FILE_FORMAT)
                .cloned()
                .unwrap_or_default(),
        };
        let info = InflationInfo::new(
            values.get(KEY_DISK_CHECKSUM).cloned().unwrap_or_default(),
            start.elapsed(),
            InflationType::Engine,
        );
        Ok((disk, info))
    }

    fn describe(&self) -> &'static str {
        "engine"
    }
}

#[async_trait]
impl Cancellable for EngineInflater {
    async fn cancel(&self, reason: &str) -> bool {
        self.worker.cancel(reason)
    }
}
