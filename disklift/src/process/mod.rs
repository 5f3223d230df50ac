//! Post-inflation processing.
//!
//! Processors apply the planner's decisions to an inflated disk: metadata
//! patches, OS translation, or the data-disk shortcut. Each processor
//! takes the disk produced by the previous one and may return a
//! replacement with a different URI (translation promotes a transient
//! disk into the final image).

mod bootable;
mod data_disk;
mod metadata;

pub use bootable::BootableDiskProcessor;
pub use data_disk::DataDiskProcessor;
pub use metadata::MetadataProcessor;

use crate::cancel::Cancellable;
use crate::compute::ComputeClient;
use crate::engine::WorkflowEngine;
use crate::errors::DiskliftResult;
use crate::inflate::PersistentDisk;
use crate::plan::Planner;
use crate::request::ImageImportRequest;
use async_trait::async_trait;
use std::sync::Arc;

/// One stage of post-inflation work.
///
/// `process` consumes the current disk and returns the disk the next
/// stage should operate on.
#[async_trait]
pub trait Processor: Cancellable {
    async fn process(&self, disk: PersistentDisk) -> DiskliftResult<PersistentDisk>;

    /// Stable name of the stage, for logs.
    fn describe(&self) -> &'static str;
}

/// Builds the ordered processor list for an inflated disk.
#[async_trait]
pub trait ProcessorProvider: Send + Sync {
    async fn processors_for(
        &self,
        disk: &PersistentDisk,
    ) -> DiskliftResult<Vec<Arc<dyn Processor>>>;
}

/// Plan-driven provider: data-disk imports skip planning entirely;
/// everything else gets a `[metadata?, translation]` sequence.
pub struct PlanProcessorProvider {
    request: ImageImportRequest,
    planner: Planner,
    compute: Arc<dyn ComputeClient>,
    engine: Arc<dyn WorkflowEngine>,
}

impl PlanProcessorProvider {
    pub fn new(
        request: ImageImportRequest,
        planner: Planner,
        compute: Arc<dyn ComputeClient>,
        engine: Arc<dyn WorkflowEngine>,
    ) -> Self {
        Self {
            request,
            planner,
            compute,
            engine,
        }
    }
}

#[async_trait]
impl ProcessorProvider for PlanProcessorProvider {
    async fn processors_for(
        &self,
        disk: &PersistentDisk,
    ) -> DiskliftResult<Vec<Arc<dyn Processor>>> {
        if self.request.data_disk {
            return Ok(vec![Arc::new(DataDiskProcessor::new(
                &self.request,
                self.compute.clone(),
            ))]);
        }

        let plan = self.planner.plan(disk).await?;
        let mut processors: Vec<Arc<dyn Processor>> = Vec::new();
        if plan.metadata_changes_required() {
            processors.push(Arc::new(MetadataProcessor::new(
                self.compute.clone(),
                plan.required_licenses.clone(),
                plan.required_features.clone(),
            )));
        }
        processors.push(Arc::new(BootableDiskProcessor::new(
            &self.request,
            &plan,
            self.engine.clone(),
        )?));
        Ok(processors)
    }
}
