//! Top-level import pipeline.
//!
//! The [`Importer`] sequences validation, inflation and processing under
//! one shared deadline, owns the transient disk's cleanup obligation and
//! tracks progress through the [`ImportStage`] state machine.

mod step;

pub use step::run_step;

use crate::compute::{parse_disk_uri, ComputeClient};
use crate::engine::WorkflowEngine;
use crate::errors::{DiskliftError, DiskliftResult};
use crate::inflate::{new_inflater, Inflater, InflaterEnv, PersistentDisk};
use crate::inspect::{DiskInspector, FileInspector};
use crate::plan::{OsRegistry, Planner};
use crate::process::{PlanProcessorProvider, ProcessorProvider};
use crate::request::ImageImportRequest;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Pipeline progress. Transitions are strictly sequential; failure at
/// any stage routes through `Cleanup` before `Failed`, except validation
/// failures which touch no resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Validating,
    Inflating,
    Processing,
    Cleanup,
    Succeeded,
    Failed,
}

impl ImportStage {
    pub fn can_transition_to(&self, next: ImportStage) -> bool {
        use ImportStage::*;
        matches!(
            (self, next),
            (Validating, Inflating)
                | (Validating, Failed)
                | (Inflating, Processing)
                | (Inflating, Cleanup)
                | (Processing, Cleanup)
                | (Cleanup, Succeeded)
                | (Cleanup, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStage::Succeeded | ImportStage::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStage::Validating => "validating",
            ImportStage::Inflating => "inflating",
            ImportStage::Processing => "processing",
            ImportStage::Cleanup => "cleanup",
            ImportStage::Succeeded => "succeeded",
            ImportStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ImportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External collaborators the importer wires together.
#[derive(Clone)]
pub struct ImporterEnv {
    pub engine: Arc<dyn WorkflowEngine>,
    pub compute: Arc<dyn ComputeClient>,
    pub file_inspector: Arc<dyn FileInspector>,
    pub disk_inspector: Arc<dyn DiskInspector>,
    pub registry: Arc<OsRegistry>,
}

pub struct Importer {
    request: ImageImportRequest,
    registry: Arc<OsRegistry>,
    inflater: Arc<dyn Inflater>,
    provider: Arc<dyn ProcessorProvider>,
    compute: Arc<dyn ComputeClient>,
    cancel: CancellationToken,
    started: AtomicBool,
    stage: Mutex<ImportStage>,
}

impl Importer {
    /// Wire the full pipeline for a normalized request.
    pub fn for_request(request: ImageImportRequest, env: &ImporterEnv) -> DiskliftResult<Self> {
        let inflater = new_inflater(
            &request,
            &InflaterEnv {
                engine: env.engine.clone(),
                compute: env.compute.clone(),
                file_inspector: env.file_inspector.clone(),
            },
        )?;
        let planner = Planner::new(
            request.clone(),
            env.disk_inspector.clone(),
            env.registry.clone(),
        );
        let provider = Arc::new(PlanProcessorProvider::new(
            request.clone(),
            planner,
            env.compute.clone(),
            env.engine.clone(),
        ));
        Ok(Self::new(
            request,
            env.registry.clone(),
            inflater,
            provider,
            env.compute.clone(),
        ))
    }

    /// Assemble an importer from pre-built parts.
    pub fn new(
        request: ImageImportRequest,
        registry: Arc<OsRegistry>,
        inflater: Arc<dyn Inflater>,
        provider: Arc<dyn ProcessorProvider>,
        compute: Arc<dyn ComputeClient>,
    ) -> Self {
        Self {
            request,
            registry,
            inflater,
            provider,
            compute,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            stage: Mutex::new(ImportStage::Validating),
        }
    }

    pub fn stage(&self) -> ImportStage {
        *self.stage.lock()
    }

    /// Request cancellation of the whole import.
    pub fn cancel(&self, reason: &str) {
        tracing::info!(reason, "cancelling import");
        self.cancel.cancel();
    }

    /// Token observed by every step; exposed so callers can tie the
    /// import to their own shutdown signal.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the import to completion. Single-use.
    ///
    /// Returns the final resource: the created image for bootable and
    /// data-disk imports.
    pub async fn run(&self) -> DiskliftResult<PersistentDisk> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DiskliftError::Internal(
                "importer instances are single-use; run was called twice".into(),
            ));
        }
        let deadline = Instant::now() + self.request.timeout;

        if let Err(err) = self.validate() {
            self.enter(ImportStage::Failed);
            return Err(err);
        }

        self.enter(ImportStage::Inflating);
        let disk = match self.inflate_step(deadline).await {
            Ok(disk) => disk,
            Err(err) => {
                // The inflater owns its partial resources; nothing to
                // delete here.
                self.enter(ImportStage::Cleanup);
                self.enter(ImportStage::Failed);
                return Err(err);
            }
        };

        let processors = match self.provider.processors_for(&disk).await {
            Ok(processors) => processors,
            Err(err) => {
                self.enter(ImportStage::Cleanup);
                self.delete_transient(&disk.uri).await;
                self.enter(ImportStage::Failed);
                return Err(err);
            }
        };

        self.enter(ImportStage::Processing);
        let mut current = disk;
        for processor in processors {
            let worker = processor.clone();
            let input = current.clone();
            let result = run_step(
                processor.describe(),
                deadline,
                &self.cancel,
                processor.clone(),
                async move { worker.process(input).await },
            )
            .await;
            match result {
                Ok(next) => {
                    if next.uri != current.uri {
                        // The stage promoted the disk into a new resource;
                        // the old transient disk is no longer needed.
                        self.delete_transient(&current.uri).await;
                    }
                    current = next;
                }
                Err(err) => {
                    self.enter(ImportStage::Cleanup);
                    self.delete_transient(&current.uri).await;
                    self.enter(ImportStage::Failed);
                    return Err(err);
                }
            }
        }

        self.enter(ImportStage::Cleanup);
        self.enter(ImportStage::Succeeded);
        tracing::info!(resource = %current.uri, "import finished");
        Ok(current)
    }

    /// Pre-validation: request invariants plus OS-registry resolution, so
    /// an unsupported OS fails before any resource is touched.
    fn validate(&self) -> DiskliftResult<()> {
        self.request.validate()?;
        if !self.request.os.is_empty() && self.registry.get(&self.request.os).is_none() {
            return Err(DiskliftError::Unsupported(format!(
                "os `{}` isn't supported for import; supported values: {}",
                self.request.os,
                self.registry.supported_ids().join(", ")
            )));
        }
        Ok(())
    }

    async fn inflate_step(&self, deadline: Instant) -> DiskliftResult<PersistentDisk> {
        let inflater = self.inflater.clone();
        let (disk, info) = run_step(
            "inflate",
            deadline,
            &self.cancel,
            self.inflater.clone(),
            async move { inflater.inflate().await },
        )
        .await?;
        tracing::info!(
            disk = %disk.uri,
            size_gb = disk.size_gb,
            source_gb = disk.source_gb,
            format = %disk.source_type,
            inflation_type = ?info.inflation_type,
            elapsed_ms = info.inflation_time.as_millis() as u64,
            "inflation finished"
        );
        Ok(disk)
    }

    /// Best-effort transient disk deletion. Already-gone is success; any
    /// other failure is logged and swallowed.
    async fn delete_transient(&self, uri: &str) {
        let (project, zone, name) = match parse_disk_uri(uri) {
            Some(parts) => parts,
            // Not a zonal disk (already an image); nothing to delete.
            None => return,
        };
        match self.compute.delete_disk(&project, &zone, &name).await {
            Ok(()) => tracing::info!(disk = uri, "deleted transient disk"),
            Err(err) if err.is_not_found() => {
                tracing::debug!(disk = uri, "transient disk already gone")
            }
            Err(err) => {
                tracing::warn!(disk = uri, error = %err, "failed to delete transient disk")
            }
        }
    }

    fn enter(&self, next: ImportStage) {
        let mut stage = self.stage.lock();
        if !stage.can_transition_to(next) {
            tracing::warn!(from = %stage, to = %next, "unexpected stage transition");
        }
        tracing::debug!(from = %stage, to = %next, "import stage");
        *stage = next;
    }
}
