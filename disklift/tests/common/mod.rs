//! Shared mock collaborators for pipeline integration tests.

use async_trait::async_trait;
use disklift::cancel::Cancellable;
use disklift::compute::{
    ComputeClient, DiskDefinition, DiskResource, GuestOsFeature, ImageDefinition,
};
use disklift::errors::{DiskliftError, DiskliftResult};
use disklift::inflate::{InflationInfo, InflationType, Inflater, PersistentDisk};
use disklift::process::{Processor, ProcessorProvider};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub fn transient_disk() -> PersistentDisk {
    PersistentDisk {
        uri: "projects/p/zones/z/disks/disklift-exec1".into(),
        size_gb: 100,
        source_gb: 10,
        source_type: "vmdk".into(),
    }
}

/// Inflater scripted with a fixed outcome; records call and cancel counts.
pub struct StubInflater {
    outcome: Mutex<Option<DiskliftResult<PersistentDisk>>>,
    pub calls: Mutex<u32>,
    pub cancel_reasons: Mutex<Vec<String>>,
}

impl StubInflater {
    pub fn succeeding(disk: PersistentDisk) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(Some(Ok(disk))),
            calls: Mutex::new(0),
            cancel_reasons: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(Some(Err(DiskliftError::Engine(message.into())))),
            calls: Mutex::new(0),
            cancel_reasons: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Inflater for StubInflater {
    async fn inflate(&self) -> DiskliftResult<(PersistentDisk, InflationInfo)> {
        *self.calls.lock() += 1;
        match self.outcome.lock().take() {
            Some(Ok(disk)) => Ok((
                disk,
                InflationInfo::new(String::new(), Duration::from_secs(1), InflationType::Engine),
            )),
            Some(Err(err)) => Err(err),
            None => Err(DiskliftError::Internal("inflater already consumed".into())),
        }
    }

    fn describe(&self) -> &'static str {
        "stub"
    }
}

#[async_trait]
impl Cancellable for StubInflater {
    async fn cancel(&self, reason: &str) -> bool {
        self.cancel_reasons.lock().push(reason.to_string());
        true
    }
}

/// Processor scripted with a fixed outcome; records how often it ran.
pub struct ScriptedProcessor {
    outcome: Mutex<Option<DiskliftResult<PersistentDisk>>>,
    pub calls: Mutex<u32>,
    pub cancel_reasons: Mutex<Vec<String>>,
    hang_on_cancel: bool,
}

impl ScriptedProcessor {
    pub fn succeeding(disk: PersistentDisk) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(Some(Ok(disk))),
            calls: Mutex::new(0),
            cancel_reasons: Mutex::new(Vec::new()),
            hang_on_cancel: false,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(Some(Err(DiskliftError::Engine(message.into())))),
            calls: Mutex::new(0),
            cancel_reasons: Mutex::new(Vec::new()),
            hang_on_cancel: false,
        })
    }

    /// A processor whose cancellation hook never signals completion.
    pub fn unresponsive() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            calls: Mutex::new(0),
            cancel_reasons: Mutex::new(Vec::new()),
            hang_on_cancel: true,
        })
    }
}

#[async_trait]
impl Processor for ScriptedProcessor {
    async fn process(&self, _disk: PersistentDisk) -> DiskliftResult<PersistentDisk> {
        *self.calls.lock() += 1;
        let outcome = self.outcome.lock().take();
        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    fn describe(&self) -> &'static str {
        "scripted"
    }
}

#[async_trait]
impl Cancellable for ScriptedProcessor {
    async fn cancel(&self, reason: &str) -> bool {
        self.cancel_reasons.lock().push(reason.to_string());
        if self.hang_on_cancel {
            std::future::pending::<()>().await;
        }
        true
    }
}

/// Provider returning a fixed processor list, or a fixed error.
pub struct StaticProvider {
    outcome: Mutex<Option<DiskliftResult<Vec<Arc<dyn Processor>>>>>,
}

impl StaticProvider {
    pub fn with_processors(processors: Vec<Arc<dyn Processor>>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(Some(Ok(processors))),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(Some(Err(DiskliftError::Inspection(message.into())))),
        })
    }
}

#[async_trait]
impl ProcessorProvider for StaticProvider {
    async fn processors_for(
        &self,
        _disk: &PersistentDisk,
    ) -> DiskliftResult<Vec<Arc<dyn Processor>>> {
        self.outcome
            .lock()
            .take()
            .unwrap_or_else(|| Err(DiskliftError::Internal("provider already consumed".into())))
    }
}

/// Compute client that records disk deletions.
pub struct RecordingCompute {
    pub deleted_disks: Mutex<Vec<String>>,
    delete_error: Option<DiskliftError>,
}

impl RecordingCompute {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deleted_disks: Mutex::new(Vec::new()),
            delete_error: None,
        })
    }

    pub fn with_delete_error(err: DiskliftError) -> Arc<Self> {
        Arc::new(Self {
            deleted_disks: Mutex::new(Vec::new()),
            delete_error: Some(err),
        })
    }
}

#[async_trait]
impl ComputeClient for RecordingCompute {
    async fn create_disk(
        &self,
        _project: &str,
        _zone: &str,
        _disk: &DiskDefinition,
    ) -> DiskliftResult<DiskResource> {
        Err(DiskliftError::Internal("unused in these tests".into()))
    }

    async fn get_disk(&self, _project: &str, _zone: &str, _name: &str) -> DiskliftResult<DiskResource> {
        Err(DiskliftError::api_with_code(404, "not found"))
    }

    async fn delete_disk(&self, _project: &str, _zone: &str, name: &str) -> DiskliftResult<()> {
        self.deleted_disks.lock().push(name.to_string());
        match &self.delete_error {
            None => Ok(()),
            Some(DiskliftError::Api { code, message }) => Err(DiskliftError::Api {
                code: *code,
                message: message.clone(),
            }),
            Some(other) => Err(DiskliftError::Internal(other.to_string())),
        }
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

    async fn create_image(&self, _project: &str, _image: &ImageDefinition) -> DiskliftResult<()> {
        Ok(())
    }

    async fn delete_image(&self, _project: &str, _name: &str) -> DiskliftResult<()> {
        Ok(())
    }
}
