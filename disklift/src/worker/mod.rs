//! Workflow worker.
//!
//! A [`Worker`] owns one job template instance and executes it as a named
//! unit of remote work: variables applied, ordered pre-run hooks, engine
//! run, serial read-back, ordered post-run hooks with an at-most-once
//! retry. Workers are single-use; a second `run` is a programmer error.

mod hooks;

pub use hooks::{
    AddDiskFeaturesHook, ApplyEnvHook, BackfillVarsHook, ConfigureLoggingHook, HookDecision,
    LabelResourcesHook, RemoveExternalIpHook, StandardDiskFallbackHook, WorkerHook,
};

use crate::engine::{JobSpec, SerialValues, WorkflowEngine};
use crate::errors::{DiskliftError, DiskliftResult};
use crate::request::ImageImportRequest;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Executes one named unit of remote work with hooks, retry and
/// cancellation.
pub struct Worker {
    engine: Arc<dyn WorkflowEngine>,
    job: Mutex<JobSpec>,
    hooks: Mutex<Vec<Box<dyn WorkerHook>>>,
    cancel: CancellationToken,
    cancelled: AtomicBool,
    cancel_reason: Mutex<Option<String>>,
    started: AtomicBool,
    last_serial: Mutex<SerialValues>,
}

impl Worker {
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        mut template: JobSpec,
        hooks: Vec<Box<dyn WorkerHook>>,
    ) -> Self {
        // Unique run name so concurrent imports never collide on job identity.
        template.name = format!("{}-{}", template.name, Uuid::new_v4().simple());
        Self {
            engine,
            job: Mutex::new(template),
            hooks: Mutex::new(hooks),
            cancel: CancellationToken::new(),
            cancelled: AtomicBool::new(false),
            cancel_reason: Mutex::new(None),
            started: AtomicBool::new(false),
            last_serial: Mutex::new(SerialValues::new()),
        }
    }

    /// Build a worker for a request: loads the template and installs the
    /// standard hook chain (environment, variable validation, labeling,
    /// logging, optional external-IP removal, standard-disk fallback).
    pub fn for_request(
        engine: Arc<dyn WorkflowEngine>,
        request: &ImageImportRequest,
        template_path: &Path,
    ) -> DiskliftResult<Worker> {
        let template = engine.load_template(template_path)?;
        let mut hooks: Vec<Box<dyn WorkerHook>> = vec![
            Box::new(ApplyEnvHook::new(request.environment.clone())),
            Box::new(BackfillVarsHook),
            Box::new(LabelResourcesHook::new(
                request.execution_id.clone(),
                request.labels.clone(),
            )),
            Box::new(ConfigureLoggingHook),
        ];
        if request.environment.no_external_ip {
            hooks.push(Box::new(RemoveExternalIpHook));
        }
        hooks.push(Box::new(StandardDiskFallbackHook::new()));
        Ok(Worker::new(engine, template, hooks))
    }

    /// Append a hook to the chain. Hooks run in insertion order.
    pub fn add_hook(&self, hook: Box<dyn WorkerHook>) {
        self.hooks.lock().push(hook);
    }

    /// Run the job with the given variable bindings.
    ///
    /// At most one run per worker; at most one hook-requested retry per
    /// run. Serial values are kept (merged across attempts) even when the
    /// run fails.
    pub async fn run(&self, vars: BTreeMap<String, String>) -> DiskliftResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DiskliftError::Internal(
                "worker instances are single-use; run was called twice".into(),
            ));
        }
        {
            let mut job = self.job.lock();
            for (k, v) in vars {
                job.vars.insert(k, v);
            }
        }

        let mut retried = false;
        loop {
            if self.cancel.is_cancelled() {
                return Err(DiskliftError::Cancelled(self.reason()));
            }

            let spec = self.prepare_attempt()?;
            tracing::info!(job = %spec.name, "running workflow job");

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(DiskliftError::Cancelled(self.reason()));
                }
                outcome = self.engine.run_job(&spec, self.cancel.child_token()) => outcome,
            };

            self.record_serial(outcome.serial_values);

            match outcome.result {
                Ok(()) => {
                    tracing::info!(job = %spec.name, "workflow job finished");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(job = %spec.name, error = %err, "workflow job failed");
                    let retry = self.run_post_hooks(&err);
                    if retry && !retried {
                        retried = true;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Run the job, then read the named key/value pairs from its serial
    /// output. The map holds whatever keys were observed, even when the
    /// run itself failed.
    pub async fn run_and_read_serial_values(
        &self,
        vars: BTreeMap<String, String>,
        keys: &[&str],
    ) -> (BTreeMap<String, String>, DiskliftResult<()>) {
        let result = self.run(vars).await;
        let serial = self.last_serial.lock();
        let values = keys
            .iter()
            .filter_map(|k| serial.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect();
        (values, result)
    }

    /// Read back one value from the last run's serial output.
    pub fn serial_value(&self, key: &str) -> Option<String> {
        self.last_serial.lock().get(key).cloned()
    }

    /// Request cancellation. Idempotent: the underlying token is closed
    /// exactly once and the first reason wins. Always returns true.
    pub fn cancel(&self, reason: &str) -> bool {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.cancel_reason.lock() = Some(reason.to_string());
            tracing::info!(reason, "cancelling workflow job");
            self.cancel.cancel();
        }
        true
    }

    fn prepare_attempt(&self) -> DiskliftResult<JobSpec> {
        let mut job = self.job.lock();
        let mut hooks = self.hooks.lock();
        for hook in hooks.iter_mut() {
            if hook.supports_pre_run() {
                hook.pre_run(&mut job)?;
            }
        }
        Ok(job.clone())
    }

    fn run_post_hooks(&self, err: &DiskliftError) -> bool {
        let mut job = self.job.lock();
        let mut hooks = self.hooks.lock();
        let mut retry = false;
        for hook in hooks.iter_mut() {
            if hook.supports_post_run() && hook.post_run(&mut job, err) == HookDecision::Retry {
                tracing::info!(hook = hook.name(), "post-run hook requested a retry");
                retry = true;
            }
        }
        retry
    }

    fn record_serial(&self, values: SerialValues) {
        let mut serial = self.last_serial.lock();
        for (k, v) in values {
            tracing::debug!(key = %k, value = %v, "serial output");
            serial.insert(k, v);
        }
    }

    fn reason(&self) -> String {
        self.cancel_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "cancelled".into())
    }
}
