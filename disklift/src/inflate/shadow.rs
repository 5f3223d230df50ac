//! Shadow-test composition.
//!
//! Runs the engine-driven inflater (authoritative) and the direct-API
//! shadow inflater (diagnostic) as two independently scheduled tasks
//! feeding one bounded signal channel. The returned result is always the
//! main inflater's, regardless of which task finishes first; the shadow
//! outcome only produces comparison telemetry.

use super::{InflationInfo, Inflater, PersistentDisk};
use crate::cancel::Cancellable;
use crate::compute::classify::{is_caused_by_alpha_api_access, is_caused_by_unsupported_format};
use crate::errors::{DiskliftError, DiskliftResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Completion signal from one of the two inflation tasks.
enum InflateSignal {
    MainDone(PersistentDisk, InflationInfo),
    MainErr(DiskliftError),
    ShadowDone(PersistentDisk, InflationInfo),
    ShadowErr(DiskliftError),
}

impl InflateSignal {
    fn tag(&self) -> &'static str {
        match self {
            InflateSignal::MainDone(..) => "main-done",
            InflateSignal::MainErr(..) => "main-err",
            InflateSignal::ShadowDone(..) => "shadow-done",
            InflateSignal::ShadowErr(..) => "shadow-err",
        }
    }

    fn is_main(&self) -> bool {
        matches!(self, InflateSignal::MainDone(..) | InflateSignal::MainErr(..))
    }
}

pub struct ShadowTestedInflater {
    main: Arc<dyn Inflater>,
    shadow: Arc<dyn Inflater>,
}

impl ShadowTestedInflater {
    pub fn new(main: Arc<dyn Inflater>, shadow: Arc<dyn Inflater>) -> Self {
        Self { main, shadow }
    }

    fn spawn_task(
        inflater: Arc<dyn Inflater>,
        tx: mpsc::Sender<InflateSignal>,
        main: bool,
    ) {
        tokio::spawn(async move {
            let signal = match (inflater.inflate().await, main) {
                (Ok((disk, info)), true) => InflateSignal::MainDone(disk, info),
                (Err(err), true) => InflateSignal::MainErr(err),
                (Ok((disk, info)), false) => InflateSignal::ShadowDone(disk, info),
                (Err(err), false) => InflateSignal::ShadowErr(err),
            };
            // The receiver may already have returned; that's fine.
            let _ = tx.send(signal).await;
        });
    }

    /// Log the shadow's eventual outcome without holding up the caller.
    fn drain_for_telemetry(mut rx: mpsc::Receiver<InflateSignal>) {
        tokio::spawn(async move {
            if let Some(signal) = rx.recv().await {
                let diagnostic = match &signal {
                    InflateSignal::ShadowDone(..) => "shadow inflation finished after main".into(),
                    InflateSignal::ShadowErr(err) => classify_shadow_failure(err),
                    // Main signals were consumed before draining.
                    _ => format!("unexpected trailing signal: {}", signal.tag()),
                };
                tracing::info!(shadow_result = %diagnostic, "shadow inflation telemetry");
            }
        });
    }

    fn report_comparison(
        main_result: &DiskliftResult<(PersistentDisk, InflationInfo)>,
        shadow_signal: &InflateSignal,
    ) {
        let diagnostic = match (main_result, shadow_signal) {
            (Ok((main_disk, main_info)), InflateSignal::ShadowDone(shadow_disk, shadow_info)) => {
                compare_inflation(main_disk, main_info, shadow_disk, shadow_info)
            }
            (Err(_), InflateSignal::ShadowDone(..)) => {
                "main inflation failed while shadow inflation succeeded".into()
            }
            (_, InflateSignal::ShadowErr(err)) => classify_shadow_failure(err),
            _ => "unexpected signal ordering".into(),
        };
        tracing::info!(shadow_result = %diagnostic, "shadow inflation comparison");
    }
}

#[async_trait]
impl Inflater for ShadowTestedInflater {
    async fn inflate(&self) -> DiskliftResult<(PersistentDisk, InflationInfo)> {
        let (tx, mut rx) = mpsc::channel::<InflateSignal>(2);
        Self::spawn_task(Arc::clone(&self.main), tx.clone(), true);
        Self::spawn_task(Arc::clone(&self.shadow), tx, false);

        let first = rx.recv().await.ok_or_else(|| {
            DiskliftError::Internal("inflation signal channel closed unexpectedly".into())
        })?;

        if first.is_main() {
            // Authoritative result available: stop the shadow, wait for its
            // acknowledged cleanup, and return without awaiting its outcome.
            self.shadow.cancel("main inflation finished first").await;
            Self::drain_for_telemetry(rx);
            return match first {
                InflateSignal::MainDone(disk, info) => Ok((disk, info)),
                InflateSignal::MainErr(err) => Err(err),
                _ => unreachable!("is_main checked above"),
            };
        }

        // Shadow finished first: the authoritative result is still pending.
        let second = rx.recv().await.ok_or_else(|| {
            DiskliftError::Internal("inflation signal channel closed unexpectedly".into())
        })?;
        let main_result = match second {
            InflateSignal::MainDone(disk, info) => Ok((disk, info)),
            InflateSignal::MainErr(err) => Err(err),
            other => {
                return Err(DiskliftError::Internal(format!(
                    "duplicate shadow signal: {}",
                    other.tag()
                )))
            }
        };
        Self::report_comparison(&main_result, &first);
        main_result
    }

    fn describe(&self) -> &'static str {
        "shadow-tested"
    }
}

#[async_trait]
impl Cancellable for ShadowTestedInflater {
    async fn cancel(&self, reason: &str) -> bool {
        let (main, _shadow) =
            futures::join!(self.main.cancel(reason), self.shadow.cancel(reason));
        main
    }
}

/// Compare the authoritative and shadow inflation results.
///
/// Returns exactly `"true"` on a full match; otherwise names every
/// mismatched dimension. Checksums are compared only when both paths
/// produced one (the shadow path skips checksums for formats it cannot
/// compare).
pub fn compare_inflation(
    main_disk: &PersistentDisk,
    main_info: &InflationInfo,
    shadow_disk: &PersistentDisk,
    shadow_info: &InflationInfo,
) -> String {
    let mut mismatches = Vec::new();
    if main_disk.size_gb != shadow_disk.size_gb {
        mismatches.push(format!(
            "sizeGb mismatch: main={} shadow={}",
            main_disk.size_gb, shadow_disk.size_gb
        ));
    }
    if main_disk.source_gb != shadow_disk.source_gb {
        mismatches.push(format!(
            "sourceGb mismatch: main={} shadow={}",
            main_disk.source_gb, shadow_disk.source_gb
        ));
    }
    if !main_info.checksum.is_empty()
        && !shadow_info.checksum.is_empty()
        && main_info.checksum != shadow_info.checksum
    {
        mismatches.push(format!(
            "checksum mismatch: main={} shadow={}",
            main_info.checksum, shadow_info.checksum
        ));
    }
    if mismatches.is_empty() {
        "true".to_string()
    } else {
        mismatches.join("; ")
    }
}

fn classify_shadow_failure(err: &DiskliftError) -> String {
    if is_caused_by_unsupported_format(err) {
        "shadow inflation not supported for this format".into()
    } else if is_caused_by_alpha_api_access(err) {
        "shadow inflation requires alpha API access".into()
    } else {
        format!("shadow inflation failed: {err}")
    }
}
