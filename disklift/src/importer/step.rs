//! Deadline-bounded step execution.
//!
//! Every pipeline stage runs through [`run_step`], which races the step
//! against the shared deadline and an external cancellation request. The
//! step future is spawned only after both pre-start checks pass, so an
//! already-elapsed deadline never enters the step body. Cancellation
//! hooks run in detached tasks; a hook that never signals cannot hang
//! the pipeline.

use crate::cancel::Cancellable;
use crate::errors::{DiskliftError, DiskliftResult};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const DEADLINE_REASON: &str = "import deadline exceeded";
const CANCEL_REASON: &str = "import cancelled";

/// Run one step against the shared deadline and cancellation token.
///
/// On deadline or cancellation the step is told to cancel in a detached
/// task and abandoned; its own cleanup obligation survives in that task.
pub async fn run_step<T, F, C>(
    name: &'static str,
    deadline: Instant,
    cancel: &CancellationToken,
    step: Arc<C>,
    work: F,
) -> DiskliftResult<T>
where
    T: Send + 'static,
    F: Future<Output = DiskliftResult<T>> + Send + 'static,
    C: Cancellable + ?Sized + 'static,
{
    // Pre-start checks. `work` is lazy; returning here means the step
    // body is never entered.
    if cancel.is_cancelled() {
        abandon(name, step, CANCEL_REASON);
        return Err(DiskliftError::Cancelled(format!(
            "{name} cancelled before starting"
        )));
    }
    if Instant::now() >= deadline {
        abandon(name, step, DEADLINE_REASON);
        return Err(DiskliftError::Timeout(format!(
            "{name} skipped, deadline already elapsed"
        )));
    }

    let mut handle = tokio::spawn(work);
    tokio::select! {
        _ = tokio::time::sleep_until(deadline) => {
            handle.abort();
            abandon(name, step, DEADLINE_REASON);
            Err(DiskliftError::Timeout(format!("{name} exceeded the import deadline")))
        }
        _ = cancel.cancelled() => {
            handle.abort();
            abandon(name, step, CANCEL_REASON);
            Err(DiskliftError::Cancelled(format!("{name} cancelled")))
        }
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(err) => Err(DiskliftError::Internal(format!("{name} task failed: {err}"))),
        },
    }
}

/// Fire the step's cancellation hook without waiting for it.
fn abandon<C: Cancellable + ?Sized + 'static>(name: &'static str, step: Arc<C>, reason: &'static str) {
    tracing::warn!(step = name, reason, "abandoning step");
    tokio::spawn(async move {
        let confirmed = step.cancel(reason).await;
        tracing::debug!(step = name, confirmed, "step cancellation finished");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct RecordingStep {
        cancel_reasons: Mutex<Vec<String>>,
        hang_on_cancel: bool,
    }

    impl RecordingStep {
        fn new(hang_on_cancel: bool) -> Arc<Self> {
            Arc::new(Self {
                cancel_reasons: Mutex::new(Vec::new()),
                hang_on_cancel,
            })
        }
    }

    #[async_trait]
    impl Cancellable for RecordingStep {
        async fn cancel(&self, reason: &str) -> bool {
            self.cancel_reasons.lock().push(reason.to_string());
            if self.hang_on_cancel {
                std::future::pending::<()>().await;
            }
            true
        }
    }

    #[tokio::test]
    async fn test_step_completes_within_deadline() {
        let step = RecordingStep::new(false);
        let result = run_step(
            "quick",
            Instant::now() + Duration::from_secs(5),
            &CancellationToken::new(),
            step.clone(),
            async { Ok::<_, DiskliftError>(7) },
        )
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert!(step.cancel_reasons.lock().is_empty());
    }

    #[tokio::test]
    async fn test_elapsed_deadline_never_enters_body() {
        let entered = Arc::new(Mutex::new(false));
        let entered_clone = entered.clone();
        let step = RecordingStep::new(false);

        let err = run_step(
            "late",
            Instant::now(),
            &CancellationToken::new(),
            step,
            async move {
                *entered_clone.lock() = true;
                Ok::<_, DiskliftError>(())
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DiskliftError::Timeout(_)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!*entered.lock(), "step body must not run");
    }

    #[tokio::test]
    async fn test_zero_deadline_returns_promptly_even_if_cancel_hangs() {
        let step = RecordingStep::new(true);
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            run_step(
                "hanging",
                Instant::now(),
                &CancellationToken::new(),
                step.clone(),
                async { Ok::<_, DiskliftError>(()) },
            ),
        )
        .await
        .expect("run_step must not block on the cancel hook");
        assert!(matches!(result, Err(DiskliftError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_deadline_mid_flight_cancels_step() {
        let step = RecordingStep::new(false);
        let err = run_step(
            "slow",
            Instant::now() + Duration::from_millis(20),
            &CancellationToken::new(),
            step.clone(),
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DiskliftError>(())
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DiskliftError::Timeout(_)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(step.cancel_reasons.lock().as_slice(), [DEADLINE_REASON]);
    }

    #[tokio::test]
    async fn test_external_cancellation_wins() {
        let step = RecordingStep::new(false);
        let token = CancellationToken::new();
        let cancel_after = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_after.cancel();
        });

        let err = run_step(
            "cancelled",
            Instant::now() + Duration::from_secs(60),
            &token,
            step,
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, DiskliftError>(())
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DiskliftError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_step_error_passes_through() {
        let step = RecordingStep::new(false);
        let err: DiskliftError = run_step(
            "failing",
            Instant::now() + Duration::from_secs(5),
            &CancellationToken::new(),
            step,
            async { Err::<(), _>(DiskliftError::Engine("translate broke".into())) },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("translate broke"));
    }
}
