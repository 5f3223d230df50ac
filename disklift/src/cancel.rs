//! Reason-carrying cancellation seam.

use async_trait::async_trait;

/// An actor that can be asked to stop and clean up after itself.
///
/// Cancellation is reason-carrying and idempotent per actor. The return
/// value reports whether cleanup is confirmed; a cancelled actor must
/// still return control to its caller rather than hang.
#[async_trait]
pub trait Cancellable: Send + Sync {
    async fn cancel(&self, reason: &str) -> bool;
}
