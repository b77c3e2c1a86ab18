//! Cooperative cancellation for page processing
//!
//! A processing run owns one [`CancellationToken`]; the orchestration layer
//! keeps a clone and may cancel at any time. Pipeline stages only observe the
//! token at their boundaries (before the next tile batch, before line
//! detection, ...), so a cancellation requested mid-stage lets the smallest
//! unit of work in flight finish first.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Returned by [`CancellationToken::checkpoint`] once cancellation is observed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("processing cancelled before stage `{stage}`")]
pub struct Cancelled {
    /// Stage that was about to start
    pub stage: &'static str,
}

/// Cancellation token shared between a pipeline run and its owner
///
/// All clones observe the same flag.
///
/// # Example
///
/// ```
/// use tendon_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// assert!(worker_token.checkpoint("ocr").is_ok());
/// token.cancel();
/// assert!(worker_token.checkpoint("ocr").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether `cancel()` has been called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Stage-boundary check
    ///
    /// Call this before starting `stage`; an `Err` means the caller must stop
    /// without producing partial output for that stage.
    pub fn checkpoint(&self, stage: &'static str) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            tracing::debug!(stage, "cancellation observed at stage boundary");
            Err(Cancelled { stage })
        } else {
            Ok(())
        }
    }
}
