//! Cooperative cancellation and retry pacing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Shared cancellation flag, checked between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Delay before retry `attempt` (1-based): exponential from 250ms, capped at 5s, plus jitter.
pub fn retry_backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5);
    let base = 250u64
        .saturating_mul(2u64.saturating_pow(exponent))
        .min(5_000);
    let jitter = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0)
        % 250;
    Duration::from_millis(base + jitter)
}

/// Sleep for `delay`, waking early when cancelled.
///
/// Returns `Err(Error::Cancelled)` if the flag was set before the delay ran out.
pub async fn sleep_with_cancel(cancel: &CancelFlag, delay: Duration) -> crate::Result<()> {
    let started = tokio::time::Instant::now();
    while started.elapsed() < delay {
        if cancel.is_cancelled() {
            return Err(crate::Error::Cancelled);
        }
        let remaining = delay.saturating_sub(started.elapsed());
        tokio::time::sleep(remaining.min(Duration::from_millis(100))).await;
    }
    Ok(())
}
