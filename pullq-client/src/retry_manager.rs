use rand::{rng, Rng};
use std::time::Duration;

/// Backoff between consecutive failed ack flushes, linear with jitter
#[derive(Debug, Clone)]
pub(crate) struct RetryManager {
    base_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryManager {
    pub(crate) fn new(base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            base_backoff_ms: if base_backoff_ms == 0 {
                200
            } else {
                base_backoff_ms
            },
            max_backoff_ms: if max_backoff_ms == 0 {
                5_000
            } else {
                max_backoff_ms
            },
        }
    }

    /// Calculate linear backoff with jitter, `attempt` counts from 0
    pub(crate) fn calculate_backoff(&self, attempt: usize) -> Duration {
        let linear = self.base_backoff_ms.saturating_mul(attempt as u64 + 1);
        let backoff = linear.min(self.max_backoff_ms);
        let jitter = rng().random_range(backoff / 2..=backoff); // 50-100% jitter
        Duration::from_millis(jitter)
    }
}
