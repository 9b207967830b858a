use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Bounded exponential backoff: `base * 2^retries_so_far`, capped at `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    pub fn delay(&self, retries_so_far: u32) -> Duration {
        let factor = 2u32.checked_pow(retries_so_far).unwrap_or(u32::MAX);

        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }

    /// Sleeps for the retry's delay unless cancelled first.
    /// Returns `false` when cancelled.
    pub async fn wait(&self, retries_so_far: u32, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(self.delay(retries_so_far)) => true,
        }
    }
}
