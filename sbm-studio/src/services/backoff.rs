//! Rate-limit backoff for the studio API
//!
//! On HTTP 429 the caller waits the current backoff, then the backoff grows
//! by a fixed increment up to a ceiling. Any 200 resets it to the base wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Linear backoff shared by every request of one API client
#[derive(Debug)]
pub struct RateLimitBackoff {
    base_ms: u64,
    increment_ms: u64,
    max_ms: u64,
    current_ms: AtomicU64,
}

impl RateLimitBackoff {
    pub fn new(base: Duration, increment: Duration, max: Duration) -> Self {
        let base_ms = base.as_millis() as u64;
        let max_ms = (max.as_millis() as u64).max(base_ms);
        Self {
            base_ms,
            increment_ms: increment.as_millis() as u64,
            max_ms,
            current_ms: AtomicU64::new(base_ms),
        }
    }

    pub fn from_secs(base: u64, increment: u64, max: u64) -> Self {
        Self::new(
            Duration::from_secs(base),
            Duration::from_secs(increment),
            Duration::from_secs(max),
        )
    }

    /// Wait to apply before the next 429 retry
    pub fn current_wait(&self) -> Duration {
        Duration::from_millis(self.current_ms.load(Ordering::SeqCst))
    }

    pub fn base_wait(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    /// Feed a response status
    ///
    /// Returns the wait to sleep for a 429 and advances the backoff. A 200
    /// resets to the base wait. Other statuses leave it unchanged.
    pub fn observe(&self, status: u16) -> Option<Duration> {
        match status {
            429 => {
                let wait = self.current_ms.load(Ordering::SeqCst);
                let next = wait.saturating_add(self.increment_ms).min(self.max_ms);
                self.current_ms.store(next, Ordering::SeqCst);
                Some(Duration::from_millis(wait))
            }
            200 => {
                self.current_ms.store(self.base_ms, Ordering::SeqCst);
                None
            }
            _ => None,
        }
    }
}
