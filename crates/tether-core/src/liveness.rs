//! Lock-free "last seen" timestamp shared between heartbeat workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Last-heard-from timestamp that can be refreshed and read from any task.
///
/// Stored as microseconds since a fixed origin so it fits in an atomic.
#[derive(Debug)]
pub struct LivenessClock {
    origin: Instant,
    last_seen_us: AtomicU64,
}

impl LivenessClock {
    /// Create a clock whose last-seen time is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_seen_us: AtomicU64::new(0),
        }
    }

    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros().min(u64::MAX as u128) as u64
    }

    /// Record activity now.
    pub fn touch(&self) {
        self.last_seen_us.store(self.now_us(), Ordering::Release);
    }

    /// Time since the last `touch` (or construction).
    pub fn elapsed(&self) -> Duration {
        let last = self.last_seen_us.load(Ordering::Acquire);
        Duration::from_micros(self.now_us().saturating_sub(last))
    }

    /// Whether the silence has lasted strictly longer than `window`.
    pub fn is_expired(&self, window: Duration) -> bool {
        self.elapsed() > window
    }

    /// Move the last-seen time into the past. Test hook for expiry checks.
    #[cfg(test)]
    fn backdate(&self, by: Duration) {
        let shifted = self
            .last_seen_us
            .load(Ordering::Acquire)
            .saturating_sub(by.as_micros() as u64);
        self.last_seen_us.store(shifted, Ordering::Release);
    }
}

impl Default for LivenessClock {
    fn default() -> Self {
        Self::new()
    }
}
