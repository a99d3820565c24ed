//! Reconnection policy for tether clients.
//!
//! Failed connect attempts are retried after a constant delay. With a
//! non-zero attempt limit the handler gives up once the number of consecutive
//! failures exceeds that limit; a limit of zero retries forever.

use std::time::{Duration, Instant};

use crate::constants::DEFAULT_RECONNECT_BACKOFF;

/// What to do after a failed connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then try again. `attempt` is the failure count so far.
    Retry { attempt: u32, delay: Duration },
    /// Consecutive failures exceeded the limit; stop for good.
    GiveUp { attempts: u32 },
}

/// Reconnection handler state machine.
#[derive(Debug, Clone)]
pub struct ReconnectionHandler {
    /// Allowed consecutive failures (0 = unlimited).
    max_attempts: u32,
    /// Constant delay between attempts.
    backoff: Duration,
    /// Consecutive failed attempts since the last success.
    failures: u32,
    /// When the current run of failures started.
    started_at: Option<Instant>,
}

impl Default for ReconnectionHandler {
    fn default() -> Self {
        Self::unlimited(DEFAULT_RECONNECT_BACKOFF)
    }
}

impl ReconnectionHandler {
    /// Create a handler. `max_attempts == 0` retries forever.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            failures: 0,
            started_at: None,
        }
    }

    /// Create a handler that never gives up.
    pub fn unlimited(backoff: Duration) -> Self {
        Self::new(0, backoff)
    }

    /// Record a failed connect attempt and decide what happens next.
    pub fn record_failure(&mut self) -> RetryDecision {
        self.failures = self.failures.saturating_add(1);
        self.started_at.get_or_insert_with(Instant::now);

        if self.max_attempts > 0 && self.failures > self.max_attempts {
            RetryDecision::GiveUp {
                attempts: self.max_attempts,
            }
        } else {
            RetryDecision::Retry {
                attempt: self.failures,
                delay: self.backoff,
            }
        }
    }

    /// Forget past failures after a successful connect.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.started_at = None;
    }

    /// Consecutive failures since the last success.
    pub fn attempt(&self) -> u32 {
        self.failures
    }

    /// Time spent in the current run of failures.
    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }
}

// =============================================================================
// Tests
// =============================================================================
