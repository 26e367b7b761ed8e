//! Bounded retry policies

use std::time::Duration;

/// How many times an operation is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1)
    pub attempts: u32,
    /// Pause between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Fixed delay between attempts
    pub const fn fixed(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Retry without sleeping (tests, one-shot tools)
    pub const fn immediate(attempts: u32) -> Self {
        Self::fixed(attempts, Duration::ZERO)
    }

    /// Attempts clamped to at least one
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Whether another attempt follows the given (1-based) attempt
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}

/// Per-command retry against the checkpoint store
impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}
