//! Retry ceiling policy.

use serde::{Deserialize, Serialize};

/// Maximum number of delivery attempts for a single job.
pub const RETRY_CEILING: u32 = 3;

/// Retry policy for publish jobs.
///
/// Failed jobs are re-queued immediately by returning them to `scheduled`;
/// their `scheduled_for` is already in the past, so the next queue pass
/// picks them up. There is no backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, counting the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_CEILING,
        }
    }
}

impl RetryPolicy {
    /// Whether a job that has already been attempted `attempt_count` times
    /// may be claimed again.
    pub fn allows_attempt(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Whether a job whose `attempt_count`-th attempt just failed should be
    /// re-queued.
    pub fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }
}
