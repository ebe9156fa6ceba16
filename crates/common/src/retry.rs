//! Shared retry/backoff policy
//!
//! One policy owns every delay formula in the pipeline so the transport
//! layer and the response layer cannot drift apart:
//!
//! - exponential backoff `base * 2^(attempt - 1)` for transient transport
//!   failures and 5xx responses
//! - linear backoff `base * attempt` for credential fetch and token
//!   generation
//!
//! The policy only computes durations; sleeping is the caller's concern.

use std::time::Duration;

/// Default number of attempts (initial try + retries)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base interval between attempts
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Backoff policy with a bounded attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retry attempts granted after the initial try
    pub max_attempts: u32,

    /// Base interval the backoff formulas scale from
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_delay: DEFAULT_BASE_DELAY }
    }
}

impl RetryPolicy {
    /// Create a policy with an explicit attempt budget and base delay
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// Exponential delay before the retry following `attempt`
    ///
    /// Attempt numbering starts at 1; the first retry gets the base delay
    /// unscaled. The shift is capped so pathological attempt counts cannot
    /// overflow the multiplier.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(8);
        let multiplier = 1u32 << shift;
        self.base_delay.saturating_mul(multiplier)
    }

    /// Linear delay before the retry following `attempt` (`base * attempt`)
    pub fn linear_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.max(1))
    }

    /// Whether another attempt is allowed after `attempt` tries so far
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Total number of sends a call may make (initial try + retries)
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts + 1
    }
}
