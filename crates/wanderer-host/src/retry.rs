//! Bounded retry policy.

use std::time::Duration;

/// Retry policy for transient transport failures.
///
/// Attempts are numbered from 1; after a failed attempt `n < max_attempts`
/// the transport waits `base_delay * multiplier^(n-1)` before trying again.
/// Injected into the transport so that tests can simulate a flaky link with
/// zero delays, and so the hardware-specific tuning lives in one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before the failure surfaces. 1 disables retries.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Backoff multiplier applied per subsequent retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that surfaces the first failure.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay to wait after failed attempt `attempt`, or `None` when the
    /// budget is exhausted and the failure should surface.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        Some(self.base_delay.saturating_mul(factor))
    }
}
