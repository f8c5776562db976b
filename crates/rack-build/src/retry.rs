//! Retry policy for registry operations.

use std::fmt::Display;
use std::time::Duration;

use rack_common::config::RackConfig;

/// Bounded retries with a doubling delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy from the run configuration.
    #[must_use]
    pub fn from_config(config: &RackConfig) -> Self {
        Self {
            attempts: config.registry_attempts.max(1),
            base_delay: config.retry_base_delay(),
        }
    }

    /// A single attempt, no retries.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// `attempts` attempts without sleeping in between.
    #[must_use]
    pub const fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt number `attempt` (1-based, so attempt 2 is the
    /// first retry).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Runs `op` until it succeeds or the attempts are exhausted, returning
    /// the last error.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt.
    pub fn run<T, E: Display>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, E>,
    ) -> Result<T, E> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    attempt += 1;
                    let delay = self.delay_before(attempt);
                    tracing::warn!(
                        target_ref = what,
                        attempt,
                        attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "registry operation failed, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RackConfig::default())
    }
}
