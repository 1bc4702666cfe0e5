//! Retry policy for failed generation jobs.

use std::time::Duration;

/// What happens to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// No attempts left; the job is failed for good.
    Exhausted { attempts: u32 },
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(900),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    /// Decide after `attempts` failures in total.
    pub fn decide(&self, attempts: u32) -> RetryDecision {
        if attempts < self.max_attempts {
            RetryDecision::Retry {
                attempt: attempts,
                delay: self.delay_for_attempt(attempts),
            }
        } else {
            RetryDecision::Exhausted { attempts }
        }
    }
}
