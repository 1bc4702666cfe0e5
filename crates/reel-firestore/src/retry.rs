//! Exponential backoff with full jitter for Firestore calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::FirestoreResult;
use crate::metrics::record_retry;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_parse("FIRESTORE_MAX_RETRIES", defaults.max_retries),
            base_delay_ms: env_parse("FIRESTORE_RETRY_BASE_MS", defaults.base_delay_ms),
            max_delay_ms: env_parse("FIRESTORE_RETRY_MAX_MS", defaults.max_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based).
    fn delay(&self, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
        if let Some(after) = retry_after_ms {
            return Duration::from_millis(after.min(self.max_delay_ms));
        }
        let ceiling = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.max_delay_ms);
        Duration::from_millis(jitter(ceiling).max(self.base_delay_ms.min(ceiling)))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Uniform-ish value in `0..=ceiling` from the clock's sub-second noise.
fn jitter(ceiling: u64) -> u64 {
    if ceiling == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    nanos % (ceiling + 1)
}

/// Run `op`, retrying transient failures (network, 429, 5xx).
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> FirestoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = FirestoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay(attempt, e.retry_after_ms());
                warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Firestore call failed, retrying: {}",
                    e
                );
                record_retry(operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirestoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_bounds() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 400,
        };
        for attempt in 0..10 {
            let delay = config.delay(attempt, None).as_millis() as u64;
            assert!((100..=400).contains(&delay), "attempt {attempt}: {delay}");
        }
        assert_eq!(config.delay(0, Some(250)), Duration::from_millis(250));
        assert_eq!(config.delay(0, Some(9000)), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let calls = AtomicU32::new(0);
        let result = with_retry(&config, "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FirestoreError::from_http_status(503, "unavailable"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_precondition() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: FirestoreResult<()> = with_retry(&config, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FirestoreError::PreconditionFailed("moved".into()))
        })
        .await;
        assert!(result.unwrap_err().is_precondition_failed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
