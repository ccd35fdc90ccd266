//! Retry with exponential backoff for hard-dependency calls

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration for remote calls that must succeed
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 4000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }
}

/// Calculate backoff delay with optional jitter
fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    // Exponential backoff: base, 2x, 4x, 8x
    let delay = config.base_delay_ms.saturating_mul(1_u64 << attempt.min(3));
    let delay = delay.min(config.max_delay_ms);

    // Add jitter (±25%)
    let jittered = if config.jitter && delay >= 4 {
        let jitter_range = delay / 4;
        let jitter = rand::random::<u64>() % (jitter_range * 2 + 1);
        delay.saturating_sub(jitter_range) + jitter
    } else {
        delay
    };

    Duration::from_millis(jittered)
}

/// Execute a fallible async operation with retry logic.
///
/// At least one attempt is always made; the last error is returned when all
/// attempts fail.
pub async fn with_retry<F, Fut, T, E>(operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!("Operation failed (attempt {}/{}): {}", attempt + 1, attempts, e);
                attempt += 1;
                if attempt >= attempts {
                    return Err(e);
                }

                let delay = backoff_delay(attempt - 1, config);
                debug!("Retrying after {:?}", delay);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 4000,
            jitter: false,
        };
        assert_eq!(backoff_delay(0, &config), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, &config), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, &config), Duration::from_millis(2000));
        assert_eq!(backoff_delay(10, &config), Duration::from_millis(4000));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig::default();
        for _ in 0..50 {
            let delay = backoff_delay(0, &config).as_millis() as u64;
            assert!((375..=625).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {} failed", n))
                } else {
                    Ok(n)
                }
            },
            &fast(),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {}", n))
            },
            &fast(),
        )
        .await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::none()
        };
        let _: Result<(), String> = with_retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            },
            &config,
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
