//! Retry mechanism with exponential backoff
//!
//! Implements retry logic for transient transfer failures such as connection
//! resets, timeouts and 5xx responses.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Retry a fallible async operation with exponential backoff
///
/// `operation` receives the 1-based attempt number.
///
/// # Example
/// ```ignore
/// let bytes = retry_with_backoff(
///     &config,
///     |_attempt| async { session.download(url, &dest).await },
///     Error::is_retryable,
/// ).await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= config.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }

                let backoff = calculate_backoff(config, attempt);
                tracing::debug!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "Retrying after transient error"
                );

                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Backoff before the attempt following `attempt`: initial * 2^(attempt-1), capped
pub fn calculate_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base_ms = config.initial_backoff_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(base_ms.min(config.max_backoff_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 10,
        }
    }

    #[test]
    fn test_calculate_backoff_defaults() {
        let config = RetryConfig::default();
        assert_eq!(calculate_backoff(&config, 1), Duration::from_secs(1));
        assert_eq!(calculate_backoff(&config, 2), Duration::from_secs(2));
        assert_eq!(calculate_backoff(&config, 3), Duration::from_secs(4));
        assert_eq!(calculate_backoff(&config, 4), Duration::from_secs(8));
        assert_eq!(calculate_backoff(&config, 5), Duration::from_secs(10));
        assert_eq!(calculate_backoff(&config, 40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let config = RetryConfig::default();
        let mut calls = 0;

        let result = retry_with_backoff(
            &config,
            |_| {
                calls += 1;
                async { Ok::<_, Error>(42) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_two_failures() {
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&call_count);

        let result = retry_with_backoff(
            &fast_config(3),
            |attempt| {
                let cc = Arc::clone(&counter);
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(Error::Network("connection reset".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            Error::is_retryable,
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(
            &fast_config(2),
            |_| {
                calls += 1;
                async { Err(Error::Network("always fails".to_string())) }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_retry_non_retryable() {
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(
            &fast_config(3),
            |_| {
                calls += 1;
                async { Err(Error::NotFound("not found".to_string())) }
            },
            Error::is_retryable,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
