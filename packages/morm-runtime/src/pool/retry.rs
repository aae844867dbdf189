//! Exponential backoff with full jitter, and the retry loop that drives a
//! fallible async operation through the connection pool's retry policy.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::PoolError;

/// Classifies whether an error is worth retrying. Implemented for adapter
/// and connector errors; validation/security/not-found errors are always
/// permanent.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Full-jitter exponential backoff: `random(0, min(max, base * 2^attempt))`.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp_millis = base
        .as_millis()
        .saturating_mul(1u128 << attempt.min(20));
    let capped = exp_millis.min(max.as_millis()).max(1);
    #[allow(clippy::cast_possible_truncation)]
    let jitter_millis = rand::thread_rng().gen_range(0..=capped) as u64;
    Duration::from_millis(jitter_millis)
}

/// Runs `attempt_fn` up to `config.max_attempts` times, sleeping with
/// jittered exponential backoff between transient failures. The first
/// attempt is numbered 0.
///
/// # Errors
/// Returns [`PoolError::RetriesExhausted`] once every attempt has failed
/// transiently, or immediately propagates a non-transient error (wrapped
/// in `RetriesExhausted` with `attempts: 1` to keep a single error type).
pub async fn retry_with_backoff<T, E, F, Fut>(config: &RetryConfig, mut attempt_fn: F) -> Result<T, PoolError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut last_error = String::new();
    for attempt in 0..config.max_attempts.max(1) {
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_error = err.to_string();
                let is_last = attempt + 1 >= config.max_attempts;
                if !err.is_transient() || is_last {
                    break;
                }
                let delay = backoff_delay(attempt, config.base_delay(), config.max_delay());
                tokio::time::sleep(delay).await;
            }
        }
    }
    Err(PoolError::RetriesExhausted {
        attempts: config.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TransientError(&'static str);
    impl std::fmt::Display for TransientError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl Retryable for TransientError {
        fn is_transient(&self) -> bool {
            true
        }
    }

    struct PermanentError;
    impl std::fmt::Display for PermanentError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "permanent")
        }
    }
    impl Retryable for PermanentError {
        fn is_transient(&self) -> bool {
            false
        }
    }

    #[test]
    fn backoff_never_exceeds_max() {
        let base = Duration::from_millis(10);
        let max = Duration::from_millis(100);
        for attempt in 0..10 {
            let delay = backoff_delay(attempt, base, max);
            assert!(delay <= max);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_up_to_max_attempts() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), PoolError> = retry_with_backoff(&config, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TransientError("boom")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_permanent_error() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 100,
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), PoolError> = retry_with_backoff(&config, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(PermanentError) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 100,
        };
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&config, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(TransientError("boom"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
