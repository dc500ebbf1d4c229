use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Exponential Backoff Retry
// ============================================================================
//
// Retries operations whose failures are transient - in this crate, the
// order-number collision during checkout. Errors classify themselves via
// `IsTransient`; permanent failures short-circuit immediately.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Tight loop for conflicts that resolve by regenerating input, like an
    /// order-number collision: more attempts, near-zero delay.
    pub fn for_conflicts() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Transient failures exhausted every attempt.
    Failed(E),
    /// A non-transient failure; retrying would not help.
    PermanentFailure(E),
}

/// Classifies whether an error is worth retrying.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Run `operation` until it succeeds, fails permanently, or exhausts
/// `config.max_attempts`, sleeping with exponential backoff between attempts.
pub async fn retry_on_transient<F, Fut, T, E>(
    config: RetryConfig,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt = attempt, "operation succeeded after retry");
                }
                return RetryResult::Success(result);
            }
            Err(error) => {
                if !error.is_transient() {
                    return RetryResult::PermanentFailure(error);
                }

                if attempt >= config.max_attempts {
                    tracing::error!(
                        attempt = attempt,
                        error = %error,
                        "operation failed after all retries"
                    );
                    return RetryResult::Failed(error);
                }

                tracing::warn!(
                    attempt = attempt,
                    error = %error,
                    delay_ms = delay.as_millis(),
                    "transient failure, retrying after delay"
                );

                sleep(delay).await;

                delay = Duration::from_millis(((delay.as_millis() as f64) * config.multiplier) as u64);
                delay = delay.min(config.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Permanent,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "transient"),
                TestError::Permanent => write!(f, "permanent"),
            }
        }
    }

    impl IsTransient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn quick_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_eventually() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_on_transient(quick_config(3), |_attempt| {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success("success")));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let result = retry_on_transient(quick_config(2), |_attempt| async {
            Err::<(), _>(TestError::Transient)
        })
        .await;

        assert!(matches!(result, RetryResult::Failed(TestError::Transient)));
    }

    #[tokio::test]
    async fn test_permanent_failure_short_circuits() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_on_transient(quick_config(5), |_attempt| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError::Permanent)
            }
        })
        .await;

        assert!(matches!(result, RetryResult::PermanentFailure(TestError::Permanent)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
