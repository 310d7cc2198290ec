/// Retry policy with exponential backoff and jitter
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; carries the last one
    #[error("Max attempts ({attempts}) exceeded: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },
    /// The operation failed with an error the predicate refused to retry
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> RetryError<E> {
    /// The underlying error, whichever way the retry loop ended
    pub fn into_inner(self) -> E {
        match self {
            RetryError::MaxAttemptsExceeded { last_error, .. } => last_error,
            RetryError::OperationFailed(e) => e,
        }
    }
}

/// Execute a future with retry logic, retrying every error
pub async fn with_retry<F, Fut, T, E>(config: RetryConfig, f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_if(config, |_| true, f).await
}

/// Execute a future with retry logic, retrying only errors accepted by `should_retry`
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: RetryConfig,
    should_retry: P,
    mut f: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(RetryError::OperationFailed(e)),
            Err(e) => {
                if attempt >= max_attempts {
                    warn!(attempts = attempt, error = %e, "Max attempts reached");
                    return Err(RetryError::MaxAttemptsExceeded {
                        attempts: attempt,
                        last_error: e,
                    });
                }

                let delay = calculate_backoff(backoff, config.jitter);

                debug!(
                    "Retry attempt {}/{} after {}, waiting {:?}",
                    attempt, max_attempts, e, delay
                );

                tokio::time::sleep(delay).await;

                // Exponential backoff
                backoff = Duration::from_millis(
                    ((backoff.as_millis() as f64 * config.backoff_multiplier)
                        .min(config.max_backoff.as_millis() as f64)) as u64,
                );
            }
        }
    }
}

fn calculate_backoff(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let mut rng = rand::thread_rng();
        let jitter_factor = 1.0 + rng.gen_range(-0.3..0.3); // ±30%
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}
