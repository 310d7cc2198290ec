//! Deadlines for store and cache calls
//!
//! A call that outlives its deadline is reported as `Elapsed`, never as a
//! guessed success or failure of the underlying operation.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub duration: Duration,
}

impl TimeoutConfig {
    pub fn from_millis(millis: u64) -> Self {
        Self {
            duration: Duration::from_millis(millis),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::from_millis(2_000)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("deadline of {0:?} elapsed")]
    Elapsed(Duration),
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

impl<E> TimeoutError<E> {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, TimeoutError::Elapsed(_))
    }
}

/// Run a fallible call under a deadline; the call's own error passes through untouched
pub async fn with_timeout<F, T, E>(deadline: Duration, call: F) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| TimeoutError::Elapsed(deadline))?
        .map_err(TimeoutError::OperationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Rejected;

    #[tokio::test]
    async fn test_fast_call_passes() {
        let value = with_timeout(Duration::from_secs(1), async { Ok::<_, Rejected>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_slow_call_elapses() {
        let err = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, Rejected>(7)
        })
        .await
        .unwrap_err();
        assert!(err.is_elapsed());
    }

    #[tokio::test]
    async fn test_call_error_is_preserved() {
        let err = with_timeout(Duration::from_secs(1), async { Err::<u32, _>(Rejected) })
            .await
            .unwrap_err();
        match err {
            TimeoutError::OperationFailed(e) => assert_eq!(e, Rejected),
            TimeoutError::Elapsed(_) => panic!("call finished well before the deadline"),
        }
    }

    #[test]
    fn test_default_deadline() {
        assert_eq!(TimeoutConfig::default(), TimeoutConfig::from_millis(2_000));
    }
}
