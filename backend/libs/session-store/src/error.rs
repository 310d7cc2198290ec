//! Store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A conditional write found a different version than expected
    #[error("Condition check failed")]
    ConditionFailed,

    /// The backend timed out or could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Transient failures worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::ConditionFailed | StoreError::Unavailable(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
        {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
