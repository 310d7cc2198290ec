/// Error types for session-service
///
/// `Validation` and `NotFound` are terminal and reported verbatim. `Conflict`
/// and `Unavailable` are transient: they were already retried internally and
/// the caller may retry again. Business-rule rejections of an admission are
/// not errors; see [`crate::domain::Admission`].
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use session_store::{StoreError, UpdateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflicting concurrent update, gave up after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether a caller may retry the operation as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict { .. } | ServiceError::Unavailable(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict { .. } => "conflict",
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConditionFailed => ServiceError::Conflict { attempts: 1 },
            StoreError::Unavailable(msg) => ServiceError::Unavailable(msg),
            StoreError::Backend(msg) => ServiceError::Internal(msg),
            StoreError::Serialization(e) => ServiceError::Internal(e.to_string()),
        }
    }
}

impl From<UpdateError<ServiceError>> for ServiceError {
    fn from(err: UpdateError<ServiceError>) -> Self {
        match err {
            UpdateError::Aborted(e) => e,
            UpdateError::Conflict { attempts } => ServiceError::Conflict { attempts },
            UpdateError::Store(e) => e.into(),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        }))
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
