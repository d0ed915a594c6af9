//! Domain error types for the file service.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.
//! Every variant maps to exactly one HTTP status: 400 for malformed input,
//! 404 for missing records or objects, 500 for any downstream failure.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Object store could not be reached
    #[error("Storage unavailable: {0}")]
    StoreUnavailable(String),

    /// Object store rejected a write or delete
    #[error("Storage write failed: {0}")]
    StoreWriteFailed(String),

    /// Object key does not exist in the bucket
    #[error("Object not found: {0}")]
    StoreObjectNotFound(String),

    /// Bucket creation was rejected
    #[error("Bucket provisioning failed: {0}")]
    StoreProvisionFailed(String),

    /// Insert, update or delete against the metadata store failed
    #[error("Persistence write failed: {0}")]
    PersistenceWriteFailed(String),

    /// Query against the metadata store failed
    #[error("Persistence read failed: {0}")]
    PersistenceReadFailed(String),

    /// No file record with the given id
    #[error("File {0} not found")]
    RecordNotFound(i64),

    /// Summary provider failed or returned nothing usable
    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request deadline elapsed before the operation finished
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),
}

impl AppError {
    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::StoreWriteFailed(_) => "STORE_WRITE_FAILED",
            AppError::StoreObjectNotFound(_) => "STORE_OBJECT_NOT_FOUND",
            AppError::StoreProvisionFailed(_) => "STORE_PROVISION_FAILED",
            AppError::PersistenceWriteFailed(_) => "PERSISTENCE_WRITE_FAILED",
            AppError::PersistenceReadFailed(_) => "PERSISTENCE_READ_FAILED",
            AppError::RecordNotFound(_) => "NOT_FOUND",
            AppError::SummarizationFailed(_) => "SUMMARIZATION_FAILED",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::DeadlineExceeded(_) => "DEADLINE_EXCEEDED",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::RecordNotFound(_) | AppError::StoreObjectNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        let message = match self {
            AppError::PersistenceWriteFailed(err_str) | AppError::PersistenceReadFailed(err_str) => {
                tracing::error!("Database error: {}", err_str);
                "An internal database error occurred".to_string()
            }
            _ => {
                if status.is_server_error() {
                    tracing::error!("{}", self);
                }
                self.to_string()
            }
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: self.code().to_string(),
            message,
        })
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Reads go through `?`; writes map to PersistenceWriteFailed at the call site.
impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::PersistenceReadFailed(err.to_string())
    }
}
