//! Error types for the Shelfmark server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    StorageFailure = 3,
    NotFound = 4,
    OutOfStock = 5,
    AlreadyReturned = 6,
    InUse = 7,
    Conflict = 8,
    BadValue = 9,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The book has no copy left to lend
    #[error("Out of stock: {0}")]
    OutOfStock(String),

    /// Return attempted on a loan that is already closed
    #[error("Already returned: {0}")]
    AlreadyReturned(String),

    /// Deletion blocked by referencing loan rows
    #[error("In use: {0}")]
    InUse(String),

    /// A raw stock adjustment or unique key would be violated
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Postgres SQLSTATE codes worth another attempt
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const UNIQUE_VIOLATION: &str = "23505";

impl AppError {
    /// Whether the failure came from contention or infrastructure and the
    /// whole transaction may be replayed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Storage(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) | Some(LOCK_NOT_AVAILABLE)
            ),
            AppError::Storage(sqlx::Error::PoolTimedOut)
            | AppError::Storage(sqlx::Error::Io(_)) => true,
            _ => false,
        }
    }

    /// Translate a unique-key violation into a `Conflict`, leave anything else untouched
    pub fn on_unique_violation(self, message: &str) -> Self {
        match &self {
            AppError::Storage(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                AppError::Conflict(message.to_string())
            }
            _ => self,
        }
    }

    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            AppError::OutOfStock(_) => (StatusCode::CONFLICT, ErrorCode::OutOfStock),
            AppError::AlreadyReturned(_) => (StatusCode::CONFLICT, ErrorCode::AlreadyReturned),
            AppError::InUse(_) => (StatusCode::CONFLICT, ErrorCode::InUse),
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Conflict),
            AppError::Validation(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue)
            }
            AppError::Storage(_) if self.is_transient() => {
                (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StorageFailure)
            }
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::StorageFailure),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::OutOfStock(msg)
            | AppError::AlreadyReturned(msg)
            | AppError::InUse(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                "Storage error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
