//! Error types for the caching engine
//!
//! Provides unified error handling using thiserror. Most variants never leave
//! the store boundary: backend failures are logged and
//! absorbed there. Only programming errors such as a malformed pattern reach
//! the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the caching engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Shared backend unreachable, timed out or returned an error
    #[error("Backend unavailable during {op}: {message}")]
    BackendUnavailable { op: &'static str, message: String },

    /// Malformed glob passed to pattern deletion
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn backend(op: &'static str, err: impl std::fmt::Display) -> Self {
        CacheError::BackendUnavailable {
            op,
            message: err.to_string(),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::InvalidPattern { .. } => {
                StatusCode::BAD_REQUEST
            }
            CacheError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching engine.
pub type Result<T> = std::result::Result<T, CacheError>;
