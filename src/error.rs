//! Error types for chorus
//!
//! Two layers, matching how the service is consumed:
//! - [`Error`]: typed domain errors used throughout the library. The
//!   configuration-error variants (unknown label, missing feature artifact,
//!   weight mismatch) stay distinguishable because they indicate pipeline
//!   integrity bugs rather than transient failures.
//! - [`ApiError`]: HTTP mapping with JSON error bodies and stable error
//!   codes for the annotation frontend.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Common result type for chorus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Domain error types
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Label not present in the configured vocabulary.
    /// Indicates a vocabulary/data mismatch, never skipped silently.
    #[error("Unknown label '{0}' (not in vocabulary)")]
    UnknownLabel(String),

    /// Feature artifact missing for an ingested recording.
    /// Fail-fast: an ingested recording without features is an ingestion bug.
    #[error("Feature stack not found for recording '{recording}': {path}")]
    MissingFeatures { recording: String, path: PathBuf },

    /// Feature artifact present but unusable (wrong shape, short stack, parse failure)
    #[error("Feature store error: {0}")]
    Features(String),

    /// Model weight persistence error (save/load/shape mismatch)
    #[error("Model artifact error: {0}")]
    ModelArtifact(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error type returned by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Label outside the configured vocabulary (422)
    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    /// Feature artifact missing for an ingested recording (500, distinguishable)
    #[error("Missing feature artifact: {0}")]
    MissingFeatures(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::UnknownLabel(label) => ApiError::UnknownLabel(label),
            Error::MissingFeatures { .. } => ApiError::MissingFeatures(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::UnknownLabel(label) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNKNOWN_LABEL", label)
            }
            ApiError::MissingFeatures(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "MISSING_FEATURES",
                msg,
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
