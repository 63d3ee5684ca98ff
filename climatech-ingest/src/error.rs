//! Error types for climatech-ingest HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{FirmsError, PipelineError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g. acquisition already running for the place
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Remote service failed (502)
    #[error("Upstream error: {0}")]
    BadGateway(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<climatech_common::Error> for ApiError {
    fn from(err: climatech_common::Error) -> Self {
        match err {
            climatech_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            climatech_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::PlaceNotFound(_) => ApiError::NotFound(message),
            PipelineError::PlaceBusy(_) => ApiError::Conflict(message),
            PipelineError::Login(_)
            | PipelineError::Submit(_)
            | PipelineError::Listing(_)
            | PipelineError::TaskFailed { .. }
            | PipelineError::PollTimeout { .. }
            | PipelineError::NoInput { .. } => ApiError::BadGateway(message),
            PipelineError::Cancelled => ApiError::Internal(message),
            PipelineError::Storage(e) => ApiError::from(e),
        }
    }
}

impl From<FirmsError> for ApiError {
    fn from(err: FirmsError) -> Self {
        match err {
            FirmsError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

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
pub type ApiResult<T> = Result<T, ApiError>;
