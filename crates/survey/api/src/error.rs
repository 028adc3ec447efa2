//! Error types for the Haven API daemon.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use survey_service::WorkflowError;
use thiserror::Error;

/// Result type for daemon startup and lifecycle.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Daemon-level errors (startup, configuration, serving).
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-level errors, mapped to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Caller identity headers missing or malformed
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request input
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A workflow failure, carrying its own kind
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Structured error body: enough detail for the UI to render an
/// actionable message, never a generic "something went wrong".
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Workflow(err) => match err {
                WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
                WorkflowError::InvalidTransition { .. } => StatusCode::CONFLICT,
                WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
                WorkflowError::MissingReason | WorkflowError::MissingAssignee => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                WorkflowError::Conflict(_) => StatusCode::CONFLICT,
                WorkflowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Workflow(err) => err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
