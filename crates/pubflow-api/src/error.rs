//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps controller errors to HTTP status codes and returns JSON bodies with
//! a machine-readable code and a message. Internal details never reach
//! the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pubflow_lifecycle::ControllerError;
use pubflow_state::LifecycleError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "INVALID_TRANSITION", "NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body or header could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or malformed acting identity (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Rejected by the lifecycle controller. Status depends on the kind.
    #[error(transparent)]
    Lifecycle(#[from] ControllerError),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Lifecycle(err) => (lifecycle_status(err), err.code()),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn is_internal(&self) -> bool {
        self.status_and_code().0 == StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn lifecycle_status(err: &ControllerError) -> StatusCode {
    match err {
        ControllerError::Lifecycle(inner) => match inner {
            LifecycleError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            LifecycleError::InvalidTransition { .. }
            | LifecycleError::ConflictingRequest { .. }
            | LifecycleError::AlreadyResolved { .. } => StatusCode::CONFLICT,
            LifecycleError::PreconditionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LifecycleError::RequestNotFound { .. } => StatusCode::NOT_FOUND,
            LifecycleError::InvariantViolated(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ControllerError::ConflictingTransition { .. } => StatusCode::CONFLICT,
        ControllerError::NotFound(_) | ControllerError::RequestNotFound(_) => {
            StatusCode::NOT_FOUND
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if self.is_internal() {
            tracing::error!(error = %self, "internal server error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<pubflow_core::ValidationError> for AppError {
    fn from(err: pubflow_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
