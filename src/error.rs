//! Structured error types for API responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

use crate::gateway::GatewayError;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    InvalidState,

    // Not found errors
    TaskNotFound,
    HitlNotFound,
    NoSession,

    // Upstream errors
    GatewayError,

    // Internal errors
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldValue
            | ErrorCode::NoSession => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidState => StatusCode::CONFLICT,
            ErrorCode::TaskNotFound | ErrorCode::HitlNotFound => StatusCode::NOT_FOUND,
            ErrorCode::GatewayError => StatusCode::BAD_GATEWAY,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Structured error returned to API clients.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task not found: {}", task_id),
        )
    }

    pub fn hitl_not_found(request_id: &str) -> Self {
        Self::new(
            ErrorCode::HitlNotFound,
            format!("HITL request not found: {}", request_id),
        )
    }

    pub fn no_session(task_id: &str) -> Self {
        Self::new(
            ErrorCode::NoSession,
            format!("No session associated with task {}", task_id),
        )
    }

    /// Upstream failure, prefixed with what we were trying to do.
    pub fn gateway(context: &str, err: &GatewayError) -> Self {
        Self::new(ErrorCode::GatewayError, format!("{}: {}", context, err))
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ApiError>() {
            Ok(api_err) => return api_err,
            Err(err) => err,
        };
        match err.downcast::<rusqlite::Error>() {
            Ok(db_err) => ApiError::database(db_err),
            Err(err) => ApiError::internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        if status.is_server_error() {
            tracing::warn!(code = ?self.code, message = %self.message, "Request failed");
        }
        (status, Json(self)).into_response()
    }
}

/// Result type for board and API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
