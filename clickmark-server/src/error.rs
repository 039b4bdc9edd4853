//! Error types for clickmark-server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Unknown username or wrong password (401, plain text)
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Upload request without any file (400)
    #[error("No files uploaded")]
    NoFiles,

    /// Required session missing or of the wrong kind (redirect to login)
    #[error("Session expired")]
    SessionExpired,

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Malformed request data (400)
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store or other shared-library error
    #[error("Common error: {0}")]
    Common(#[from] clickmark_common::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials").into_response()
            }
            AppError::NoFiles => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "No files uploaded" })),
            )
                .into_response(),
            AppError::SessionExpired => Redirect::to("/login").into_response(),
            AppError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::InvalidInput(msg) => error_body(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Io(err) => {
                error!("IO error: {}", err);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", err.to_string())
            }
            AppError::Common(clickmark_common::Error::NotFound(msg)) => {
                error_body(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            AppError::Common(clickmark_common::Error::InvalidInput(msg)) => {
                error_body(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            AppError::Common(err) => {
                error!("Store error: {}", err);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err.to_string())
            }
        }
    }
}

fn error_body(status: StatusCode, code: &str, message: String) -> Response {
    let body = Json(json!({
        "error": {
            "code": code,
            "message": message,
        }
    }));

    (status, body).into_response()
}

/// Result type for handlers
pub type AppResult<T> = Result<T, AppError>;
