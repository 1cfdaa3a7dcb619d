//! Error types for the SyncApp server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Version conflict: current version is {current_version}")]
    VersionConflict { current_version: i64 },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Short machine-readable code, shared by REST bodies and WebSocket error events
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::VersionConflict { .. } => "version_conflict",
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidMessage(_) => "invalid_message",
            AppError::TransportFailure(_) => "transport_failure",
            AppError::Internal(_) => "internal_error",
            AppError::Database(_) => "database_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// Body returned when a conditional update loses the version race.
///
/// The client retries with `current_version` or discards its edit.
#[derive(Serialize)]
struct ConflictResponse {
    error: &'static str,
    current_version: i64,
    status: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::VersionConflict { current_version } => {
                let body = Json(ConflictResponse {
                    error: "version_conflict",
                    current_version: *current_version,
                    status: "conflict",
                });
                return (StatusCode::CONFLICT, body).into_response();
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) | AppError::InvalidMessage(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::TransportFailure(msg) | AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to encode payload".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
