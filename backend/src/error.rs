//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Not found error (site, device, command)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflict error (e.g., duplicate serial number within a site)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested transition is not allowed from the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Address parse error
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Status code and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MIGRATION_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::InvalidState(_) => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            AppError::AddrParse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ADDR_PARSE_ERROR"),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "JSON_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::Config(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg)
            | AppError::InvalidState(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::Database(_) => "Database operation failed".to_string(),
            AppError::Migration(_) => "Database migration failed".to_string(),
            AppError::Io(_) => "IO operation failed".to_string(),
            AppError::AddrParse(_) => "Invalid address".to_string(),
            AppError::Json(_) => "Invalid JSON".to_string(),
        };

        // Log the error
        tracing::error!(error = %self, code = code, "Request error");

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
