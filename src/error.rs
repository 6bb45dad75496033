//! HTTP-facing errors.
//!
//! Core modules report their own `thiserror` types ([`ScanError`],
//! [`CodecError`]); handlers convert them into [`AppError`], which renders the
//! JSON envelope `{error:{code,message,details?}, status, timestamp}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt;

use crate::codec::CodecError;
use crate::scanner::ScanError;

#[derive(Debug)]
pub enum AppError {
    /// Unexpected failure; the client only sees an error id.
    Internal(anyhow::Error),
    BadRequest(String),
    NotFound(String),
    /// A scan is running or the lock is live.
    Conflict(String),
    ServiceUnavailable(String),
    /// Target resolves outside the configured media roots.
    Forbidden(String),
    InvalidInput(String),
    /// Catastrophic scan failure. Details are logged, never returned.
    Scanner(String),
    ValidationError {
        field: String,
        message: String,
    },
    IoError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::Scanner(msg) => write!(f, "Scanner error: {}", msg),
            AppError::ValidationError { field, message } => {
                write!(f, "Validation error on field '{}': {}", field, message)
            }
            AppError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    fn parts(self) -> (StatusCode, &'static str, String, Option<Value>) {
        match self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(error_id = %error_id, error = ?e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg, None),
            AppError::Scanner(msg) => {
                tracing::warn!(error = %msg, "scan failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "SCANNER_ERROR", "The scan failed".to_string(), None)
            }
            AppError::ValidationError { field, message } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
            AppError::IoError(msg) => {
                tracing::error!(error = %msg, "I/O error");
                (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", "An I/O error occurred".to_string(), None)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();
        let mut body = json!({
            "error": { "code": code, "message": message },
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(details) = details {
            body["error"]["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::NoMediaRoots | ScanError::ThumbDirUnset => AppError::BadRequest(err.to_string()),
            ScanError::Lock(e) => AppError::ServiceUnavailable(format!("Scan lock unavailable: {}", e)),
            ScanError::Pipeline(e) => AppError::Scanner(format!("{:#}", e)),
        }
    }
}

impl From<CodecError> for AppError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::ToolMissing { .. } | CodecError::Unavailable { .. } => {
                AppError::ServiceUnavailable(err.to_string())
            }
            CodecError::Io(e) => e.into(),
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(format!("{}: {}", err.kind(), err))
    }
}

impl From<globset::Error> for AppError {
    fn from(err: globset::Error) -> Self {
        AppError::InvalidInput(format!("Invalid glob pattern: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

pub trait OptionExt<T> {
    /// `None` becomes `NotFound("{entity} not found")`.
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Request validators. They run before anything touches the filesystem.
pub mod validation {
    use super::{AppError, AppResult};
    use std::path::Path;

    use crate::identity::{is_valid_file_id, FILE_ID_LEN};

    fn invalid(field: &str, message: impl Into<String>) -> AppError {
        AppError::ValidationError { field: field.to_string(), message: message.into() }
    }

    /// Ids are exactly 16 lowercase hex characters.
    pub fn validate_file_id(file_id: &str) -> AppResult<()> {
        if !is_valid_file_id(file_id) {
            return Err(invalid("file_id", format!("Expected {} lowercase hex characters", FILE_ID_LEN)));
        }
        Ok(())
    }

    /// A single media root: non-empty, no NUL bytes, absolute.
    pub fn validate_path(path: &str) -> AppResult<()> {
        if path.trim().is_empty() {
            return Err(invalid("media_dirs", "Path cannot be empty"));
        }
        if path.contains('\0') {
            return Err(invalid("media_dirs", "Path contains null characters"));
        }
        if !Path::new(path.trim()).is_absolute() {
            return Err(invalid("media_dirs", format!("Path must be absolute: {}", path)));
        }
        Ok(())
    }

    /// A full root list. Every entry must pass [`validate_path`] and exist as a directory.
    pub fn validate_media_dirs(paths: &[String]) -> AppResult<()> {
        if paths.is_empty() {
            return Err(invalid("media_dirs", "At least one directory is required"));
        }
        for path in paths {
            validate_path(path)?;
            if !Path::new(path.trim()).is_dir() {
                return Err(AppError::NotFound(format!("Directory does not exist: {}", path)));
            }
        }
        Ok(())
    }
}
