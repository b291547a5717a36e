use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeygateError>;

/// Failures reported by an account directory backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("no account matches the key")]
    NotFound,
    #[error("an account already exists for the key")]
    AlreadyExists,
    #[error("account lookup failed: {0}")]
    LookupFailed(String),
    #[error("account write failed: {0}")]
    WriteFailed(String),
}

/// Failures reported by a usage store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("usage record failed: {0}")]
    RecordFailed(String),
    #[error("usage count failed: {0}")]
    CountFailed(String),
    #[error("atomic acquire is not supported by the {0} usage store")]
    Unsupported(&'static str),
}

#[derive(Debug, Error)]
pub enum KeygateError {
    #[error("An API key is required")]
    MissingKey,
    #[error("The account is not authorized to perform this operation")]
    NotAuthorized,
    #[error("The account request quota has been exceeded")]
    QuotaExceeded,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &KeygateError) -> Self {
        let message = err.to_string();
        match err {
            KeygateError::MissingKey => Self::new("missing_key", &message, 401),
            KeygateError::NotAuthorized => Self::new("not_authorized", &message, 401),
            KeygateError::QuotaExceeded => Self::new("quota_exceeded", &message, 429),
            KeygateError::InvalidRequest(_) => Self::new("bad_request", &message, 400),
            KeygateError::ValidationError(_) => Self::new("validation_error", &message, 422),
            KeygateError::Directory(DirectoryError::NotFound) => Self::new("not_found", &message, 404),
            KeygateError::Directory(DirectoryError::AlreadyExists) => Self::new("conflict", &message, 409),
            KeygateError::Directory(_) | KeygateError::Usage(_) | KeygateError::Redis(_) => {
                Self::new("service_unavailable", &message, 503)
            }
            KeygateError::Configuration(_) => Self::new("configuration_error", &message, 500),
        }
    }
}

impl IntoResponse for KeygateError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denials_map_to_client_errors() {
        assert_eq!(ErrorResponse::from_error(&KeygateError::MissingKey).code, 401);
        assert_eq!(ErrorResponse::from_error(&KeygateError::NotAuthorized).code, 401);
        assert_eq!(ErrorResponse::from_error(&KeygateError::QuotaExceeded).code, 429);
    }

    #[test]
    fn test_directory_errors_keep_their_status() {
        let not_found = KeygateError::from(DirectoryError::NotFound);
        assert_eq!(ErrorResponse::from_error(&not_found).code, 404);

        let duplicate = KeygateError::from(DirectoryError::AlreadyExists);
        assert_eq!(ErrorResponse::from_error(&duplicate).error, "conflict");

        let down = KeygateError::from(DirectoryError::LookupFailed("refused".into()));
        assert_eq!(ErrorResponse::from_error(&down).code, 503);
    }

    #[test]
    fn test_not_authorized_message_is_generic() {
        let response = ErrorResponse::from_error(&KeygateError::NotAuthorized);
        assert_eq!(
            response.message,
            "The account is not authorized to perform this operation"
        );
    }
}
