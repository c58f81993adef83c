use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Machine-readable failure kinds shared by every stage of the intake pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ExtractionUnavailable,
    EmptyExtraction,
    UnknownEntity,
    UnknownField,
    ConfirmationRequired,
    ConflictDetected,
    StorageFailure,
    SessionAlreadyActive,
    InvalidSessionState,
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ExtractionUnavailable => "extraction_unavailable",
            ErrorKind::EmptyExtraction => "empty_extraction",
            ErrorKind::UnknownEntity => "unknown_entity",
            ErrorKind::UnknownField => "unknown_field",
            ErrorKind::ConfirmationRequired => "confirmation_required",
            ErrorKind::ConflictDetected => "conflict_detected",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::SessionAlreadyActive => "session_already_active",
            ErrorKind::InvalidSessionState => "invalid_session_state",
            ErrorKind::NotFound => "not_found",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::ExtractionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::EmptyExtraction => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::UnknownEntity => StatusCode::NOT_FOUND,
            ErrorKind::UnknownField => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::ConfirmationRequired => StatusCode::PRECONDITION_REQUIRED,
            ErrorKind::ConflictDetected => StatusCode::CONFLICT,
            ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::SessionAlreadyActive => StatusCode::CONFLICT,
            ErrorKind::InvalidSessionState => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    #[error("Could not understand: {0}")]
    EmptyExtraction(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Session already active: {0}")]
    SessionAlreadyActive(String),

    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("Not Found: {0}")]
    NotFound(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppError::ExtractionUnavailable(_) => ErrorKind::ExtractionUnavailable,
            AppError::EmptyExtraction(_) => ErrorKind::EmptyExtraction,
            AppError::StorageFailure(_) => ErrorKind::StorageFailure,
            AppError::SessionAlreadyActive(_) => ErrorKind::SessionAlreadyActive,
            AppError::InvalidSessionState(_) => ErrorKind::InvalidSessionState,
            AppError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::InvalidInput(msg)
            | AppError::ExtractionUnavailable(msg)
            | AppError::EmptyExtraction(msg)
            | AppError::StorageFailure(msg)
            | AppError::SessionAlreadyActive(msg)
            | AppError::InvalidSessionState(msg)
            | AppError::NotFound(msg) => msg,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = kind.status_code();

        // The underlying cause of a storage failure is logged, never returned.
        let message = match &self {
            AppError::StorageFailure(cause) => {
                tracing::error!("Storage failure: {}", cause);
                "An internal storage error occurred".to_string()
            }
            other => {
                tracing::warn!("Request failed: {}: {}", status, other);
                other.message().to_string()
            }
        };

        let body = Json(json!({
            "error": {
                "kind": kind,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let value = serde_json::to_value(ErrorKind::ConfirmationRequired).unwrap();
        assert_eq!(value, json!("confirmation_required"));
        assert_eq!(ErrorKind::ConfirmationRequired.to_string(), "confirmation_required");
    }

    #[test]
    fn test_status_mapping() {
        let response = AppError::SessionAlreadyActive("section already recording".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::StorageFailure("connection reset".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = AppError::NotFound("session".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
