// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use campusmeet_common::MeetingStatus;
use thiserror::Error;

use crate::validation::ValidationError;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission denied: {role} may not {action}")]
    PermissionDenied { role: String, action: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Meeting code already in use: {0}")]
    DuplicateMeetingCode(String),

    #[error("Meeting not found")]
    MeetingNotFound,

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: MeetingStatus,
        to: MeetingStatus,
    },

    #[error("Media access error: {0}")]
    MediaAccess(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Mail dispatch error: {0}")]
    Mail(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            AppError::MeetingNotFound => StatusCode::NOT_FOUND,
            AppError::DuplicateMeetingCode(_) | AppError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            },
            AppError::Mail(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VAL_001",
            AppError::PermissionDenied { .. } => "PERM_001",
            AppError::Persistence(_) => "STORE_001",
            AppError::DuplicateMeetingCode(_) => "STORE_002",
            AppError::MeetingNotFound => "MEET_001",
            AppError::InvalidTransition { .. } => "MEET_002",
            AppError::MediaAccess(_) => "MEDIA_001",
            AppError::Signaling(_) => "SIG_001",
            AppError::Mail(_) => "MAIL_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Invalid input provided".to_string(),
            AppError::PermissionDenied { .. } => {
                "You do not have permission to perform this action".to_string()
            },
            AppError::Persistence(_) => "The meeting could not be saved".to_string(),
            AppError::DuplicateMeetingCode(_) => {
                "Meeting code already in use, please retry".to_string()
            },
            AppError::MeetingNotFound => "Resource not found".to_string(),
            AppError::InvalidTransition { .. } => {
                "The meeting is not in a state that allows this".to_string()
            },
            AppError::MediaAccess(_) => {
                "Camera or microphone unavailable; check device permissions".to_string()
            },
            AppError::Signaling(_) => {
                "Connection to the meeting was lost; please rejoin".to_string()
            },
            AppError::Mail(_) => "Invitation emails could not be sent".to_string(),
            AppError::Json(_) => "Invalid request format".to_string(),
            AppError::Io(_) | AppError::Internal(_) => {
                "An internal server error occurred".to_string()
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_app_error_display() {
        let validation = AppError::Validation("title must not be empty".to_string());
        assert_eq!(
            validation.to_string(),
            "Validation error: title must not be empty"
        );

        let denied = AppError::PermissionDenied {
            role: "student".to_string(),
            action: "create".to_string(),
        };
        assert_eq!(denied.to_string(), "Permission denied: student may not create");

        let io_error = AppError::Io(IoError::new(ErrorKind::NotFound, "file not found"));
        assert!(io_error.to_string().contains("IO error"));
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::Validation("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::PermissionDenied {
                role: "guest".to_string(),
                action: "view".to_string(),
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::MeetingNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::DuplicateMeetingCode("A1B2C3D4".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::InvalidTransition {
                from: MeetingStatus::Completed,
                to: MeetingStatus::Cancelled,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Internal("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_app_error_error_codes() {
        assert_eq!(AppError::Validation("x".to_string()).error_code(), "VAL_001");
        assert_eq!(
            AppError::Persistence("x".to_string()).error_code(),
            "STORE_001"
        );
        assert_eq!(AppError::MeetingNotFound.error_code(), "MEET_001");
        assert_eq!(
            AppError::Signaling("bus closed".to_string()).error_code(),
            "SIG_001"
        );
        assert_eq!(
            AppError::MediaAccess("denied".to_string()).error_code(),
            "MEDIA_001"
        );
    }

    #[test]
    fn test_app_error_into_response() {
        let error = AppError::MeetingNotFound;
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response_headers = response.headers();
        assert!(response_headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("application/json"));
    }

    #[test]
    fn test_error_from_impls() {
        let io_err = IoError::new(ErrorKind::PermissionDenied, "permission denied");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));

        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let app_err: AppError = json_err.into();
        assert!(matches!(app_err, AppError::Json(_)));
    }
}
