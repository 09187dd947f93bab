use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Whether 500 responses carry the underlying error text.
static EXPOSE_INTERNAL: AtomicBool = AtomicBool::new(false);

/// Toggle internal error detail in responses (development mode).
pub fn expose_internal_details(enabled: bool) {
    EXPOSE_INTERNAL.store(enabled, Ordering::Relaxed);
}

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request failed validation.
    #[error("{0}")]
    Validation(String),

    /// Email already belongs to another account.
    #[error("An account already exists with this email")]
    DuplicateEmail,

    /// Password does not meet the strength rules.
    #[error("{0}")]
    WeakPassword(String),

    /// Password and confirmation differ.
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Email is not shaped like an address.
    #[error("Invalid email format")]
    InvalidEmailFormat,

    /// Unknown email or wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// No bearer token on a protected route.
    #[error("Authentication required")]
    MissingToken,

    /// Bearer token failed signature or expiry checks.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Registration is turned off in the configuration.
    #[error("Registration is disabled")]
    RegistrationDisabled,

    /// Resource not found error.
    #[error("{0}")]
    NotFound(String),

    /// Book creation without a PDF attached.
    #[error("A PDF file is required")]
    MissingFile,

    /// Upload rejected (size or type).
    #[error("{0}")]
    Upload(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable code carried in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::DuplicateEmail => "DUPLICATE_EMAIL",
            AppError::WeakPassword(_) => "WEAK_PASSWORD",
            AppError::PasswordMismatch => "PASSWORD_MISMATCH",
            AppError::InvalidEmailFormat => "INVALID_EMAIL_FORMAT",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::MissingToken => "TOKEN_MISSING",
            AppError::InvalidToken => "TOKEN_INVALID",
            AppError::RegistrationDisabled => "REGISTRATION_DISABLED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::MissingFile => "MISSING_FILE",
            AppError::Upload(_) => "UPLOAD_ERROR",
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::DuplicateEmail
            | AppError::WeakPassword(_)
            | AppError::PasswordMismatch
            | AppError::InvalidEmailFormat
            | AppError::MissingFile
            | AppError::Upload(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::MissingToken | AppError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::RegistrationDisabled => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error envelope: `{"error": {"code", "message"}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error payload.
    pub error: ErrorDetail,
}

/// Code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable code.
    pub code: &'static str,
    /// Description safe to show to the client.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request error");
            if EXPOSE_INTERNAL.load(Ordering::Relaxed) {
                self.to_string()
            } else {
                "Internal server error".to_string()
            }
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
            self.to_string()
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
