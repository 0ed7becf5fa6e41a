// src/error.rs

use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;

/// Global Application Error Enum.
/// Centralizes error handling for the API client, the local store and the
/// attempt flow.
#[derive(Debug)]
pub enum AppError {
    // Missing, expired or rejected credentials (HTTP 401)
    AuthError(String),

    // Authenticated but not allowed (HTTP 403)
    Forbidden(String),

    // Rejected input, either by local validation or by the backend (HTTP 400)
    BadRequest(String),

    // Missing entity or empty result that the caller must render (HTTP 404)
    NotFound(String),

    // Duplicate or conflicting write (HTTP 409)
    Conflict(String),

    // The request never got a usable answer: connect/timeout/decode failures
    Network(String),

    // The backend answered with a 5xx or an unexpected status
    Server { status: u16, message: String },

    // Local SQLite store failures
    Storage(String),

    // A submission is already running or has completed for this attempt
    SubmissionInFlight,

    InternalError(String),
}

/// The three recovery paths a caller can take for any error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Clear the session and go to the login screen.
    Auth,
    /// Render an explicit empty state with a way back to home.
    Empty,
    /// Notify, keep local state, allow retry.
    Transient,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::AuthError(msg) => write!(f, "Authentication required: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            AppError::Storage(msg) => write!(f, "Local storage error: {}", msg),
            AppError::SubmissionInFlight => write!(f, "Submission already in progress"),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Error body shape used by the backend (`{ "message": "..." }`).
#[derive(Debug, Deserialize)]
struct BackendMessage {
    #[serde(alias = "Message", alias = "error", alias = "title")]
    message: Option<String>,
}

impl AppError {
    /// Maps a non-success HTTP response onto the error taxonomy.
    /// `body` is the raw response text; a `message` field is surfaced when present.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<BackendMessage>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unexpected response")
                    .to_string()
            });

        match status {
            StatusCode::UNAUTHORIZED => AppError::AuthError(message),
            StatusCode::FORBIDDEN => AppError::Forbidden(message),
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                AppError::BadRequest(message)
            }
            StatusCode::CONFLICT => AppError::Conflict(message),
            other => AppError::Server {
                status: other.as_u16(),
                message,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::AuthError(_) => ErrorKind::Auth,
            AppError::NotFound(_) => ErrorKind::Empty,
            _ => ErrorKind::Transient,
        }
    }

    pub fn redirects_to_login(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// Whether repeating the same action may succeed without user changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::Server { .. } | AppError::Storage(_)
        )
    }
}

/// Converts `sqlx::Error` into `AppError::Storage`.
/// Allows using `?` operator on local store queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Network(format!("Malformed response body: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => AppError::from_status(status, ""),
            None => AppError::Network(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::InternalError(format!("Invalid URL: {}", err))
    }
}
