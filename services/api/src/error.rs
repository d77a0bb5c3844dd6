//! services/api/src/error.rs
//!
//! Defines the primary error type for the API service, plus the translation of
//! core failures into HTTP status codes for the request handlers.

use crate::config::ConfigError;
use axum::http::StatusCode;
use dose_core::{AccountError, CredentialError, PortError, SessionError, SessionServiceError};
use tracing::error;

/// The primary error type for start-up and the server loop.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying the database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The error shape every handler returns.
pub type HandlerError = (StatusCode, String);

//=========================================================================================
// Core Failure -> HTTP Response
//=========================================================================================

pub fn session_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::InvalidStepKind { .. }
        | SessionError::EmptyResponse { .. }
        | SessionError::ResponseTooLong { .. }
        | SessionError::OutOfRange { .. }
        | SessionError::UnknownActionType(_)
        | SessionError::InputMismatch { .. } => StatusCode::BAD_REQUEST,
        SessionError::IllegalTransition { .. }
        | SessionError::IncompleteSteps { .. }
        | SessionError::NoActionChosen => StatusCode::CONFLICT,
        SessionError::DataIntegrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps a session service failure to a response. Storage details are logged,
/// not returned.
pub fn session_failure(err: SessionServiceError) -> HandlerError {
    match err {
        SessionServiceError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SessionServiceError::Forbidden(_) => (
            StatusCode::FORBIDDEN,
            "You do not have access to this session".to_string(),
        ),
        SessionServiceError::Conflict(_) => (
            StatusCode::CONFLICT,
            "The session was changed by another request, reload and retry".to_string(),
        ),
        SessionServiceError::Rejected(rejected) => {
            let status = session_status(&rejected);
            if status.is_server_error() {
                error!("Stored session failed validation: {:?}", rejected);
                return internal("Failed to load session");
            }
            (status, rejected.to_string())
        }
        SessionServiceError::Storage(e) => {
            error!("Session storage failure: {:?}", e);
            internal("Failed to access session storage")
        }
    }
}

pub fn credential_failure(err: CredentialError) -> HandlerError {
    match err {
        CredentialError::InvalidOrExpiredToken => (StatusCode::BAD_REQUEST, err.to_string()),
        CredentialError::Port(e) => {
            error!("Credential storage failure: {:?}", e);
            internal("Failed to process token")
        }
    }
}

pub fn account_failure(err: AccountError) -> HandlerError {
    match err {
        AccountError::InvalidEmail(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        AccountError::Inactive(_) | AccountError::Port(PortError::Unauthorized) => {
            (StatusCode::UNAUTHORIZED, "Sign-in was rejected".to_string())
        }
        other => {
            error!("Account linking failure: {:?}", other);
            internal("Failed to sign in")
        }
    }
}

pub fn internal(message: &str) -> HandlerError {
    (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
}
