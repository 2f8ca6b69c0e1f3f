//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Network or status failure unrelated to authorization
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A 401 survived one refresh-and-retry cycle, or the refresh itself failed
    #[error("Session expired")]
    AuthExpired,

    /// The caller cancelled the request before it settled
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// Token refresh error
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] session_storage::StorageError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<auth_config_and_utils::CoreError> for AuthError {
    fn from(err: auth_config_and_utils::CoreError) -> Self {
        AuthError::Config(err.to_string())
    }
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried
    /// by the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|status| status.is_server_error())
            }
            _ => false,
        }
    }

    /// Transport-level failure (not authorization related).
    pub fn is_transport(&self) -> bool {
        matches!(self, AuthError::Transport(_) | AuthError::Http(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuthError::Cancelled(_))
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, AuthError::AuthExpired)
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
