//! Client error types
//!
//! [`ClientError`] describes what went wrong talking to the backend.
//! [`SessionError`] is the session flow's own taxonomy; it is cloneable so a
//! single profile-load outcome can be handed to every caller that joined it.

use std::time::Duration;
use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Structured error returned by the backend
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication required
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the backend rejected the credentials/token
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Unauthorized(_) => true,
            Self::Api { status, .. } => *status == 400 || *status == 401,
            _ => false,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Session flow error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Failed to fetch session: {0}")]
    SessionFetch(String),

    #[error("Failed to fetch profile: {0}")]
    ProfileFetch(String),

    #[error("Profile fetch timed out after {0:?}")]
    ProfileFetchTimeout(Duration),

    #[error("Sign-in failed: {0}")]
    SignIn(String),

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Sign-out failed: {0}")]
    SignOut(String),

    #[error("Sign-out timed out after {0:?}")]
    SignOutTimeout(Duration),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Permission denied: {module}:{action}")]
    PermissionDenied { module: String, action: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl SessionError {
    pub fn permission_denied(module: &str, action: &str) -> Self {
        Self::PermissionDenied {
            module: module.to_string(),
            action: action.to_string(),
        }
    }
}

impl From<ClientError> for SessionError {
    fn from(err: ClientError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
