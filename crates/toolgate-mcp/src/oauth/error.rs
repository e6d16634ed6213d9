//! OAuth flow errors.

use thiserror::Error;
use toolgate_core::{ErrorKind, StorageError, ToolError};

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("{0}")]
    Discovery(String),

    #[error("Authorization server must support PKCE S256")]
    PkceUnsupported,

    #[error("no_registration_endpoint")]
    NoRegistrationEndpoint,

    #[error("invalid_state")]
    InvalidState,

    #[error("no_token available")]
    NoToken,

    #[error("no_refresh_token available")]
    NoRefreshToken,

    /// The token endpoint answered 401.
    #[error("Token endpoint rejected the request: {0}")]
    Unauthorized(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("OAuth request timed out: {0}")]
    Timeout(String),

    #[error("OAuth transport error: {0}")]
    Transport(String),

    #[error("Unexpected OAuth response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OAuthError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NoToken | Self::NoRefreshToken | Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::InvalidState | Self::Discovery(_) => ErrorKind::NotFound,
            Self::PkceUnsupported | Self::NoRegistrationEndpoint | Self::InvalidUrl(_) => {
                ErrorKind::Validation
            }
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Http { .. } | Self::Transport(_) | Self::InvalidResponse(_) | Self::Storage(_) => {
                ErrorKind::Transport
            }
        }
    }
}

impl From<OAuthError> for ToolError {
    fn from(error: OAuthError) -> Self {
        if let OAuthError::Storage(inner) = error {
            return Self::Storage(inner);
        }
        let message = error.to_string();
        match error.kind() {
            ErrorKind::Unauthorized => Self::Unauthorized(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::Timeout => Self::Timeout(message),
            ErrorKind::Transport => Self::Transport(message),
        }
    }
}
