//! Error taxonomy shared by the registry, transport and dispatch layers.

use std::time::Duration;

use thiserror::Error;

/// Coarse error class that callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote side rejected our credentials; re-authenticate, do not retry.
    Unauthorized,
    NotFound,
    Timeout,
    Transport,
    Validation,
}

/// Errors from the storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Failed to (de)serialize stored record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from an MCP transport client.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("MCP server rejected authorization: {0}")]
    Unauthorized(String),

    #[error("Timeout after {0:?} waiting for MCP server")]
    Timeout(Duration),

    #[error("Failed to start MCP server: {0}")]
    SpawnFailed(String),

    #[error("MCP transport error: {0}")]
    Transport(String),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server returned error: code={code}, message={message}")]
    Server { code: i64, message: String },

    #[error("Invalid MCP server configuration: {0}")]
    InvalidConfig(String),
}

impl McpError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidConfig(_) => ErrorKind::Validation,
            Self::SpawnFailed(_) | Self::Transport(_) | Self::Protocol(_) | Self::Server { .. } => {
                ErrorKind::Transport
            }
        }
    }
}

/// Errors surfaced to callers of tool resolution and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Interactive callers are sent to this URL to (re)authorize.
    #[error("Authorization required, continue at {location}")]
    AuthorizationRequired { location: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No adapter available for tool {0}")]
    NoAdapter(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ToolError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) | Self::AuthorizationRequired { .. } => ErrorKind::Unauthorized,
            Self::NotFound(_) | Self::NoAdapter(_) => ErrorKind::NotFound,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transport(_) | Self::Storage(_) => ErrorKind::Transport,
        }
    }

    pub const fn is_unauthorized(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unauthorized)
    }
}

impl From<McpError> for ToolError {
    fn from(error: McpError) -> Self {
        let message = error.to_string();
        match error.kind() {
            ErrorKind::Unauthorized => Self::Unauthorized(message),
            ErrorKind::Timeout => Self::Timeout(message),
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Transport => Self::Transport(message),
        }
    }
}
