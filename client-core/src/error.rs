// client-core/src/error.rs
use thiserror::Error;

/// Failure from a REST call against the platform API
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

impl ApiError {
    pub fn unauthorized() -> Self {
        ApiError::Status {
            status: 401,
            message: "Unauthorized".to_string(),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error signals an authorization failure
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Failure from the durable storage layer
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("stored value for `{key}` is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Failure from the messaging client or its transport
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed frame: {0}")]
    Codec(String),

    #[error("broker rejected connection: {0}")]
    HandshakeFailed(String),

    #[error("failed to serialize outbound payload: {0}")]
    Serialize(#[from] serde_json::Error),
}
