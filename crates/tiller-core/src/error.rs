//! Error types for tiller.
//!
//! One error enum spans the whole core: bus and election failures, RPC
//! transport faults, station storage errors, and delivery network errors.

use std::path::PathBuf;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Main error type for tiller operations.
#[derive(Debug, Error)]
pub enum TillerError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Delivery relay rejected the frame with status {status}")]
    DeliveryRejected { status: u16 },

    #[error("Socket error: {message}")]
    Socket {
        message: String,
        #[source]
        source: Option<tungstenite::Error>,
    },

    // Coordination errors
    #[error("Broadcast bus closed")]
    BusClosed,

    #[error("RPC channel closed before a response arrived")]
    ChannelClosed,

    #[error("Remote call failed ({code}): {message}")]
    Remote { code: i32, message: String },

    // Dispatch errors
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid params for {method}: {message}")]
    InvalidParams { method: String, message: String },

    // Station errors
    #[error("Group not found: {group_id}")]
    GroupNotFound { group_id: String },

    #[error("Invalid invite token: {message}")]
    InvalidInvite { message: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for tiller operations.
pub type Result<T> = std::result::Result<T, TillerError>;

// Conversion implementations for common error types

impl From<std::io::Error> for TillerError {
    fn from(err: std::io::Error) -> Self {
        TillerError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TillerError {
    fn from(err: serde_json::Error) -> Self {
        TillerError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for TillerError {
    fn from(err: rusqlite::Error) -> Self {
        TillerError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for TillerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TillerError::Timeout(std::time::Duration::from_secs(0))
        } else {
            TillerError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl From<tungstenite::Error> for TillerError {
    fn from(err: tungstenite::Error) -> Self {
        TillerError::Socket {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<url::ParseError> for TillerError {
    fn from(err: url::ParseError) -> Self {
        TillerError::Config {
            message: format!("Invalid URL: {}", err),
        }
    }
}

impl TillerError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        TillerError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to an RPC fault code carried in the error marker of a response.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Network/connectivity error
    /// - -32001: Group not found
    /// - -32002: Invalid invite token
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            TillerError::MethodNotFound { .. } => -32601,

            TillerError::InvalidParams { .. } => -32602,

            TillerError::Network { .. }
            | TillerError::Timeout(_)
            | TillerError::DeliveryRejected { .. }
            | TillerError::Socket { .. } => -32000,

            TillerError::GroupNotFound { .. } => -32001,

            TillerError::InvalidInvite { .. } => -32002,

            // All other errors are internal errors
            _ => -32603,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TillerError::Network { .. }
                | TillerError::Timeout(_)
                | TillerError::Socket { .. }
        )
    }
}
