//! RingCache Error Types

use thiserror::Error;

/// Result type alias for RingCache operations
pub type Result<T> = std::result::Result<T, Error>;

/// RingCache error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Wire errors
    #[error("Message serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    // Cache and backing store errors
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Backing store error: {0}")]
    Store(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    // Election errors
    #[error("No leader available")]
    NoLeader,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionTimeout(_)
                | Error::ConnectionFailed { .. }
                | Error::Network(_)
        )
    }

    /// Check if this error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
