//! Common error types for propmap

use thiserror::Error;

/// Common result type for propmap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the propmap server and uploader
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Uploaded log payload is structurally invalid; nothing was written
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Unrecognized query window
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
