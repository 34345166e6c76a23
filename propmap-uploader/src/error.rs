//! Error types for propmap-uploader

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UploaderError>;

#[derive(Debug, Error)]
pub enum UploaderError {
    /// Server unreachable, connection dropped, timeout
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("Server rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Send-state file could not be read or written; fatal
    #[error("State file error {path}: {message}")]
    State { path: PathBuf, message: String },

    /// A watched file could not be read
    #[error("Scan error {path}: {message}")]
    Scan { path: PathBuf, message: String },
}

impl UploaderError {
    /// Errors that must stop the process rather than be retried next cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, UploaderError::State { .. })
    }
}
