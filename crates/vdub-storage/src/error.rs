//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The upload directory could not be prepared at startup
    #[error("Failed to configure artifact store: {0}")]
    ConfigError(String),

    /// A streamed upload broke off before it was fully written
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    /// Names must stay a single path component with no traversal
    #[error("Invalid artifact name: {0}")]
    InvalidName(String),

    #[error("Path escapes the artifact store: {0}")]
    OutsideStore(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }

    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }
}
