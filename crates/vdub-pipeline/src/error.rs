//! Pipeline error types.
//!
//! These are the synchronous failures, raised before a stage starts. Faults
//! inside a running stage become a terminal `Error` event instead.

use thiserror::Error;
use vdub_models::Stage;
use vdub_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or malformed client input
    #[error("{0}")]
    Validation(String),

    /// A stage was requested before its inputs exist
    #[error("{0}")]
    Precondition(String),

    /// Another stage is still running for this session
    #[error("A {0} stage is already running for this session")]
    Busy(Stage),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}
