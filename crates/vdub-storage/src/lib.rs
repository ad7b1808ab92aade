//! Local artifact store.
//!
//! This crate provides:
//! - A content directory shared by all sessions
//! - Collision-free generated artifact names
//! - Upload filename sanitization
//! - Streaming writes that never leave partial files behind
//! - Scoped transient work directories for stages

pub mod error;
pub mod sanitize;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use sanitize::{is_valid_artifact_name, secure_filename};
pub use store::{ArtifactStore, StoreConfig, WorkDir};
