//! Shared data models for the vdub narration pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Sessions and their derived pipeline state
//! - Narration scripts
//! - Artifact references
//! - Progress events and their wire shape

pub mod artifact;
pub mod progress;
pub mod script;
pub mod session;

// Re-export common types
pub use artifact::{ArtifactKind, ArtifactRef};
pub use progress::{EventStatus, ProgressEvent, PublishedVideo, StageOutput, WireEvent};
pub use script::{Script, ScriptSegment, NARRATIVE_LABEL};
pub use session::{PipelineState, Session, SessionId, SessionIdError, Stage};
