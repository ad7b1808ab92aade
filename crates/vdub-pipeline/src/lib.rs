//! Stage orchestration for the narration pipeline.
//!
//! This crate provides:
//! - [`ProgressStream`]: ordered, single-terminal event stream of one stage run
//! - [`SessionStore`]: per-session pipeline records
//! - [`PipelineOrchestrator`]: precondition checks, stage execution, commits and cleanup

pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod sessions;
pub mod stream;

pub use error::{PipelineError, PipelineResult};
pub use logging::StageLogger;
pub use orchestrator::{
    publish_request, OrchestratorConfig, PipelineOrchestrator, DEFAULT_VIDEO_DESCRIPTION,
    DEFAULT_VIDEO_TITLE,
};
pub use sessions::SessionStore;
pub use stream::ProgressStream;
