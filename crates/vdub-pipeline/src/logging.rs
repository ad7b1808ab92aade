//! Structured stage logging.

use tracing::{error, info, warn, Span};
use vdub_models::{SessionId, Stage};

/// Logs a stage's lifecycle with consistent `session_id` and `stage` fields.
#[derive(Debug, Clone)]
pub struct StageLogger {
    session_id: String,
    stage: &'static str,
}

impl StageLogger {
    pub fn new(session_id: &SessionId, stage: Stage) -> Self {
        Self {
            session_id: session_id.to_string(),
            stage: stage.as_str(),
        }
    }

    /// Logger for session operations that are not stages (upload, teardown).
    pub fn for_operation(session_id: &SessionId, operation: &'static str) -> Self {
        Self {
            session_id: session_id.to_string(),
            stage: operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(session_id = %self.session_id, stage = self.stage, "Stage started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(session_id = %self.session_id, stage = self.stage, "Stage progress: {}", message);
    }

    /// Cleanup problems and other non-fatal issues.
    pub fn log_warning(&self, message: &str) {
        warn!(session_id = %self.session_id, stage = self.stage, "Stage warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(session_id = %self.session_id, stage = self.stage, "Stage error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(session_id = %self.session_id, stage = self.stage, "Stage completed: {}", message);
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn stage(&self) -> &str {
        self.stage
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!("stage", session_id = %self.session_id, stage = self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_logger_fields() {
        let id = SessionId::new();
        let logger = StageLogger::new(&id, Stage::Merge);
        assert_eq!(logger.session_id(), id.as_str());
        assert_eq!(logger.stage(), "merge");

        let teardown = StageLogger::for_operation(&id, "teardown");
        assert_eq!(teardown.stage(), "teardown");
    }
}
