//! Pipeline orchestration.
//!
//! Sequences the four stages for one session: checks preconditions before a
//! stage starts, runs it behind a [`ProgressStream`], commits its output into
//! the session and applies the cleanup policy on failure or teardown.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::{FutureExt, Stream};
use tracing::Instrument;

use vdub_models::{ArtifactKind, ArtifactRef, ProgressEvent, Session, SessionId, Stage, StageOutput};
use vdub_providers::{ProgressReporter, Providers, PublishRequest};
use vdub_storage::{ArtifactStore, StorageError};

use crate::error::{PipelineError, PipelineResult};
use crate::logging::StageLogger;
use crate::metrics;
use crate::sessions::SessionStore;
use crate::stream::{ProgressStream, STAGE_PANIC_MESSAGE};

pub const DEFAULT_VIDEO_TITLE: &str = "My AI Generated Video";
pub const DEFAULT_VIDEO_DESCRIPTION: &str = "A video generated with AI narration.";
pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

const SOURCE_MISSING: &str = "Original video not found. Please upload again.";
const SCRIPT_MISSING: &str = "No script found. Please analyze the video first.";
const AUDIO_MISSING: &str = "Generated audio not found. Please generate speech first.";
const MERGED_MISSING: &str = "Merged video not found. Please merge first.";
const SESSION_CHANGED: &str = "The session was reset while this step was running. Please start again.";

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-stream buffer of intermediate events
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { event_buffer: 64 }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            event_buffer: std::env::var("PROGRESS_EVENT_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(64),
        }
    }
}

/// Runs pipeline stages on behalf of sessions.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    store: ArtifactStore,
    sessions: SessionStore,
    providers: Providers,
    config: OrchestratorConfig,
}

impl PipelineOrchestrator {
    pub fn new(store: ArtifactStore, sessions: SessionStore, providers: Providers) -> Self {
        Self {
            store,
            sessions,
            providers,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Current session record. Unknown sessions read as empty.
    pub async fn status(&self, id: &SessionId) -> Session {
        self.sessions.get_or_empty(id).await
    }

    /// Store an uploaded video and make it the session's source.
    ///
    /// Anything the session held before is torn down.
    pub async fn upload_video<S, B, E>(
        &self,
        id: &SessionId,
        filename: &str,
        data: S,
    ) -> PipelineResult<ArtifactRef>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let logger = StageLogger::for_operation(id, "upload");

        if filename.trim().is_empty() {
            return Err(PipelineError::validation("No selected video file"));
        }
        if let Some(active) = self.sessions.get(id).await.and_then(|s| s.active_stage) {
            return Err(PipelineError::Busy(active));
        }

        let artifact = self.store.allocate_upload(filename).map_err(|e| match e {
            StorageError::InvalidName(_) => {
                PipelineError::validation(format!("Invalid video filename: {}", filename))
            }
            other => other.into(),
        })?;

        let bytes = self.store.write_stream(&artifact, data).await?;
        if bytes == 0 {
            self.release(&logger, vec![artifact]).await;
            return Err(PipelineError::validation("Uploaded video file is empty"));
        }

        let replaced = match self
            .sessions
            .update_idle(id, |session| session.set_source_video(artifact.clone()))
            .await
        {
            Ok(replaced) => replaced,
            Err(e) => {
                self.release(&logger, vec![artifact]).await;
                return Err(e);
            }
        };
        let removed = self.release(&logger, replaced).await;

        metrics::record_upload(bytes);
        logger.log_completion(&format!(
            "stored {} ({} bytes), replaced {} files",
            artifact.name, bytes, removed
        ));
        Ok(artifact)
    }

    /// Analyze the session's video into a script.
    ///
    /// A failed analysis discards the upload and resets the session.
    pub async fn analyze_video(&self, id: &SessionId) -> PipelineResult<ProgressStream> {
        let video = self
            .sessions
            .begin_stage(id, Stage::Analyze, require_source)
            .await?;

        let this = self.clone();
        let session_id = id.clone();
        Ok(self.spawn_stage(id.clone(), Stage::Analyze, move |reporter, logger| async move {
            this.run_analysis(&session_id, video, reporter, &logger).await
        }))
    }

    async fn run_analysis(
        &self,
        id: &SessionId,
        video: ArtifactRef,
        reporter: ProgressReporter,
        logger: &StageLogger,
    ) -> ProgressEvent {
        reporter.progress(0, "Starting video analysis...");

        let result = match self.store.work_dir("temp_analysis_") {
            Ok(workdir) => {
                let result = contain(self.providers.analyzer.analyze(
                    video.path(),
                    workdir.path(),
                    &reporter,
                ))
                .await;
                workdir.cleanup();
                result
            }
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(script) => {
                logger.log_progress(&format!("script has {} segments", script.len()));
                let committed = self
                    .sessions
                    .update(id, |session| {
                        (session.source_video.as_ref() == Some(&video))
                            .then(|| session.commit_script(script.clone()))
                    })
                    .await;

                match committed {
                    Some(released) => {
                        self.release(logger, released).await;
                        ProgressEvent::complete("Analysis complete", StageOutput::Script(script))
                    }
                    None => ProgressEvent::error(SESSION_CHANGED),
                }
            }
            Err(detail) => {
                let released = self
                    .sessions
                    .update(id, |session| {
                        if session.source_video.as_ref() == Some(&video) {
                            session.clear()
                        } else {
                            Vec::new()
                        }
                    })
                    .await;
                self.release(logger, released).await;
                ProgressEvent::error(format!("Video analysis failed: {}", detail))
            }
        }
    }

    /// Synthesize narration audio for `text`.
    pub async fn synthesize_speech(
        &self,
        id: &SessionId,
        text: &str,
    ) -> PipelineResult<ProgressStream> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::validation("No script text provided"));
        }

        let audio = self.store.allocate(
            ArtifactKind::NarrationAudio,
            self.providers.synthesizer.output_extension(),
        )?;
        let video = self
            .sessions
            .begin_stage(id, Stage::Synthesize, |session| {
                let video = require_source(session)?;
                if session.script.is_none() {
                    return Err(PipelineError::precondition(SCRIPT_MISSING));
                }
                Ok(video)
            })
            .await?;

        let this = self.clone();
        let session_id = id.clone();
        Ok(self.spawn_stage(id.clone(), Stage::Synthesize, move |reporter, logger| async move {
            this.run_synthesis(&session_id, &text, video, audio, reporter, &logger)
                .await
        }))
    }

    async fn run_synthesis(
        &self,
        id: &SessionId,
        text: &str,
        video: ArtifactRef,
        audio: ArtifactRef,
        reporter: ProgressReporter,
        logger: &StageLogger,
    ) -> ProgressEvent {
        reporter.progress(0, "Starting speech generation...");

        let result = contain(
            self.providers
                .synthesizer
                .synthesize(text, audio.path(), &reporter),
        )
        .await;

        if let Err(e) = result {
            self.release(logger, vec![audio]).await;
            return ProgressEvent::error(format!("Speech generation failed: {}", e));
        }
        if !audio.exists() {
            return ProgressEvent::error("Speech generation failed: no audio file was written");
        }

        let committed = self
            .sessions
            .update(id, |session| {
                (session.source_video.as_ref() == Some(&video) && session.script.is_some())
                    .then(|| session.commit_narration(audio.clone()))
            })
            .await;

        match committed {
            Some(released) => {
                self.release(logger, released).await;
                ProgressEvent::complete("Speech generation complete!", StageOutput::Artifact(audio))
            }
            None => {
                self.release(logger, vec![audio]).await;
                ProgressEvent::error(SESSION_CHANGED)
            }
        }
    }

    /// Replace the source video's audio with the narration.
    pub async fn merge_video_audio(&self, id: &SessionId) -> PipelineResult<ProgressStream> {
        let merged = self.store.allocate(ArtifactKind::MergedVideo, "mp4")?;
        let (video, audio) = self
            .sessions
            .begin_stage(id, Stage::Merge, |session| {
                let video = require_source(session)?;
                let audio = session
                    .narration_audio
                    .as_ref()
                    .filter(|a| a.exists())
                    .cloned()
                    .ok_or_else(|| PipelineError::precondition(AUDIO_MISSING))?;
                Ok((video, audio))
            })
            .await?;

        let this = self.clone();
        let session_id = id.clone();
        Ok(self.spawn_stage(id.clone(), Stage::Merge, move |reporter, logger| async move {
            this.run_merge(&session_id, video, audio, merged, reporter, &logger)
                .await
        }))
    }

    async fn run_merge(
        &self,
        id: &SessionId,
        video: ArtifactRef,
        audio: ArtifactRef,
        merged: ArtifactRef,
        reporter: ProgressReporter,
        logger: &StageLogger,
    ) -> ProgressEvent {
        let result = contain(self.providers.muxer.merge(
            video.path(),
            audio.path(),
            merged.path(),
            &reporter,
        ))
        .await;

        if let Err(e) = result {
            self.release(logger, vec![merged]).await;
            return ProgressEvent::error(format!("Video merging failed: {}", e));
        }

        let committed = self
            .sessions
            .update(id, |session| {
                (session.source_video.as_ref() == Some(&video)
                    && session.narration_audio.as_ref() == Some(&audio))
                .then(|| session.commit_merged(merged.clone()))
            })
            .await;

        match committed {
            Some(released) => {
                self.release(logger, released).await;
                ProgressEvent::complete("Merge complete!", StageOutput::Artifact(merged))
            }
            None => {
                self.release(logger, vec![merged]).await;
                ProgressEvent::error(SESSION_CHANGED)
            }
        }
    }

    /// Upload the merged video. Missing title or description fall back to defaults.
    pub async fn publish(
        &self,
        id: &SessionId,
        title: Option<&str>,
        description: Option<&str>,
    ) -> PipelineResult<ProgressStream> {
        let request = publish_request(title, description)?;
        let merged = self
            .sessions
            .begin_stage(id, Stage::Publish, |session| {
                session
                    .merged_video
                    .as_ref()
                    .filter(|m| m.exists())
                    .cloned()
                    .ok_or_else(|| PipelineError::precondition(MERGED_MISSING))
            })
            .await?;

        let this = self.clone();
        let session_id = id.clone();
        Ok(self.spawn_stage(id.clone(), Stage::Publish, move |reporter, logger| async move {
            this.run_publish(&session_id, merged, request, reporter, &logger)
                .await
        }))
    }

    async fn run_publish(
        &self,
        id: &SessionId,
        merged: ArtifactRef,
        request: PublishRequest,
        reporter: ProgressReporter,
        logger: &StageLogger,
    ) -> ProgressEvent {
        reporter.message("Starting YouTube upload...");

        match contain(
            self.providers
                .uploader
                .publish(merged.path(), &request, &reporter),
        )
        .await
        {
            Ok(published) => {
                let committed = self
                    .sessions
                    .update(id, |session| {
                        let current = session.merged_video.as_ref() == Some(&merged);
                        if current {
                            session.commit_published(published.clone());
                        }
                        current
                    })
                    .await;
                if !committed {
                    // The upload happened; only the session record is gone
                    logger.log_warning("session changed during upload, result not recorded");
                }
                logger.log_progress(&format!("published as {}", published.video_id));
                ProgressEvent::complete(
                    "Upload to YouTube complete!",
                    StageOutput::Published(published),
                )
            }
            Err(e) => ProgressEvent::error(format!("YouTube upload failed: {}", e)),
        }
    }

    /// Delete every artifact the session references and reset it to empty.
    ///
    /// Returns how many files were removed. Delete failures are logged only.
    pub async fn teardown(&self, id: &SessionId) -> usize {
        let logger = StageLogger::for_operation(id, "teardown");
        let released = self.sessions.update(id, |session| session.clear()).await;
        let removed = self.release(&logger, released).await;
        logger.log_completion(&format!("removed {} files", removed));
        removed
    }

    /// Run a claimed stage on its own task and release the claim when it ends.
    fn spawn_stage<F, Fut>(&self, id: SessionId, stage: Stage, body: F) -> ProgressStream
    where
        F: FnOnce(ProgressReporter, StageLogger) -> Fut + Send + 'static,
        Fut: Future<Output = ProgressEvent> + Send + 'static,
    {
        let sessions = self.sessions.clone();

        ProgressStream::spawn(self.config.event_buffer, move |reporter| async move {
            let logger = StageLogger::new(&id, stage);
            let span = logger.create_span();
            logger.log_start(stage.as_str());
            metrics::record_stage_started(stage);
            let started = Instant::now();

            let outcome = tokio::spawn(body(reporter, logger.clone()).instrument(span)).await;
            sessions.end_stage(&id, stage).await;

            let terminal = match outcome {
                Ok(event) => event,
                Err(e) => {
                    logger.log_error(&format!("stage task failed: {}", e));
                    ProgressEvent::error(STAGE_PANIC_MESSAGE)
                }
            };

            let success = matches!(terminal, ProgressEvent::Complete { .. });
            if success {
                logger.log_completion(terminal.message_text());
            } else {
                logger.log_error(terminal.message_text());
            }
            metrics::record_stage_finished(stage, success, started.elapsed().as_secs_f64());

            terminal
        })
    }

    /// Delete released artifacts, returning how many files were removed.
    async fn release(&self, logger: &StageLogger, artifacts: Vec<ArtifactRef>) -> usize {
        let mut removed = 0;
        for artifact in artifacts {
            match self.store.delete(&artifact).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    logger.log_warning(&format!("failed to delete {}: {}", artifact.name, e));
                    metrics::record_cleanup_warning();
                }
            }
        }
        metrics::record_artifacts_removed(removed);
        removed
    }
}

/// Await a provider call, turning a panic inside it into an ordinary failure
/// so the stage's own cleanup still runs.
async fn contain<T, E, F>(call: F) -> Result<T, String>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(STAGE_PANIC_MESSAGE.to_string()),
    }
}

fn require_source(session: &Session) -> PipelineResult<ArtifactRef> {
    session
        .source_video
        .as_ref()
        .filter(|v| v.exists())
        .cloned()
        .ok_or_else(|| PipelineError::precondition(SOURCE_MISSING))
}

/// Apply defaults and validate publish metadata.
pub fn publish_request(
    title: Option<&str>,
    description: Option<&str>,
) -> PipelineResult<PublishRequest> {
    let title = title.map(str::trim).unwrap_or(DEFAULT_VIDEO_TITLE);
    if title.is_empty() {
        return Err(PipelineError::validation("Video title cannot be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(PipelineError::validation(format!(
            "Video title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    if title.contains(|c| c == '<' || c == '>') {
        return Err(PipelineError::validation(
            "Video title cannot contain '<' or '>'",
        ));
    }

    let description = description.unwrap_or(DEFAULT_VIDEO_DESCRIPTION).trim();
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(PipelineError::validation(format!(
            "Video description must be at most {} characters",
            MAX_DESCRIPTION_CHARS
        )));
    }

    Ok(PublishRequest {
        title: title.to_string(),
        description: description.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_defaults() {
        let request = publish_request(None, None).unwrap();
        assert_eq!(request.title, DEFAULT_VIDEO_TITLE);
        assert_eq!(request.description, DEFAULT_VIDEO_DESCRIPTION);
    }

    #[test]
    fn test_publish_title_validation() {
        assert!(publish_request(Some("  Title  "), Some("Desc")).is_ok());
        assert_eq!(publish_request(Some("  Title  "), None).unwrap().title, "Title");

        for bad in ["", "   ", "<script>", "a > b"] {
            assert!(
                matches!(publish_request(Some(bad), None), Err(PipelineError::Validation(_))),
                "{:?} should be rejected",
                bad
            );
        }

        let long = "x".repeat(MAX_TITLE_CHARS + 1);
        assert!(publish_request(Some(&long), None).is_err());
        let exact = "é".repeat(MAX_TITLE_CHARS);
        assert!(publish_request(Some(&exact), None).is_ok());
    }

    #[test]
    fn test_publish_description_limit() {
        let long = "d".repeat(MAX_DESCRIPTION_CHARS + 1);
        assert!(matches!(
            publish_request(None, Some(&long)),
            Err(PipelineError::Validation(_))
        ));
        assert_eq!(publish_request(None, Some("")).unwrap().description, "");
    }
}
