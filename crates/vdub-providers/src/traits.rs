//! Capability interfaces, one per pipeline stage.
//!
//! Implementations are chosen once at startup; new backends implement a
//! trait rather than touching call sites.

use std::path::Path;

use async_trait::async_trait;
use vdub_models::{PublishedVideo, Script};

use crate::error::ProviderResult;
use crate::reporter::ProgressReporter;

/// Produces a narration script from a video.
#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Analyze `video`. Transient files go under `workdir` and must be gone
    /// before returning; remote temporaries must be deleted remotely.
    async fn analyze(
        &self,
        video: &Path,
        workdir: &Path,
        progress: &ProgressReporter,
    ) -> ProviderResult<Script>;
}

/// Turns narration text into an audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// File extension of the audio this synthesizer writes.
    fn output_extension(&self) -> &'static str;

    /// Write exactly one audio file to `output` on success and nothing on failure.
    async fn synthesize(
        &self,
        text: &str,
        output: &Path,
        progress: &ProgressReporter,
    ) -> ProviderResult<()>;
}

/// Replaces a video's audio track.
#[async_trait]
pub trait MediaMuxer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        progress: &ProgressReporter,
    ) -> ProviderResult<()>;
}

/// Title and description for a published video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub title: String,
    pub description: String,
}

/// Uploads a finished video to a hosting platform.
#[async_trait]
pub trait PublishUploader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upload `video`, reporting progress by bytes transferred when known.
    async fn publish(
        &self,
        video: &Path,
        request: &PublishRequest,
        progress: &ProgressReporter,
    ) -> ProviderResult<PublishedVideo>;
}
