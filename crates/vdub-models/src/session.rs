//! Per-client pipeline sessions.
//!
//! A session holds the references produced by each stage so that later
//! stages can locate earlier outputs. Its pipeline state is derived from
//! which references are set, never stored separately.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::artifact::ArtifactRef;
use crate::progress::PublishedVideo;
use crate::script::Script;

/// Rejected session identifier.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid session id: {0}")]
pub struct SessionIdError(pub String);

/// Opaque session identifier (a UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse a client-supplied ID. Only UUIDs are accepted.
    pub fn parse(s: &str) -> Result<Self, SessionIdError> {
        Uuid::parse_str(s.trim())
            .map(|u| Self(u.to_string()))
            .map_err(|_| SessionIdError(s.chars().take(64).collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pipeline step that runs behind a progress stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyze,
    Synthesize,
    Merge,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analyze => "analyze",
            Stage::Synthesize => "synthesize",
            Stage::Merge => "merge",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a session is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Empty,
    VideoUploaded,
    ScriptReady,
    AudioReady,
    Merged,
    Published,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Empty => "empty",
            PipelineState::VideoUploaded => "video_uploaded",
            PipelineState::ScriptReady => "script_ready",
            PipelineState::AudioReady => "audio_ready",
            PipelineState::Merged => "merged",
            PipelineState::Published => "published",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One client's in-progress pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Session {
    pub id: SessionId,
    /// Uploaded video
    pub source_video: Option<ArtifactRef>,
    /// Analysis result
    pub script: Option<Script>,
    /// Synthesized narration
    pub narration_audio: Option<ArtifactRef>,
    /// Video with narration muxed in
    pub merged_video: Option<ArtifactRef>,
    /// Publish result
    pub published: Option<PublishedVideo>,
    /// Stage currently running for this session, if any
    pub active_stage: Option<Stage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_video: None,
            script: None,
            narration_audio: None,
            merged_video: None,
            published: None,
            active_stage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the pipeline state from the references that are set.
    pub fn state(&self) -> PipelineState {
        if self.published.is_some() {
            PipelineState::Published
        } else if self.merged_video.is_some() {
            PipelineState::Merged
        } else if self.narration_audio.is_some() {
            PipelineState::AudioReady
        } else if self.script.is_some() {
            PipelineState::ScriptReady
        } else if self.source_video.is_some() {
            PipelineState::VideoUploaded
        } else {
            PipelineState::Empty
        }
    }

    /// Nothing stored and no stage running; indistinguishable from a new session.
    pub fn is_vacant(&self) -> bool {
        self.active_stage.is_none() && self.state() == PipelineState::Empty
    }

    /// Unset every field and hand back the artifacts that were referenced.
    ///
    /// `active_stage` is left alone: a running stage still owns its slot.
    pub fn clear(&mut self) -> Vec<ArtifactRef> {
        let released = [
            self.source_video.take(),
            self.narration_audio.take(),
            self.merged_video.take(),
        ]
        .into_iter()
        .flatten()
        .collect();
        self.script = None;
        self.published = None;
        self.touch();
        released
    }

    /// Record an uploaded video. Returns the artifacts the new upload replaces.
    pub fn set_source_video(&mut self, video: ArtifactRef) -> Vec<ArtifactRef> {
        let released = self.clear();
        self.source_video = Some(video);
        released
    }

    /// Record a finished analysis. Downstream outputs become stale and are released.
    pub fn commit_script(&mut self, script: Script) -> Vec<ArtifactRef> {
        let released = self.release_after_script();
        self.script = Some(script);
        self.touch();
        released
    }

    /// Record synthesized narration, releasing any older audio and merged video.
    pub fn commit_narration(&mut self, audio: ArtifactRef) -> Vec<ArtifactRef> {
        let mut released = self.release_after_narration();
        released.extend(self.narration_audio.replace(audio));
        self.touch();
        released
    }

    /// Record a merged video, releasing any older merge.
    pub fn commit_merged(&mut self, merged: ArtifactRef) -> Vec<ArtifactRef> {
        self.release_after_merge();
        let released = self.merged_video.replace(merged).into_iter().collect();
        self.touch();
        released
    }

    pub fn commit_published(&mut self, published: PublishedVideo) {
        self.published = Some(published);
        self.touch();
    }

    fn release_after_script(&mut self) -> Vec<ArtifactRef> {
        let mut released = self.release_after_narration();
        released.extend(self.narration_audio.take());
        released
    }

    fn release_after_narration(&mut self) -> Vec<ArtifactRef> {
        self.release_after_merge();
        self.merged_video.take().into_iter().collect()
    }

    fn release_after_merge(&mut self) {
        self.published = None;
    }

    /// Bump the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
