//! Artifact references.
//!
//! The artifact store owns the bytes; sessions only hold these references.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Video uploaded by the client
    SourceVideo,
    /// Synthesized narration audio
    NarrationAudio,
    /// Source video with the narration muxed in
    MergedVideo,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::SourceVideo => "source_video",
            ArtifactKind::NarrationAudio => "narration_audio",
            ArtifactKind::MergedVideo => "merged_video",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to a file living in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactRef {
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Generated unique file name inside the store
    pub name: String,
    /// Public URL the file is served under
    pub url: String,
    /// Absolute location on disk (never sent to clients)
    #[serde(skip)]
    #[schemars(skip)]
    pub path: PathBuf,
}

impl ArtifactRef {
    pub fn new(
        kind: ArtifactKind,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            path: path.into(),
            url: url.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the underlying file is still present.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}
