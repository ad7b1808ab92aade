//! Narration scripts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label used when the analyzer produced free text instead of timestamped segments.
pub const NARRATIVE_LABEL: &str = "Narrative";

/// One chronological piece of the narration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptSegment {
    /// Free-form timestamp or marker (e.g. "01:05" or "Narrative")
    pub time: String,
    /// Narrative text for this moment
    pub description: String,
}

impl ScriptSegment {
    pub fn new(time: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            description: description.into(),
        }
    }

    /// Format a second offset as an `MM:SS` label.
    pub fn label_for_seconds(seconds: f64) -> String {
        let total = seconds.max(0.0) as u64;
        format!("{:02}:{:02}", total / 60, total % 60)
    }
}

/// Ordered sequence of script segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Script(pub Vec<ScriptSegment>);

impl Script {
    pub fn new(segments: Vec<ScriptSegment>) -> Self {
        Self(segments)
    }

    /// Wrap free text as a single narrative segment.
    pub fn from_free_text(text: impl AsRef<str>) -> Self {
        Self(vec![ScriptSegment::new(NARRATIVE_LABEL, text.as_ref().trim())])
    }

    pub fn segments(&self) -> &[ScriptSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there is nothing to narrate.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|s| s.description.trim().is_empty())
    }

    /// Plain narration text, one paragraph per segment.
    pub fn narration_text(&self) -> String {
        self.0
            .iter()
            .map(|s| s.description.trim())
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl From<Vec<ScriptSegment>> for Script {
    fn from(segments: Vec<ScriptSegment>) -> Self {
        Self(segments)
    }
}
