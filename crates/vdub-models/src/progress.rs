//! Progress events emitted by pipeline stages.
//!
//! A stage's event sequence is zero or more `InProgress` events followed by
//! exactly one terminal event (`Complete` or `Error`). On the wire every
//! event is flattened to `{status, progress?, message, result?}`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactRef;
use crate::script::Script;

/// Identifier and location of a published video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PublishedVideo {
    /// Platform-assigned video ID
    pub video_id: String,
    /// Public watch URL
    pub url: String,
}

/// Payload carried by a stage's `Complete` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageOutput {
    /// Analysis result
    Script(Script),
    /// Generated file (audio or merged video)
    Artifact(ArtifactRef),
    /// Publish result
    Published(PublishedVideo),
}

/// One unit of a stage's observable progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEvent", try_from = "WireEvent")]
pub enum ProgressEvent {
    /// Intermediate step; `percent` is absent when the stage cannot estimate completion
    InProgress { percent: Option<u8>, message: String },
    /// Terminal success
    Complete { message: String, result: StageOutput },
    /// Terminal failure
    Error { message: String },
}

impl ProgressEvent {
    /// Create an in-progress event with a percentage (clamped to 100).
    pub fn progress(percent: u8, message: impl Into<String>) -> Self {
        ProgressEvent::InProgress {
            percent: Some(percent.min(100)),
            message: message.into(),
        }
    }

    /// Create an in-progress event without a percentage.
    pub fn message(message: impl Into<String>) -> Self {
        ProgressEvent::InProgress {
            percent: None,
            message: message.into(),
        }
    }

    pub fn complete(message: impl Into<String>, result: StageOutput) -> Self {
        ProgressEvent::Complete {
            message: message.into(),
            result,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::InProgress { .. })
    }

    pub fn status(&self) -> EventStatus {
        match self {
            ProgressEvent::InProgress { .. } => EventStatus::InProgress,
            ProgressEvent::Complete { .. } => EventStatus::Complete,
            ProgressEvent::Error { .. } => EventStatus::Error,
        }
    }

    pub fn message_text(&self) -> &str {
        match self {
            ProgressEvent::InProgress { message, .. }
            | ProgressEvent::Complete { message, .. }
            | ProgressEvent::Error { message } => message,
        }
    }
}

/// Wire-level status discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    InProgress,
    Complete,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::InProgress => "in_progress",
            EventStatus::Complete => "complete",
            EventStatus::Error => "error",
        }
    }
}

/// Flat wire representation of a progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WireEvent {
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<StageOutput>,
}

impl From<ProgressEvent> for WireEvent {
    fn from(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::InProgress { percent, message } => WireEvent {
                status: EventStatus::InProgress,
                progress: percent,
                message,
                result: None,
            },
            ProgressEvent::Complete { message, result } => WireEvent {
                status: EventStatus::Complete,
                progress: Some(100),
                message,
                result: Some(result),
            },
            ProgressEvent::Error { message } => WireEvent {
                status: EventStatus::Error,
                progress: None,
                message,
                result: None,
            },
        }
    }
}

impl WireEvent {
    /// Rebuild the typed event; a `complete` event must carry a result.
    pub fn into_event(self) -> Result<ProgressEvent, String> {
        match self.status {
            EventStatus::InProgress => Ok(ProgressEvent::InProgress {
                percent: self.progress,
                message: self.message,
            }),
            EventStatus::Complete => match self.result {
                Some(result) => Ok(ProgressEvent::Complete {
                    message: self.message,
                    result,
                }),
                None => Err("complete event without result".to_string()),
            },
            EventStatus::Error => Ok(ProgressEvent::Error {
                message: self.message,
            }),
        }
    }
}

impl TryFrom<WireEvent> for ProgressEvent {
    type Error = String;

    fn try_from(wire: WireEvent) -> Result<Self, String> {
        wire.into_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptSegment;

    #[test]
    fn test_in_progress_wire_shape() {
        let json = serde_json::to_value(ProgressEvent::progress(150, "Merging")).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["progress"], 100);
        assert_eq!(json["message"], "Merging");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_progress_is_omitted_when_unknown() {
        let json = serde_json::to_value(ProgressEvent::message("Processing...")).unwrap();
        assert!(json.get("progress").is_none());
    }

    #[test]
    fn test_complete_carries_result() {
        let script = Script::new(vec![ScriptSegment::new("Narrative", "A room.")]);
        let event = ProgressEvent::complete("Analysis complete", StageOutput::Script(script));
        assert!(event.is_terminal());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "complete");
        assert_eq!(json["result"]["script"][0]["description"], "A room.");
    }

    #[test]
    fn test_complete_without_result_is_rejected() {
        let raw = r#"{"status":"complete","message":"done"}"#;
        assert!(serde_json::from_str::<ProgressEvent>(raw).is_err());
    }

    #[test]
    fn test_error_event_parses() {
        let raw = r#"{"status":"error","message":"rate limit exceeded"}"#;
        let event: ProgressEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event, ProgressEvent::error("rate limit exceeded"));
        assert_eq!(event.status().as_str(), "error");
    }
}
