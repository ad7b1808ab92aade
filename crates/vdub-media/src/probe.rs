//! FFprobe media information.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// What the pipeline needs to know about an input video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Container duration in seconds, 0 when ffprobe cannot tell
    pub duration: f64,
    pub has_audio: bool,
}

impl VideoInfo {
    pub fn duration_ms(&self) -> i64 {
        (self.duration * 1000.0) as i64
    }
}

#[derive(Debug, Deserialize)]
struct ProbeDoc {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
}

/// Read duration and stream layout of a video file.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json"])
        .args(["-show_entries", "format=duration:stream=codec_type"])
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("cannot read {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        });
    }

    parse_probe(&output.stdout)
}

fn parse_probe(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let doc: ProbeDoc = serde_json::from_slice(stdout)?;
    let has = |kind: &str| doc.streams.iter().any(|s| s.codec_type == kind);

    if !has("video") {
        return Err(MediaError::InvalidVideo("no video stream".to_string()));
    }

    let duration = doc
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    Ok(VideoInfo {
        duration,
        has_audio: has("audio"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe() {
        let json = br#"{
            "streams": [{"codec_type": "video"}, {"codec_type": "audio"}],
            "format": {"duration": "12.480000"}
        }"#;

        let info = parse_probe(json).unwrap();
        assert!(info.has_audio);
        assert_eq!(info.duration_ms(), 12480);
    }

    #[test]
    fn test_unknown_duration_is_zero() {
        let json = br#"{"streams": [{"codec_type": "video"}], "format": {"duration": "N/A"}}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.duration, 0.0);
        assert!(!info.has_audio);
    }

    #[test]
    fn test_audio_only_is_rejected() {
        let json = br#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(parse_probe(json), Err(MediaError::InvalidVideo(_))));
    }
}
