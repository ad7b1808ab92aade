//! Media error types.

use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg is not installed or not on PATH")]
    FfmpegNotFound,

    #[error("ffprobe is not installed or not on PATH")]
    FfprobeNotFound,

    /// FFmpeg ran and failed; `stderr` holds its last diagnostic lines
    #[error("FFmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("ffprobe failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("FFmpeg reported success but wrote no output at {0}")]
    OutputMissing(PathBuf),

    #[error("FFmpeg did not finish within {0}s")]
    Timeout(u64),

    #[error("Not a usable video: {0}")]
    InvalidVideo(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Unreadable ffprobe output: {0}")]
    Json(#[from] serde_json::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// The error with the transcoder's own diagnostics appended, when there are any.
    pub fn detail(&self) -> String {
        let stderr = match self {
            Self::FfmpegFailed { stderr, .. } | Self::FfprobeFailed { stderr, .. } => {
                stderr.as_deref().map(str::trim).filter(|s| !s.is_empty())
            }
            _ => None,
        };
        match stderr {
            Some(stderr) => format!("{}: {}", self, stderr),
            None => self.to_string(),
        }
    }
}
