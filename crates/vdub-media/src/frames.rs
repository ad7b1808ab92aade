//! Periodic frame sampling for visual analysis.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

const FRAME_PREFIX: &str = "frame_";

/// One still image taken from a video.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    /// JPEG file inside the caller's directory
    pub path: PathBuf,
    /// Offset into the video in seconds
    pub timestamp_secs: f64,
}

/// Write one JPEG every `interval_secs` seconds of `video` into `out_dir`.
///
/// Frames are returned in chronological order. The caller owns `out_dir`
/// and is responsible for removing it.
pub async fn sample_frames(
    video: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    interval_secs: f64,
) -> MediaResult<Vec<SampledFrame>> {
    let video = video.as_ref();
    let out_dir = out_dir.as_ref();

    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }
    let interval = if interval_secs > 0.0 { interval_secs } else { 2.0 };

    let pattern = out_dir.join(format!("{}%05d.jpg", FRAME_PREFIX));
    let cmd = FfmpegCommand::new(video, &pattern)
        .video_filter(sample_filter(interval))
        .quality(2);

    FfmpegRunner::new().run(&cmd).await?;

    let frames = collect_frames(out_dir, interval).await?;
    debug!("Sampled {} frames from {}", frames.len(), video.display());
    Ok(frames)
}

fn sample_filter(interval: f64) -> String {
    format!("fps=1/{}", interval)
}

/// List sampled frame files in numeric order and assign their timestamps.
async fn collect_frames(dir: &Path, interval: f64) -> MediaResult<Vec<SampledFrame>> {
    let mut numbered = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let index = name
            .strip_prefix(FRAME_PREFIX)
            .and_then(|rest| rest.strip_suffix(".jpg"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(index) = index {
            numbered.push((index, entry.path()));
        }
    }
    numbered.sort_by_key(|(index, _)| *index);

    // FFmpeg numbers output images from 1
    Ok(numbered
        .into_iter()
        .map(|(index, path)| SampledFrame {
            path,
            timestamp_secs: f64::from(index.saturating_sub(1)) * interval,
        })
        .collect())
}
