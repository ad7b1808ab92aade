//! FFmpeg-backed audio track replacement.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use vdub_media::{replace_audio_track, MuxOptions};

use crate::error::ProviderResult;
use crate::reporter::ProgressReporter;
use crate::traits::MediaMuxer;

/// Muxes narration into a video with the local `ffmpeg` binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegMuxer {
    options: MuxOptions,
}

impl FfmpegMuxer {
    pub fn new(options: MuxOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl MediaMuxer for FfmpegMuxer {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        progress: &ProgressReporter,
    ) -> ProviderResult<()> {
        progress.progress(0, "Starting video-audio merge...");

        let reporter = progress.clone();
        let last = AtomicU8::new(u8::MAX);
        replace_audio_track(video, audio, output, &self.options, move |percent| {
            // FFmpeg emits a block per second; only forward changes
            if last.swap(percent, Ordering::Relaxed) != percent {
                reporter.progress(percent, format!("Merging: {}% complete...", percent));
            }
        })
        .await?;

        progress.progress(100, "Merge: Complete. Finalizing...");
        Ok(())
    }
}
