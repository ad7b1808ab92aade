//! Audio track replacement.

use std::path::Path;

use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Options for [`replace_audio_track`].
#[derive(Debug, Clone, Default)]
pub struct MuxOptions {
    /// Kill FFmpeg after this many seconds
    pub timeout_secs: Option<u64>,
}

/// Build the mux command: copy the first video stream, encode the new audio as AAC.
pub fn mux_command(video: &Path, audio: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(video, output)
        .input(audio)
        .video_codec("copy")
        .audio_codec("aac")
        .map("0:v:0")
        .map("1:a:0")
}

/// Replace the audio track of `video` with `audio`, writing `output`.
///
/// `on_progress` receives whole percentages relative to the probed video
/// duration. When the duration is unknown no percentages are reported.
/// A partial output is removed on failure.
pub async fn replace_audio_track<F>(
    video: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &MuxOptions,
    on_progress: F,
) -> MediaResult<()>
where
    F: Fn(u8) + Send + 'static,
{
    let video = video.as_ref();
    let audio = audio.as_ref();
    let output = output.as_ref();

    for input in [video, audio] {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
    }

    let total_ms = match probe_video(video).await {
        Ok(info) => info.duration_ms(),
        Err(e) => {
            warn!("Could not probe {}: {}; merge progress unavailable", video.display(), e);
            0
        }
    };

    let cmd = mux_command(video, audio, output);
    let mut runner = FfmpegRunner::new();
    if let Some(secs) = options.timeout_secs {
        runner = runner.with_timeout(secs);
    }

    let result = runner
        .run_with_progress(&cmd, move |progress| {
            if total_ms > 0 {
                on_progress(progress.percent(total_ms));
            }
        })
        .await;

    if let Err(e) = result {
        remove_partial(output).await;
        return Err(e);
    }

    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => {
            info!("Merged {} + {} -> {}", video.display(), audio.display(), output.display());
            Ok(())
        }
        _ => {
            remove_partial(output).await;
            Err(MediaError::OutputMissing(output.to_path_buf()))
        }
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mux_command_copies_video_and_encodes_audio() {
        let args = mux_command(Path::new("v.mp4"), Path::new("a.wav"), Path::new("m.mp4")).build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-i v.mp4 -i a.wav"));
        assert!(joined.contains("-c:v copy -c:a aac -map 0:v:0 -map 1:a:0 m.mp4"));
    }

    #[tokio::test]
    async fn test_missing_input_is_reported_before_running() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("v.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        let audio = dir.path().join("missing.wav");

        let result = replace_audio_track(
            &video,
            &audio,
            dir.path().join("out.mp4"),
            &MuxOptions::default(),
            |_| {},
        )
        .await;

        match result {
            Err(MediaError::FileNotFound(path)) => assert_eq!(path, audio),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
