//! FFmpeg invocation.
//!
//! [`FfmpegCommand`] assembles an argument list; [`FfmpegRunner`] executes it
//! with `-progress pipe:2`, feeding progress blocks to a callback and keeping
//! the last diagnostic lines for error reports.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Diagnostic lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 20;

/// Arguments for one FFmpeg run: numbered inputs, output options, one output.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<PathBuf>,
    options: Vec<String>,
    output: PathBuf,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![input.as_ref().to_path_buf()],
            options: Vec::new(),
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Add an input. Inputs are numbered from 0 in the order added.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add an output option and its value.
    pub fn option(mut self, flag: &str, value: impl Into<String>) -> Self {
        self.options.push(flag.to_string());
        self.options.push(value.into());
        self
    }

    pub fn video_codec(self, codec: &str) -> Self {
        self.option("-c:v", codec)
    }

    pub fn audio_codec(self, codec: &str) -> Self {
        self.option("-c:a", codec)
    }

    /// Select a stream for the output, e.g. `1:a:0`.
    pub fn map(self, spec: &str) -> Self {
        self.option("-map", spec)
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.option("-vf", filter)
    }

    /// JPEG quality scale, 2 is near lossless.
    pub fn quality(self, q: u8) -> Self {
        self.option("-q:v", q.to_string())
    }

    /// Full argument list, excluding the program name.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-v", "error", "-nostats", "-progress", "pipe:2"]
            .into_iter()
            .map(String::from)
            .collect();

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.display().to_string());
        }
        args.extend(self.options.iter().cloned());
        args.push(self.output.display().to_string());
        args
    }
}

/// Executes [`FfmpegCommand`]s, optionally bounded by a timeout.
#[derive(Debug, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run `cmd`, calling `on_progress` at the end of every progress block.
    ///
    /// A non-zero exit carries the tail of FFmpeg's diagnostics.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;
        let args = cmd.build_args();
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
        let reader = tokio::spawn(read_stderr(stderr, on_progress));

        let waited = self.wait(&mut child).await;
        let diagnostics = reader.await.unwrap_or_default();

        let outcome = match waited {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(MediaError::ffmpeg_failed(
                format!("FFmpeg exited with status {}", status.code().unwrap_or(-1)),
                (!diagnostics.is_empty()).then_some(diagnostics),
                status.code(),
            )),
            Err(e) => Err(e),
        };

        let label = if outcome.is_ok() { "success" } else { "failure" };
        metrics::counter!("vdub_ffmpeg_runs_total", "outcome" => label).increment(1);
        outcome
    }

    async fn wait(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let Some(limit) = self.timeout else {
            return Ok(child.wait().await?);
        };
        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!("FFmpeg exceeded {}s, killing it", limit.as_secs());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill FFmpeg: {}", e);
                }
                Err(MediaError::Timeout(limit.as_secs()))
            }
        }
    }
}

/// Split stderr into progress blocks and a tail of diagnostic lines.
async fn read_stderr<F>(stderr: ChildStderr, on_progress: F) -> String
where
    F: Fn(FfmpegProgress),
{
    let mut lines = BufReader::new(stderr).lines();
    let mut state = FfmpegProgress::default();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        match progress_pair(&line) {
            Some((key, value)) => {
                if let Some(snapshot) = state.apply(key, value) {
                    on_progress(snapshot);
                }
            }
            None if !line.trim().is_empty() => {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            None => {}
        }
    }

    Vec::from(tail).join("\n")
}

/// `-progress` writes bare `key=value` lines with lowercase keys.
fn progress_pair(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.trim().split_once('=')?;
    let key_ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    (key_ok && !value.contains(' ')).then_some((key, value))
}

/// Locate `ffmpeg` on PATH.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Locate `ffprobe` on PATH.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_keep_order() {
        let args = FfmpegCommand::new("video.mp4", "out.mp4")
            .input("audio.wav")
            .video_codec("copy")
            .map("0:v:0")
            .map("1:a:0")
            .build_args();

        let first = args.iter().position(|a| a == "video.mp4").unwrap();
        let second = args.iter().position(|a| a == "audio.wav").unwrap();
        assert!(first < second);
        assert_eq!(args[first - 1], "-i");
        assert_eq!(args[second - 1], "-i");
        assert_eq!(args[0], "-y");
        assert_eq!(args.last().unwrap(), "out.mp4");

        let maps: Vec<_> = args
            .windows(2)
            .filter(|w| w[0] == "-map")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(maps, ["0:v:0", "1:a:0"]);
    }

    #[test]
    fn test_progress_lines_are_told_apart_from_errors() {
        assert_eq!(progress_pair("out_time_us=1000"), Some(("out_time_us", "1000")));
        assert!(progress_pair("stream_0_0_q=-1.0").is_some());
        assert!(progress_pair("audio.wav: No such file or directory").is_none());
        assert!(progress_pair("Error opening input file x=y z").is_none());
        assert!(progress_pair("").is_none());
    }
}
