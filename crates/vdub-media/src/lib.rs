//! FFmpeg CLI wrapper for the narration pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Stderr capture so transcoder faults reach the caller
//! - Audio track replacement and frame sampling

pub mod command;
pub mod error;
pub mod frames;
pub mod mux;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{sample_frames, SampledFrame};
pub use mux::{replace_audio_track, MuxOptions};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
