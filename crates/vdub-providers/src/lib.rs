//! Capability providers for the narration pipeline.
//!
//! Each pipeline stage talks to one provider trait. Concrete backends:
//! - [`GeminiVideoAnalyzer`]: File API upload + `generateContent`
//! - [`FrameVisionAnalyzer`]: frame sampling + OpenAI-compatible vision model
//! - [`GeminiSpeechSynthesizer`]: Gemini TTS to WAV
//! - [`FfmpegMuxer`]: local FFmpeg audio track replacement
//! - [`YouTubeUploader`]: resumable YouTube upload

pub mod config;
pub mod credentials;
pub mod error;
pub mod gemini;
pub mod muxer;
pub mod reporter;
pub mod traits;
pub mod vision;
pub mod youtube;

pub use config::{AnalyzerBackend, ProviderConfig, Providers};
pub use credentials::{CredentialStatus, CredentialUpdate, Credentials, YouTubeCredentials};
pub use error::{ProviderError, ProviderResult};
pub use gemini::{GeminiClient, GeminiSpeechSynthesizer, GeminiVideoAnalyzer};
pub use muxer::FfmpegMuxer;
pub use reporter::{scaled_percent, ProgressReporter};
pub use traits::{MediaMuxer, PublishRequest, PublishUploader, SpeechSynthesizer, VideoAnalyzer};
pub use vision::FrameVisionAnalyzer;
pub use youtube::{YouTubeConfig, YouTubeUploader};
