//! Provider configuration and backend selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;
use vdub_media::MuxOptions;

use crate::credentials::Credentials;
use crate::error::{ProviderError, ProviderResult};
use crate::gemini::{GeminiClient, GeminiSpeechSynthesizer, GeminiVideoAnalyzer};
use crate::muxer::FfmpegMuxer;
use crate::traits::{MediaMuxer, PublishUploader, SpeechSynthesizer, VideoAnalyzer};
use crate::vision::FrameVisionAnalyzer;
use crate::youtube::{YouTubeConfig, YouTubeUploader};

/// Which video analyzer implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalyzerBackend {
    /// Upload the whole video to Gemini
    #[default]
    Gemini,
    /// Sample frames and describe each with a vision model
    Frames,
}

impl AnalyzerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerBackend::Gemini => "gemini",
            AnalyzerBackend::Frames => "frames",
        }
    }
}

impl fmt::Display for AnalyzerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnalyzerBackend {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(AnalyzerBackend::Gemini),
            "frames" | "openai" | "vision" => Ok(AnalyzerBackend::Frames),
            other => Err(ProviderError::config(format!(
                "unknown ANALYZER_BACKEND '{}', expected 'gemini' or 'frames'",
                other
            ))),
        }
    }
}

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub analyzer_backend: AnalyzerBackend,
    pub gemini_api_base: String,
    pub gemini_model: String,
    pub gemini_tts_model: String,
    pub gemini_tts_voice: String,
    pub openai_api_base: String,
    pub vision_model: String,
    pub frame_sample_secs: f64,
    pub analysis_ready_timeout: Duration,
    pub analysis_poll_interval: Duration,
    pub youtube_api_base: String,
    pub youtube_oauth_url: String,
    pub youtube_privacy: String,
    pub youtube_category_id: String,
    pub youtube_chunk_size: usize,
    pub ffmpeg_timeout_secs: Option<u64>,
    pub http_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            analyzer_backend: AnalyzerBackend::Gemini,
            gemini_api_base: "https://generativelanguage.googleapis.com".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            gemini_tts_voice: "Kore".to_string(),
            openai_api_base: "https://api.openai.com".to_string(),
            vision_model: "gpt-4o".to_string(),
            frame_sample_secs: 2.0,
            analysis_ready_timeout: Duration::from_secs(300),
            analysis_poll_interval: Duration::from_secs(2),
            youtube_api_base: "https://www.googleapis.com".to_string(),
            youtube_oauth_url: "https://oauth2.googleapis.com/token".to_string(),
            youtube_privacy: "private".to_string(),
            youtube_category_id: "22".to_string(),
            youtube_chunk_size: 8 * 1024 * 1024,
            ffmpeg_timeout_secs: Some(3600),
            http_timeout: Duration::from_secs(120),
        }
    }
}

impl ProviderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        let defaults = Self::default();
        let string = |name: &str, default: String| std::env::var(name).unwrap_or(default);
        let parsed = |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok());

        let analyzer_backend = match std::env::var("ANALYZER_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.analyzer_backend,
        };

        Ok(Self {
            analyzer_backend,
            gemini_api_base: string("GEMINI_API_BASE", defaults.gemini_api_base),
            gemini_model: string("GEMINI_MODEL", defaults.gemini_model),
            gemini_tts_model: string("GEMINI_TTS_MODEL", defaults.gemini_tts_model),
            gemini_tts_voice: string("GEMINI_TTS_VOICE", defaults.gemini_tts_voice),
            openai_api_base: string("OPENAI_API_BASE", defaults.openai_api_base),
            vision_model: string("VISION_MODEL", defaults.vision_model),
            frame_sample_secs: std::env::var("FRAME_SAMPLE_SECS")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| *v > 0.0)
                .unwrap_or(defaults.frame_sample_secs),
            analysis_ready_timeout: parsed("ANALYSIS_READY_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.analysis_ready_timeout),
            analysis_poll_interval: defaults.analysis_poll_interval,
            youtube_api_base: string("YOUTUBE_API_BASE", defaults.youtube_api_base),
            youtube_oauth_url: string("YOUTUBE_OAUTH_URL", defaults.youtube_oauth_url),
            youtube_privacy: string("YOUTUBE_PRIVACY", defaults.youtube_privacy),
            youtube_category_id: string("YOUTUBE_CATEGORY_ID", defaults.youtube_category_id),
            youtube_chunk_size: parsed("YOUTUBE_CHUNK_SIZE")
                .map(|v| v as usize)
                .unwrap_or(defaults.youtube_chunk_size),
            ffmpeg_timeout_secs: parsed("FFMPEG_TIMEOUT_SECS").or(defaults.ffmpeg_timeout_secs),
            http_timeout: parsed("PROVIDER_HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        })
    }
}

/// The four capability providers selected for this process.
#[derive(Clone)]
pub struct Providers {
    pub analyzer: Arc<dyn VideoAnalyzer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub muxer: Arc<dyn MediaMuxer>,
    pub uploader: Arc<dyn PublishUploader>,
}

impl Providers {
    /// Build the configured backends. Credentials are shared, so runtime
    /// settings changes reach every provider.
    pub fn from_config(config: &ProviderConfig, credentials: Credentials) -> ProviderResult<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("vdub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::config(format!("failed to build HTTP client: {}", e)))?;

        let gemini = GeminiClient::new(
            http.clone(),
            config.gemini_api_base.clone(),
            config.http_timeout,
            credentials.clone(),
        );

        let analyzer: Arc<dyn VideoAnalyzer> = match config.analyzer_backend {
            AnalyzerBackend::Gemini => Arc::new(GeminiVideoAnalyzer::new(
                gemini.clone(),
                config.gemini_model.clone(),
                config.analysis_ready_timeout,
                config.analysis_poll_interval,
            )),
            AnalyzerBackend::Frames => Arc::new(FrameVisionAnalyzer::new(
                http.clone(),
                config.openai_api_base.clone(),
                config.vision_model.clone(),
                config.frame_sample_secs,
                config.http_timeout,
                credentials.clone(),
            )),
        };

        let synthesizer = Arc::new(GeminiSpeechSynthesizer::new(
            gemini,
            config.gemini_tts_model.clone(),
            config.gemini_tts_voice.clone(),
        ));

        let muxer = Arc::new(FfmpegMuxer::new(MuxOptions {
            timeout_secs: config.ffmpeg_timeout_secs,
        }));

        let uploader = Arc::new(YouTubeUploader::new(
            http,
            YouTubeConfig {
                api_base: config.youtube_api_base.clone(),
                oauth_token_url: config.youtube_oauth_url.clone(),
                privacy_status: config.youtube_privacy.clone(),
                category_id: config.youtube_category_id.clone(),
                chunk_size: config.youtube_chunk_size,
                request_timeout: config.http_timeout,
            },
            credentials,
        ));

        info!(
            analyzer = analyzer.name(),
            synthesizer = synthesizer.name(),
            muxer = muxer.name(),
            uploader = uploader.name(),
            "Capability providers configured"
        );

        Ok(Self {
            analyzer,
            synthesizer,
            muxer,
            uploader,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyzer_backend_parse() {
        assert_eq!("gemini".parse::<AnalyzerBackend>().unwrap(), AnalyzerBackend::Gemini);
        assert_eq!(" Frames ".parse::<AnalyzerBackend>().unwrap(), AnalyzerBackend::Frames);
        assert!("whisper".parse::<AnalyzerBackend>().unwrap_err().is_config());
    }

    #[test]
    fn test_selection_follows_config() {
        let config = ProviderConfig {
            analyzer_backend: AnalyzerBackend::Frames,
            ..Default::default()
        };
        let providers = Providers::from_config(&config, Credentials::default()).unwrap();
        assert_eq!(providers.analyzer.name(), "frames");
        assert_eq!(providers.synthesizer.output_extension(), "wav");
        assert_eq!(providers.uploader.name(), "youtube");
    }
}
