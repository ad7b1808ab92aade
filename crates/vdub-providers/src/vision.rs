//! Frame-by-frame analysis with an OpenAI-compatible vision model.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};
use vdub_media::{sample_frames, SampledFrame};
use vdub_models::{Script, ScriptSegment};

use crate::credentials::Credentials;
use crate::error::{ProviderError, ProviderResult};
use crate::reporter::{scaled_percent, ProgressReporter};
use crate::traits::VideoAnalyzer;

const FRAME_PROMPT: &str = "Describe what is happening in this video frame concisely, focusing on key \
actions, objects, and the environment. Keep it to one or two sentences. This will be part of a video script.";

/// Samples frames at a fixed interval and describes each one.
pub struct FrameVisionAnalyzer {
    http: Client,
    api_base: String,
    model: String,
    sample_interval_secs: f64,
    request_timeout: Duration,
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl FrameVisionAnalyzer {
    pub fn new(
        http: Client,
        api_base: impl Into<String>,
        model: impl Into<String>,
        sample_interval_secs: f64,
        request_timeout: Duration,
        credentials: Credentials,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
            sample_interval_secs,
            request_timeout,
            credentials,
        }
    }

    async fn describe_frame(&self, key: &str, frame: &SampledFrame) -> ProviderResult<String> {
        let image = tokio::fs::read(&frame.path).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 150,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": FRAME_PROMPT },
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/jpeg;base64,{}", encoded),
                            "detail": "low"
                        }
                    }
                ]
            }]
        });

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.api_base))
            .bearer_auth(key)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_http_status("Vision model", status.as_u16(), &text));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::execution("Vision model returned an empty description"))
    }
}

#[async_trait]
impl VideoAnalyzer for FrameVisionAnalyzer {
    fn name(&self) -> &'static str {
        "frames"
    }

    async fn analyze(
        &self,
        video: &Path,
        workdir: &Path,
        progress: &ProgressReporter,
    ) -> ProviderResult<Script> {
        let key = self.credentials.openai_api_key().await?;

        progress.progress(5, "Extracting frames...");
        let frames = sample_frames(video, workdir, self.sample_interval_secs).await?;
        if frames.is_empty() {
            return Err(ProviderError::execution("No frames could be extracted from the video"));
        }

        let total = frames.len() as u64;
        let mut segments = Vec::with_capacity(frames.len());

        for (i, frame) in frames.iter().enumerate() {
            let label = ScriptSegment::label_for_seconds(frame.timestamp_secs);
            progress.progress(
                scaled_percent(i as u64, total, 10, 95),
                format!("Analyzing frame {} of {} ({})...", i + 1, total, label),
            );

            let described = self.describe_frame(&key, frame).await;
            remove_frame(&frame.path).await;

            match described {
                Ok(description) => segments.push(ScriptSegment::new(label, description)),
                // Rejected credentials fail every frame the same way
                Err(e) if e.is_config() => return Err(e),
                Err(e) => {
                    warn!(frame = %label, "Frame analysis failed: {}", e);
                    segments.push(ScriptSegment::new(
                        label,
                        format!("Visual analysis failed for this moment. ({})", e),
                    ));
                }
            }
        }

        debug!(segments = segments.len(), "Frame analysis complete");
        Ok(Script::new(segments))
    }
}

async fn remove_frame(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove frame {}: {}", path.display(), e);
        }
    }
}
