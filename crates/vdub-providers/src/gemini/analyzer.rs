//! Whole-video analysis through the Gemini File API.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};
use vdub_models::{Script, ScriptSegment};

use super::{
    strip_code_fence, video_mime_type, Content, GeminiClient, GenerateContentRequest,
    GenerationConfig, Part, RemoteFile,
};
use crate::error::{ProviderError, ProviderResult};
use crate::reporter::ProgressReporter;
use crate::traits::VideoAnalyzer;

const SCRIPT_PROMPT: &str = r#"Watch this video and write a narration script for it.
Return ONLY a JSON array. Each element must be an object of the form
{"time": "MM:SS", "description": "one or two sentences of narration"}.
Keep the elements in chronological order and describe key actions, objects and the setting."#;

/// Uploads the video, waits until Gemini has processed it, then asks for a script.
pub struct GeminiVideoAnalyzer {
    client: GeminiClient,
    model: String,
    ready_timeout: Duration,
    poll_interval: Duration,
}

impl GeminiVideoAnalyzer {
    pub fn new(
        client: GeminiClient,
        model: impl Into<String>,
        ready_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            ready_timeout,
            poll_interval,
        }
    }

    /// Poll until the file is `ACTIVE`, bounded by the ready timeout.
    async fn wait_until_active(
        &self,
        mut file: RemoteFile,
        progress: &ProgressReporter,
    ) -> ProviderResult<RemoteFile> {
        let started = Instant::now();
        loop {
            if file.is_active() {
                return Ok(file);
            }
            if file.is_failed() {
                return Err(ProviderError::execution(
                    "Gemini could not process the uploaded video",
                ));
            }
            if started.elapsed() >= self.ready_timeout {
                return Err(ProviderError::timeout(format!(
                    "video was not ready for analysis after {} seconds",
                    self.ready_timeout.as_secs()
                )));
            }

            progress.message("Video is still processing...");
            tokio::time::sleep(self.poll_interval).await;
            file = self.client.get_file(&file.name).await?;
        }
    }

    async fn analyze_uploaded(
        &self,
        file: RemoteFile,
        progress: &ProgressReporter,
    ) -> ProviderResult<Script> {
        let file = self.wait_until_active(file, progress).await?;

        progress.progress(60, "Generating script...");
        let mime_type = if file.mime_type.is_empty() {
            "video/mp4".to_string()
        } else {
            file.mime_type.clone()
        };
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::file(mime_type, &file.uri), Part::text(SCRIPT_PROMPT)],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                ..Default::default()
            }),
        };
        let response = self.client.generate_content(&self.model, &request).await?;

        progress.progress(95, "Parsing script...");
        let text = response
            .text()
            .ok_or_else(|| ProviderError::execution("Gemini returned no script text"))?;
        parse_script(&text)
    }
}

#[async_trait]
impl VideoAnalyzer for GeminiVideoAnalyzer {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn analyze(
        &self,
        video: &Path,
        _workdir: &Path,
        progress: &ProgressReporter,
    ) -> ProviderResult<Script> {
        self.client.require_key().await?;

        progress.progress(5, "Uploading video for analysis...");
        let display_name = video
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        let file = self
            .client
            .upload_file(video, video_mime_type(video), &display_name)
            .await?;

        progress.progress(25, "Upload complete. Waiting for the video to be processed...");
        let name = file.name.clone();
        let result = self.analyze_uploaded(file, progress).await;

        // The remote copy is removed whatever the outcome
        match self.client.delete_file(&name).await {
            Ok(()) => info!(file = %name, "Deleted remote video"),
            Err(e) => warn!(file = %name, "Failed to delete remote video: {}", e),
        }

        result
    }
}

/// Accept a JSON list of segments, falling back to one narrative segment.
pub(crate) fn parse_script(text: &str) -> ProviderResult<Script> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(ProviderError::execution("Gemini returned an empty script"));
    }

    if let Ok(segments) = serde_json::from_str::<Vec<ScriptSegment>>(body) {
        let script = Script::new(segments);
        if !script.is_empty() {
            return Ok(script);
        }
        return Err(ProviderError::execution("Gemini returned an empty script"));
    }

    Ok(Script::from_free_text(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialUpdate, Credentials};
    use vdub_models::NARRATIVE_LABEL;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_segment_list() {
        let script = parse_script(
            r#"```json
[{"time":"00:00","description":"A door opens."},{"time":"00:04","description":"Someone enters."}]
```"#,
        )
        .unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(script.segments()[1].time, "00:04");
    }

    #[test]
    fn test_free_text_falls_back_to_narrative() {
        let script = parse_script("A person walks into a room and sits down.").unwrap();
        assert_eq!(script.len(), 1);
        assert_eq!(script.segments()[0].time, NARRATIVE_LABEL);
    }

    #[test]
    fn test_empty_output_is_an_error() {
        assert!(parse_script("   ").is_err());
        assert!(parse_script("[]").is_err());
    }

    async fn analyzer_for(server: &MockServer, timeout: Duration) -> GeminiVideoAnalyzer {
        let credentials = Credentials::default();
        credentials
            .apply(CredentialUpdate {
                gemini_api_key: Some("test-key".into()),
                ..Default::default()
            })
            .await;
        let client = GeminiClient::new(
            reqwest::Client::new(),
            server.uri(),
            Duration::from_secs(5),
            credentials,
        );
        GeminiVideoAnalyzer::new(client, "gemini-test", timeout, Duration::from_millis(10))
    }

    async fn mount_upload(server: &MockServer, state: &str) {
        let upload_url = format!("{}/resumable/upload-1", server.uri());
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", upload_url.as_str()))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/resumable/upload-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "file": {
                    "name": "files/abc",
                    "uri": "https://files.example/abc",
                    "mimeType": "video/mp4",
                    "state": state
                }
            })))
            .mount(server)
            .await;
    }

    fn video_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"fake video").unwrap();
        video
    }

    #[tokio::test]
    async fn test_analysis_deletes_remote_file() {
        let server = MockServer::start().await;
        mount_upload(&server, "PROCESSING").await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "files/abc", "uri": "https://files.example/abc",
                "mimeType": "video/mp4", "state": "ACTIVE"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [
                    {"text": "A person walks into a room and sits down."}
                ]}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1beta/files/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let analyzer = analyzer_for(&server, Duration::from_secs(5)).await;
        let script = analyzer
            .analyze(&video_file(&dir), dir.path(), &ProgressReporter::noop())
            .await
            .unwrap();

        assert_eq!(
            script.segments()[0].description,
            "A person walks into a room and sits down."
        );
    }

    #[tokio::test]
    async fn test_ready_timeout_still_deletes_remote_file() {
        let server = MockServer::start().await;
        mount_upload(&server, "PROCESSING").await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "files/abc", "state": "PROCESSING"
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1beta/files/abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let analyzer = analyzer_for(&server, Duration::from_millis(50)).await;
        let err = analyzer
            .analyze(&video_file(&dir), dir.path(), &ProgressReporter::noop())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_upload() {
        let server = MockServer::start().await;
        let client = GeminiClient::new(
            reqwest::Client::new(),
            server.uri(),
            Duration::from_secs(5),
            Credentials::default(),
        );
        let analyzer = GeminiVideoAnalyzer::new(
            client,
            "gemini-test",
            Duration::from_secs(1),
            Duration::from_millis(10),
        );

        let dir = tempfile::TempDir::new().unwrap();
        let err = analyzer
            .analyze(&video_file(&dir), dir.path(), &ProgressReporter::noop())
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
