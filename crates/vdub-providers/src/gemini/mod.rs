//! Gemini REST client shared by the Gemini-backed providers.
//!
//! Covers `generateContent` and the File API (resumable upload, status
//! lookup, delete). Requests authenticate with the `x-goog-api-key` header.

mod analyzer;
mod tts;

pub use analyzer::GeminiVideoAnalyzer;
pub use tts::GeminiSpeechSynthesizer;

use std::path::Path;
use std::time::Duration;

use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::Credentials;
use crate::error::{ProviderError, ProviderResult};

const SERVICE: &str = "Gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Thin Gemini API client. Reads the API key per call so runtime settings apply.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_base: String,
    request_timeout: Duration,
    credentials: Credentials,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn file(mime_type: impl Into<String>, file_uri: impl Into<String>) -> Self {
        Self {
            file_data: Some(FileData {
                mime_type: mime_type.into(),
                file_uri: file_uri.into(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64-encoded payload
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    /// Concatenated text of the first candidate.
    pub fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        (!text.trim().is_empty()).then_some(text)
    }

    /// First inline binary payload of the first candidate.
    pub fn inline_data(&self) -> Option<&InlineData> {
        self.parts().find_map(|p| p.inline_data.as_ref())
    }
}

/// File API resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, e.g. `files/abc123`
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl RemoteFile {
    pub fn is_active(&self) -> bool {
        self.state.as_deref() == Some("ACTIVE")
    }

    pub fn is_failed(&self) -> bool {
        self.state.as_deref() == Some("FAILED")
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

// =============================================================================
// Client
// =============================================================================

impl GeminiClient {
    pub fn new(
        http: Client,
        api_base: impl Into<String>,
        request_timeout: Duration,
        credentials: Credentials,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            request_timeout,
            credentials,
        }
    }

    /// Fail early with a config error when no key is set.
    pub async fn require_key(&self) -> ProviderResult<String> {
        self.credentials.gemini_api_key().await
    }

    /// Call `models/{model}:generateContent`.
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> ProviderResult<GenerateContentResponse> {
        let key = self.require_key().await?;
        let url = format!("{}/v1beta/models/{}:generateContent", self.api_base, model);
        debug!(model, "Gemini generateContent");

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, key)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    /// Upload a local file through the resumable File API protocol.
    pub async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> ProviderResult<RemoteFile> {
        let key = self.require_key().await?;
        let size = tokio::fs::metadata(path).await?.len();

        let start = self
            .http
            .post(format!("{}/upload/v1beta/files", self.api_base))
            .header(API_KEY_HEADER, &key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .timeout(self.request_timeout)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = check(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::execution("Gemini did not return an upload URL"))?;

        let file = tokio::fs::File::open(path).await?;
        let response = self
            .http
            .post(&upload_url)
            .header(API_KEY_HEADER, &key)
            .header(header::CONTENT_LENGTH, size)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(file)
            .send()
            .await?;

        let uploaded: UploadResponse = check(response).await?.json().await?;
        debug!(name = %uploaded.file.name, size, "Uploaded file to Gemini");
        Ok(uploaded.file)
    }

    /// Fetch the current state of an uploaded file.
    pub async fn get_file(&self, name: &str) -> ProviderResult<RemoteFile> {
        let key = self.require_key().await?;
        let response = self
            .http
            .get(format!("{}/v1beta/{}", self.api_base, name))
            .header(API_KEY_HEADER, key)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Delete an uploaded file.
    pub async fn delete_file(&self, name: &str) -> ProviderResult<()> {
        let key = self.require_key().await?;
        let response = self
            .http
            .delete(format!("{}/v1beta/{}", self.api_base, name))
            .header(API_KEY_HEADER, key)
            .timeout(self.request_timeout)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_http_status(SERVICE, status.as_u16(), &body))
}

/// Strip a Markdown code fence the model may wrap JSON in.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Guess a video MIME type from the file extension.
pub(crate) fn video_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        _ => "video/mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("```\n[2]\n```"), "[2]");
        assert_eq!(strip_code_fence("  plain  "), "plain");
    }

    #[test]
    fn test_video_mime_type() {
        assert_eq!(video_mime_type(Path::new("a.MOV")), "video/quicktime");
        assert_eq!(video_mime_type(Path::new("a.mp4")), "video/mp4");
        assert_eq!(video_mime_type(Path::new("noext")), "video/mp4");
    }

    #[test]
    fn test_response_text_and_inline_data() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Hello "},
                    {"text": "world"},
                    {"inlineData": {"mimeType": "audio/L16;rate=24000", "data": "AAA="}}
                ]},
                "finishReason": "STOP"
            }]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text().unwrap(), "Hello world");
        assert_eq!(response.inline_data().unwrap().mime_type, "audio/L16;rate=24000");
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: None,
                parts: vec![Part::file("video/mp4", "https://files/abc"), Part::text("Describe")],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".into()),
                ..Default::default()
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["fileData"]["fileUri"], "https://files/abc");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert!(json["generationConfig"].get("speechConfig").is_none());
    }
}
