//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vdub_api::{create_router, ApiConfig, AppState};
use vdub_models::{PublishedVideo, Script, ScriptSegment, NARRATIVE_LABEL};
use vdub_pipeline::{PipelineOrchestrator, SessionStore};
use vdub_providers::{
    Credentials, MediaMuxer, ProgressReporter, ProviderError, ProviderResult, Providers,
    PublishRequest, PublishUploader, SpeechSynthesizer, VideoAnalyzer,
};
use vdub_storage::{ArtifactStore, StoreConfig};

const BOUNDARY: &str = "vdub-test-boundary";

struct StubAnalyzer;

#[async_trait]
impl VideoAnalyzer for StubAnalyzer {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn analyze(
        &self,
        _video: &Path,
        _workdir: &Path,
        progress: &ProgressReporter,
    ) -> ProviderResult<Script> {
        progress.progress(60, "Generating script...");
        Ok(Script::new(vec![ScriptSegment::new(
            NARRATIVE_LABEL,
            "A person walks into a room and sits down.",
        )]))
    }
}

struct StubSynthesizer;

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn output_extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(
        &self,
        _text: &str,
        _output: &Path,
        _progress: &ProgressReporter,
    ) -> ProviderResult<()> {
        Err(ProviderError::from_http_status("Gemini TTS", 429, "quota"))
    }
}

struct StubMuxer;

#[async_trait]
impl MediaMuxer for StubMuxer {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn merge(
        &self,
        _video: &Path,
        _audio: &Path,
        _output: &Path,
        _progress: &ProgressReporter,
    ) -> ProviderResult<()> {
        Err(ProviderError::execution("not used"))
    }
}

struct StubUploader;

#[async_trait]
impl PublishUploader for StubUploader {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn publish(
        &self,
        _video: &Path,
        _request: &PublishRequest,
        _progress: &ProgressReporter,
    ) -> ProviderResult<PublishedVideo> {
        Err(ProviderError::execution("not used"))
    }
}

async fn test_app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let config = ApiConfig {
        upload_dir: dir.path().join("uploads"),
        ..Default::default()
    };

    let store = ArtifactStore::open(StoreConfig {
        root: config.upload_dir.clone(),
        public_prefix: "/static/uploads".to_string(),
    })
    .await
    .unwrap();
    let providers = Providers {
        analyzer: Arc::new(StubAnalyzer),
        synthesizer: Arc::new(StubSynthesizer),
        muxer: Arc::new(StubMuxer),
        uploader: Arc::new(StubUploader),
    };
    let orchestrator = PipelineOrchestrator::new(store, SessionStore::new(), providers);
    let state = AppState::from_parts(config, orchestrator, Credentials::default());

    (dir, create_router(state, None))
}

fn session_cookie(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie issued")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn upload_request(cookie: Option<&str>, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{f}\"\r\nContent-Type: video/mp4\r\n\r\n",
        b = BOUNDARY,
        f = filename
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/upload_video")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn post_json(uri: &str, cookie: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

/// Parse the `data:` lines of an SSE body.
fn sse_events(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let (_dir, app) = test_app().await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_new_client_gets_empty_session() {
    let (_dir, app) = test_app().await;

    let response = app
        .oneshot(Request::get("/api/session").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).starts_with("vdub_session="));
    assert_eq!(json_body(response).await["state"], "empty");
}

#[tokio::test]
async fn test_stage_without_upload_is_conflict() {
    let (_dir, app) = test_app().await;

    let first = app
        .clone()
        .oneshot(Request::get("/api/session").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let cookie = session_cookie(&first);

    let response = app
        .oneshot(post_json(
            "/api/generate_speech",
            &cookie,
            serde_json::json!({ "script_text": "hello" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        json_body(response).await["detail"],
        "Original video not found. Please upload again."
    );
}

#[tokio::test]
async fn test_missing_script_text_is_bad_request() {
    let (_dir, app) = test_app().await;

    let first = app
        .clone()
        .oneshot(Request::get("/api/session").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let cookie = session_cookie(&first);

    let response = app
        .oneshot(post_json("/api/generate_speech", &cookie, serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["detail"], "No script text provided");
}

#[tokio::test]
async fn test_upload_analyze_and_cleanup() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(upload_request(None, "my clip.mp4", b"fake video bytes"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let body = json_body(response).await;
    let video_url = body["video_url"].as_str().unwrap().to_string();
    assert!(video_url.starts_with("/static/uploads/"));
    assert!(video_url.ends_with("_my_clip.mp4"));

    let served = app
        .clone()
        .oneshot(Request::get(video_url.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(served.status(), StatusCode::OK);
    assert_eq!(text_body(served).await, "fake video bytes");

    let response = app
        .clone()
        .oneshot(post_empty("/api/analyze_video", &cookie))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events = sse_events(&text_body(response).await);
    let last = events.last().unwrap();
    assert_eq!(last["status"], "complete");
    assert_eq!(last["result"]["script"][0]["time"], "Narrative");
    assert!(events[..events.len() - 1]
        .iter()
        .all(|e| e["status"] == "in_progress"));

    let response = app
        .clone()
        .oneshot(post_empty("/api/cleanup", &cookie))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["removed"], 1);
    assert_eq!(body["message"], "Cleaned up 1 temporary files.");

    let response = app
        .oneshot(post_empty("/api/session/reset", &cookie))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["removed"], 0);
}

#[tokio::test]
async fn test_provider_failure_is_terminal_error_event() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(upload_request(None, "sample.mp4", b"video"))
        .await
        .unwrap();
    let cookie = session_cookie(&response);

    let response = app
        .clone()
        .oneshot(post_empty("/api/analyze_video", &cookie))
        .await
        .unwrap();
    text_body(response).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/generate_speech",
            &cookie,
            serde_json::json!({ "script_text": "Narration." }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = sse_events(&text_body(response).await);
    let last = events.last().unwrap();
    assert_eq!(last["status"], "error");
    assert!(last["message"].as_str().unwrap().contains("rate limit"));

    let session = app
        .oneshot(
            Request::get("/api/session")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let session = json_body(session).await;
    assert_eq!(session["state"], "script_ready");
    assert!(session["narration_audio"].is_null());
}

#[tokio::test]
async fn test_upload_without_file_part_is_rejected() {
    let (_dir, app) = test_app().await;

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/upload_video")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["detail"], "No video file part");
}

#[tokio::test]
async fn test_settings_never_echo_values() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/api/settings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let cookie = session_cookie(&response);
    assert_eq!(json_body(response).await["settings"]["gemini_key_set"], false);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/settings",
            &cookie,
            serde_json::json!({ "gemini_api_key": "secret-key" }),
        ))
        .await
        .unwrap();
    let text = text_body(response).await;
    assert!(!text.contains("secret-key"));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["status"], "success");

    let response = app
        .oneshot(Request::get("/api/settings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(json_body(response).await["settings"]["gemini_key_set"], true);
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let (_dir, app) = test_app().await;

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
