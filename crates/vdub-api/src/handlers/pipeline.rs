//! Pipeline stage handlers.
//!
//! Upload and teardown answer with JSON. The four stages answer with a
//! server-sent event stream of wire progress events ending in exactly one
//! `complete` or `error` event.

use axum::extract::{Multipart, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use vdub_models::{ArtifactRef, PipelineState, Session, Stage, WireEvent};
use vdub_pipeline::ProgressStream;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::session::ClientSession;
use crate::state::AppState;

/// Multipart field carrying the video.
const VIDEO_FIELD: &str = "video";

/// Upload response.
#[derive(Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub video_url: String,
    pub artifact: ArtifactRef,
}

/// Store an uploaded video as the session's source.
pub async fn upload_video(
    State(state): State<AppState>,
    ClientSession(session_id): ClientSession,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let artifact = state
            .orchestrator
            .upload_video(&session_id, &filename, Box::pin(field))
            .await?;

        return Ok(Json(UploadResponse {
            message: "Video uploaded successfully!".to_string(),
            video_url: artifact.url.clone(),
            artifact,
        }));
    }

    Err(ApiError::validation("No video file part"))
}

/// Stream analysis of the session's video.
pub async fn analyze_video(
    State(state): State<AppState>,
    ClientSession(session_id): ClientSession,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let stream = state.orchestrator.analyze_video(&session_id).await?;
    Ok(progress_sse(Stage::Analyze, stream))
}

/// Speech synthesis request.
#[derive(Debug, Deserialize)]
pub struct GenerateSpeechRequest {
    #[serde(default)]
    pub script_text: Option<String>,
}

/// Stream narration synthesis.
pub async fn generate_speech(
    State(state): State<AppState>,
    ClientSession(session_id): ClientSession,
    Json(request): Json<GenerateSpeechRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let text = request.script_text.unwrap_or_default();
    let stream = state
        .orchestrator
        .synthesize_speech(&session_id, &text)
        .await?;
    Ok(progress_sse(Stage::Synthesize, stream))
}

/// Stream the audio/video merge.
pub async fn merge_video_audio(
    State(state): State<AppState>,
    ClientSession(session_id): ClientSession,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let stream = state.orchestrator.merge_video_audio(&session_id).await?;
    Ok(progress_sse(Stage::Merge, stream))
}

/// Publish request. Both fields are optional.
#[derive(Debug, Default, Deserialize)]
pub struct PublishVideoRequest {
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde(default)]
    pub video_description: Option<String>,
}

/// Stream the upload of the merged video.
pub async fn upload_to_youtube(
    State(state): State<AppState>,
    ClientSession(session_id): ClientSession,
    request: Option<Json<PublishVideoRequest>>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let Json(request) = request.unwrap_or_default();
    let stream = state
        .orchestrator
        .publish(
            &session_id,
            request.video_title.as_deref(),
            request.video_description.as_deref(),
        )
        .await?;
    Ok(progress_sse(Stage::Publish, stream))
}

/// Teardown response.
#[derive(Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub removed: usize,
}

/// Delete every artifact of the session.
pub async fn cleanup(
    State(state): State<AppState>,
    ClientSession(session_id): ClientSession,
) -> Json<CleanupResponse> {
    let removed = state.orchestrator.teardown(&session_id).await;
    Json(CleanupResponse {
        message: format!("Cleaned up {} temporary files.", removed),
        removed,
    })
}

/// Fresh page load. Same as cleanup.
pub async fn reset_session(
    state: State<AppState>,
    session: ClientSession,
) -> Json<CleanupResponse> {
    cleanup(state, session).await
}

/// Session status response.
#[derive(Serialize)]
pub struct SessionResponse {
    pub state: PipelineState,
    #[serde(flatten)]
    pub session: Session,
}

/// Current session record.
pub async fn get_session(
    State(state): State<AppState>,
    ClientSession(session_id): ClientSession,
) -> Json<SessionResponse> {
    let session = state.orchestrator.status(&session_id).await;
    Json(SessionResponse {
        state: session.state(),
        session,
    })
}

/// Encode a stage's progress as server-sent events.
fn progress_sse(
    stage: Stage,
    stream: ProgressStream,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    metrics::record_sse_stream(stage.as_str());

    let events = stream.map(move |event| {
        metrics::record_sse_event(stage.as_str(), event.status().as_str());
        Event::default().json_data(WireEvent::from(event))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
