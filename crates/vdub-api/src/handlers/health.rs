//! Liveness and readiness probes.

use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness: the process is up and serving.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub upload_dir: ProbeResult,
    pub ffmpeg: ProbeResult,
}

/// Outcome of one dependency check.
#[derive(Serialize)]
pub struct ProbeResult {
    pub ok: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn probe<E: ToString>(check: impl Future<Output = Result<(), E>>) -> ProbeResult {
    let start = Instant::now();
    let result = check.await;
    ProbeResult {
        ok: result.is_ok(),
        latency_ms: start.elapsed().as_millis() as u64,
        error: result.err().map(|e| e.to_string()),
    }
}

/// Readiness: uploads can be written and FFmpeg is installed.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let upload_dir = probe(state.orchestrator.store().check_writable()).await;
    let ffmpeg = probe(async { vdub_media::check_ffmpeg().map(|_| ()) }).await;

    let ready = upload_dir.ok && ffmpeg.ok;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "degraded" },
            upload_dir,
            ffmpeg,
        }),
    )
}
