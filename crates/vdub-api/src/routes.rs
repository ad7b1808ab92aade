//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::handlers::{
    analyze_video, cleanup, generate_speech, get_session, get_settings, health, merge_video_audio,
    ready, reset_session, update_settings, upload_to_youtube, upload_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    ClientRateLimiter,
};
use crate::session::{session_cookie, SessionCookie};
use crate::state::{AppState, UPLOADS_ROUTE};

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let pipeline_routes = Router::new()
        .route("/upload_video", post(upload_video))
        .route("/analyze_video", post(analyze_video))
        .route("/generate_speech", post(generate_speech))
        .route("/merge_video_audio", post(merge_video_audio))
        .route("/upload_to_youtube", post(upload_to_youtube))
        .route("/cleanup", post(cleanup))
        .route("/session", get(get_session))
        .route("/session/reset", post(reset_session));

    let settings_routes = Router::new()
        .route("/settings", get(get_settings))
        .route("/settings", post(update_settings));

    let rate_limiter = ClientRateLimiter::new(state.config.rate_limit_rps);
    let cookie = SessionCookie {
        name: state.config.session_cookie.clone(),
        secure: state.config.is_production(),
    };

    let api_routes = Router::new()
        .merge(pipeline_routes)
        .merge(settings_routes)
        .layer(middleware::from_fn_with_state(cookie, session_cookie))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let artifacts = ServeDir::new(state.orchestrator.store().root());

    Router::new()
        .nest("/api", api_routes)
        .nest_service(UPLOADS_ROUTE, artifacts)
        .merge(health_routes)
        .merge(metrics_routes)
        // Multipart uploads are bounded by the body limit below, not axum's 2MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
