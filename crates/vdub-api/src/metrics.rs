//! Prometheus metrics for the API server.
//!
//! Recorded through the `metrics` facade; [`init_metrics`] installs the
//! exporter whose handle backs `GET /metrics`.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Latency buckets for request handling, in seconds. Stage streams stay open
/// for minutes, so the range runs long.
const DURATION_BUCKETS: &[f64] = &[0.005, 0.025, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0];

pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::HTTP_REQUEST_DURATION_SECONDS.to_string()),
            DURATION_BUCKETS,
        )?
        .install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vdub_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vdub_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vdub_http_requests_in_flight";

    pub const SSE_STREAMS_TOTAL: &str = "vdub_sse_streams_total";
    pub const SSE_EVENTS_SENT: &str = "vdub_sse_events_sent_total";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "vdub_rate_limit_hits_total";
}

pub fn record_sse_stream(stage: &str) {
    counter!(names::SSE_STREAMS_TOTAL, "stage" => stage.to_string()).increment(1);
}

pub fn record_sse_event(stage: &str, status: &str) {
    counter!(
        names::SSE_EVENTS_SENT,
        "stage" => stage.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_rate_limit_hit(path: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "path" => route_label(path)).increment(1);
}

/// Artifact URLs embed upload ids; fold them into one label value.
fn route_label(path: &str) -> String {
    if path.starts_with("/static/uploads/") {
        "/static/uploads/:name".to_string()
    } else {
        path.to_string()
    }
}

/// Holds one slot of the in-flight gauge; released on drop so aborted
/// requests are not counted forever.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);
    }
}

pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().as_str().to_owned();
    let route = route_label(request.uri().path());
    let started = Instant::now();

    let response = {
        let _slot = InFlight::enter();
        next.run(request).await
    };

    let labels = [
        ("method", method),
        ("path", route),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels)
        .record(started.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label_folds_artifacts() {
        assert_eq!(
            route_label("/static/uploads/550e8400-e29b-41d4-a716-446655440000_sample.mp4"),
            "/static/uploads/:name"
        );
        assert_eq!(route_label("/api/analyze_video"), "/api/analyze_video");
    }
}
