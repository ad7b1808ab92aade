//! API middleware.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn, Span};
use uuid::Uuid;

use crate::metrics;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Past this many tracked clients, idle limiters are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

/// Requests per second used when the configured rate is zero.
const FALLBACK_RPS: NonZeroU32 = match NonZeroU32::new(10) {
    Some(rps) => rps,
    None => NonZeroU32::MIN,
};

/// Per-client-IP request limiter.
#[derive(Clone)]
pub struct ClientRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl ClientRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(FALLBACK_RPS);
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_second(rps))),
        }
    }

    /// Whether `ip` may make another request now.
    pub fn check(&self, ip: IpAddr) -> bool {
        if self.limiter.len() > PRUNE_THRESHOLD {
            self.limiter.retain_recent();
            debug!(tracked = self.limiter.len(), "Pruned idle rate limiters");
        }
        self.limiter.check_key(&ip).is_ok()
    }
}

/// Reject clients that exceed their request rate.
pub async fn rate_limit_middleware(
    State(limiter): State<ClientRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    match client_ip(&request) {
        Some(ip) if !limiter.check(ip) => {
            warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limit_hit(request.uri().path());
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, "1")],
                "Rate limit exceeded. Please try again later.",
            )
                .into_response()
        }
        _ => next.run(request).await,
    }
}

/// Client address: leftmost `X-Forwarded-For`, then `X-Real-IP`, then the socket peer.
fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    header_ip(request, "x-forwarded-for", |s| s.split(',').next())
        .or_else(|| header_ip(request, "x-real-ip", |s| Some(s)))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

fn header_ip(
    request: &Request<Body>,
    name: &str,
    pick: impl FnOnce(&str) -> Option<&str>,
) -> Option<IpAddr> {
    let value = request.headers().get(name)?.to_str().ok()?;
    pick(value)?.trim().parse().ok()
}

/// CORS policy.
///
/// `*` allows any origin without credentials. Explicit origins allow
/// credentials so the session cookie travels with cross-origin requests.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().max_age(Duration::from_secs(600));

    if origins.iter().any(|o| o == "*") {
        return layer
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    layer
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, REQUEST_ID_HEADER])
        .expose_headers([header::CONTENT_TYPE, REQUEST_ID_HEADER])
        .allow_credentials(true)
}

const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "same-origin"),
    ("permissions-policy", "camera=(), geolocation=(), microphone=()"),
];

/// Add static security headers to every response.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

/// Propagate the caller's `X-Request-ID`, or assign one.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .and_then(|s| HeaderValue::from_str(s).ok())
        .unwrap_or_else(|| {
            HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        });

    Span::current().record("request_id", id.to_str().unwrap_or_default());
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, id);
    response
}

/// Log each completed request. Probes and artifact downloads log at debug.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    let quiet = matches!(path.as_str(), "/health" | "/ready") || path.starts_with("/static/");

    if quiet {
        debug!(%method, %path, status, duration_ms, "Request completed");
    } else {
        info!(%method, %path, status, duration_ms, "Request completed");
    }

    response
}
