//! Cookie-backed client sessions.
//!
//! [`session_cookie`] resolves the caller's session ID from its cookie, or
//! issues a new one, and stores it in the request extensions where the
//! [`ClientSession`] extractor picks it up.

use axum::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::header::SET_COOKIE;
use axum::http::request::Parts;
use axum::http::{HeaderValue, Request, Response};
use axum::middleware::Next;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{debug, warn};

use vdub_models::SessionId;

use crate::error::ApiError;

/// Session cookie settings.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub secure: bool,
}

/// Attach a session ID to every request, issuing a cookie when needed.
pub async fn session_cookie(
    State(settings): State<SessionCookie>,
    mut request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let jar = CookieJar::from_headers(request.headers());
    let existing = jar
        .get(&settings.name)
        .and_then(|cookie| SessionId::parse(cookie.value()).ok());

    let (session_id, issued) = match existing {
        Some(id) => (id, false),
        None => {
            let id = SessionId::new();
            debug!(session_id = %id, "Issued new session");
            (id, true)
        }
    };

    request.extensions_mut().insert(session_id.clone());
    let mut response = next.run(request).await;

    if issued {
        let cookie = Cookie::build((settings.name.clone(), session_id.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(settings.secure)
            .build();
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!("Could not encode session cookie: {}", e),
        }
    }

    response
}

/// Extractor for the caller's session ID.
#[derive(Debug, Clone)]
pub struct ClientSession(pub SessionId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionId>()
            .cloned()
            .map(ClientSession)
            .ok_or_else(|| ApiError::internal("session middleware is not installed"))
    }
}
