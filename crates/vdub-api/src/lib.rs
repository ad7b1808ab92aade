//! Axum HTTP API server.
//!
//! This crate provides:
//! - Multipart video upload and SSE progress streams for each pipeline stage
//! - Cookie-based client sessions
//! - Runtime credential settings
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use session::ClientSession;
pub use state::AppState;
