//! Provider error types.

use thiserror::Error;

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised by capability providers.
///
/// `Config` means a credential or capability is missing. Everything else is
/// an execution failure of the external system.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Execution(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("{service} rate limit exceeded: {detail}")]
    RateLimited { service: String, detail: String },

    #[error("{}", .0.detail())]
    Media(#[from] vdub_media::MediaError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Map a non-success HTTP response to an error.
    pub fn from_http_status(service: &str, status: u16, body: &str) -> Self {
        let detail = truncate(body.trim(), 500);
        match status {
            429 => Self::RateLimited {
                service: service.to_string(),
                detail,
            },
            401 | 403 => Self::Config(format!("{} rejected credentials ({}): {}", service, status, detail)),
            _ => Self::Execution(format!("{} returned {}: {}", service, status, detail)),
        }
    }

    /// Whether the failure is a missing or rejected credential.
    pub fn is_config(&self) -> bool {
        matches!(self, ProviderError::Config(_))
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
