//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use vdub_pipeline::PipelineError;
use vdub_storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Client input failed validation; the message is shown as-is
    #[error("{0}")]
    Validation(String),

    /// A stage's prerequisite is missing
    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Precondition(_) | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(msg) => ApiError::Validation(msg),
            PipelineError::Precondition(msg) => ApiError::Precondition(msg),
            busy @ PipelineError::Busy(_) => ApiError::Conflict(busy.to_string()),
            PipelineError::Storage(e) => ApiError::Storage(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let internal = status.is_server_error();
        if internal {
            error!("{}", self);
        }

        let production = std::env::var("ENVIRONMENT")
            .map(|e| e.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let detail = if internal && production {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdub_models::Stage;

    #[test]
    fn test_pipeline_errors_map_to_status() {
        let cases = [
            (PipelineError::validation("No script text provided"), StatusCode::BAD_REQUEST),
            (PipelineError::precondition("upload first"), StatusCode::CONFLICT),
            (PipelineError::Busy(Stage::Merge), StatusCode::CONFLICT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_validation_message_is_unprefixed() {
        let err = ApiError::from(PipelineError::validation("No selected video file"));
        assert_eq!(err.to_string(), "No selected video file");
    }
}
