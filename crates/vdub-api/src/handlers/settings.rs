//! Settings API handlers.
//!
//! Credentials applied here live in memory only and are lost on restart.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use vdub_providers::{CredentialStatus, CredentialUpdate};

use crate::error::ApiResult;
use crate::state::AppState;

/// Settings response. Reports which credentials are set, never their values.
#[derive(Serialize)]
pub struct SettingsResponse {
    pub settings: CredentialStatus,
}

/// Get credential status.
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<SettingsResponse>> {
    Ok(Json(SettingsResponse {
        settings: state.credentials.status().await,
    }))
}

/// Settings update response.
#[derive(Serialize)]
pub struct SettingsUpdateResponse {
    pub message: String,
    pub status: String,
}

/// Apply credentials at runtime.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<CredentialUpdate>,
) -> ApiResult<Json<SettingsUpdateResponse>> {
    let touched = state.credentials.apply(update).await;
    info!(fields = ?touched, "Credentials updated at runtime");

    Ok(Json(SettingsUpdateResponse {
        message: settings_message(&touched),
        status: "success".to_string(),
    }))
}

fn settings_message(touched: &[&str]) -> String {
    let mut message = String::from(
        "Settings received and temporarily applied. For permanent storage, set them as environment variables.",
    );
    for field in touched {
        let label = match *field {
            "gemini_api_key" => "Gemini Key",
            "openai_api_key" => "OpenAI Key",
            "youtube_client_id" => "YouTube Client ID",
            "youtube_client_secret" => "YouTube Client Secret",
            "youtube_refresh_token" => "YouTube Refresh Token",
            other => other,
        };
        message.push_str(&format!(" {}: Updated.", label));
    }
    message
}
