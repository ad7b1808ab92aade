//! Runtime credential store.
//!
//! Values start from the environment and may be replaced while the process
//! runs. Nothing is written back to disk.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, Default)]
struct Values {
    gemini_api_key: Option<String>,
    openai_api_key: Option<String>,
    youtube_client_id: Option<String>,
    youtube_client_secret: Option<String>,
    youtube_refresh_token: Option<String>,
}

/// YouTube OAuth client credentials plus a refresh token.
#[derive(Debug, Clone)]
pub struct YouTubeCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Partial update from the settings surface. Absent fields are left alone;
/// an empty string clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialUpdate {
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub youtube_client_id: Option<String>,
    pub youtube_client_secret: Option<String>,
    pub youtube_refresh_token: Option<String>,
}

/// Which credentials are configured. Never carries the values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub gemini_key_set: bool,
    pub openai_key_set: bool,
    pub youtube_client_id_set: bool,
    pub youtube_client_secret_set: bool,
    pub youtube_refresh_token_set: bool,
}

/// Shared, mutable credential store.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    inner: Arc<RwLock<Values>>,
}

impl Credentials {
    /// Load credentials from environment variables.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self::with_values(Values {
            gemini_api_key: var("GEMINI_API_KEY"),
            openai_api_key: var("OPENAI_API_KEY"),
            youtube_client_id: var("YOUTUBE_CLIENT_ID"),
            youtube_client_secret: var("YOUTUBE_CLIENT_SECRET"),
            youtube_refresh_token: var("YOUTUBE_REFRESH_TOKEN"),
        })
    }

    fn with_values(values: Values) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values)),
        }
    }

    /// Apply a settings update. Returns the names of the fields that were provided.
    pub async fn apply(&self, update: CredentialUpdate) -> Vec<&'static str> {
        let mut values = self.inner.write().await;
        let mut touched = Vec::new();

        let mut set = |slot: &mut Option<String>, value: Option<String>, name: &'static str| {
            if let Some(value) = value {
                let value = value.trim().to_string();
                *slot = (!value.is_empty()).then_some(value);
                touched.push(name);
            }
        };
        set(&mut values.gemini_api_key, update.gemini_api_key, "gemini_api_key");
        set(&mut values.openai_api_key, update.openai_api_key, "openai_api_key");
        set(&mut values.youtube_client_id, update.youtube_client_id, "youtube_client_id");
        set(
            &mut values.youtube_client_secret,
            update.youtube_client_secret,
            "youtube_client_secret",
        );
        set(
            &mut values.youtube_refresh_token,
            update.youtube_refresh_token,
            "youtube_refresh_token",
        );

        info!(fields = ?touched, "Credentials updated at runtime");
        touched
    }

    pub async fn status(&self) -> CredentialStatus {
        let values = self.inner.read().await;
        CredentialStatus {
            gemini_key_set: values.gemini_api_key.is_some(),
            openai_key_set: values.openai_api_key.is_some(),
            youtube_client_id_set: values.youtube_client_id.is_some(),
            youtube_client_secret_set: values.youtube_client_secret.is_some(),
            youtube_refresh_token_set: values.youtube_refresh_token.is_some(),
        }
    }

    pub async fn gemini_api_key(&self) -> ProviderResult<String> {
        self.inner
            .read()
            .await
            .gemini_api_key
            .clone()
            .ok_or_else(|| ProviderError::config("Gemini API key is not configured. Please set it in settings."))
    }

    pub async fn openai_api_key(&self) -> ProviderResult<String> {
        self.inner
            .read()
            .await
            .openai_api_key
            .clone()
            .ok_or_else(|| ProviderError::config("OpenAI API key is not configured. Please set it in settings."))
    }

    pub async fn youtube(&self) -> ProviderResult<YouTubeCredentials> {
        let values = self.inner.read().await;
        match (
            &values.youtube_client_id,
            &values.youtube_client_secret,
            &values.youtube_refresh_token,
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(YouTubeCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                refresh_token: refresh_token.clone(),
            }),
            _ => Err(ProviderError::config(
                "YouTube client ID, client secret and refresh token must all be configured",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let creds = Credentials::default();
        let err = creds.gemini_api_key().await.unwrap_err();
        assert!(err.is_config());
        assert!(creds.youtube().await.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_apply_sets_and_clears() {
        let creds = Credentials::default();
        let touched = creds
            .apply(CredentialUpdate {
                gemini_api_key: Some(" g-key ".into()),
                openai_api_key: Some("".into()),
                ..Default::default()
            })
            .await;

        assert_eq!(touched, vec!["gemini_api_key", "openai_api_key"]);
        assert_eq!(creds.gemini_api_key().await.unwrap(), "g-key");
        let status = creds.status().await;
        assert!(status.gemini_key_set);
        assert!(!status.openai_key_set);

        creds
            .apply(CredentialUpdate {
                gemini_api_key: Some(String::new()),
                ..Default::default()
            })
            .await;
        assert!(!creds.status().await.gemini_key_set);
    }

    #[tokio::test]
    async fn test_youtube_requires_all_three() {
        let creds = Credentials::default();
        creds
            .apply(CredentialUpdate {
                youtube_client_id: Some("id".into()),
                youtube_client_secret: Some("secret".into()),
                ..Default::default()
            })
            .await;
        assert!(creds.youtube().await.is_err());

        creds
            .apply(CredentialUpdate {
                youtube_refresh_token: Some("refresh".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(creds.youtube().await.unwrap().refresh_token, "refresh");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let a = Credentials::default();
        let b = a.clone();
        a.apply(CredentialUpdate {
            openai_api_key: Some("sk-1".into()),
            ..Default::default()
        })
        .await;
        assert_eq!(b.openai_api_key().await.unwrap(), "sk-1");
    }
}
