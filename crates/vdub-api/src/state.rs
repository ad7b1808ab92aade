//! Application state.

use vdub_pipeline::{OrchestratorConfig, PipelineOrchestrator, SessionStore};
use vdub_providers::{Credentials, ProviderConfig, Providers};
use vdub_storage::{ArtifactStore, StoreConfig};

use crate::config::ApiConfig;

/// URL prefix artifacts are served under.
pub const UPLOADS_ROUTE: &str = "/static/uploads";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: PipelineOrchestrator,
    pub credentials: Credentials,
}

impl AppState {
    /// Create new application state from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store = ArtifactStore::open(StoreConfig {
            root: config.upload_dir.clone(),
            public_prefix: UPLOADS_ROUTE.to_string(),
        })
        .await?;

        let credentials = Credentials::from_env();
        let providers = Providers::from_config(&ProviderConfig::from_env()?, credentials.clone())?;
        let orchestrator = PipelineOrchestrator::new(store, SessionStore::new(), providers)
            .with_config(OrchestratorConfig::from_env());

        Ok(Self::from_parts(config, orchestrator, credentials))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        config: ApiConfig,
        orchestrator: PipelineOrchestrator,
        credentials: Credentials,
    ) -> Self {
        Self {
            config,
            orchestrator,
            credentials,
        }
    }
}
