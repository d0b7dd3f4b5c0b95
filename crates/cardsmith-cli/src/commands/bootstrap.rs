use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cardsmith_application::CardsmithEngine;
use cardsmith_core::config::AppConfig;
use cardsmith_core::generation::{AnalysisService, GenerationService};
use cardsmith_core::session::KeyValueStore;
use cardsmith_infrastructure::{
    CardsmithPaths, ConfigService, FileKeyValueStore, InMemoryKeyValueStore,
};
use cardsmith_interaction::HttpGenerationClient;

/// Global flags that decide where state lives.
#[derive(Debug, Clone, Default)]
pub struct BootstrapOptions {
    pub data_dir: Option<PathBuf>,
    pub ephemeral: bool,
}

impl BootstrapOptions {
    pub fn paths(&self) -> CardsmithPaths {
        CardsmithPaths::new(self.data_dir.clone())
    }

    pub fn config_service(&self) -> Result<ConfigService> {
        ConfigService::from_paths(&self.paths()).context("Failed to resolve the config location")
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        let service = self.config_service()?;
        service
            .load()
            .with_context(|| format!("Failed to load {}", service.path().display()))
    }

    fn open_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        if self.ephemeral {
            tracing::info!("[Bootstrap] Using in-memory session store");
            return Ok(Arc::new(InMemoryKeyValueStore::new()));
        }
        let dir = self
            .paths()
            .store_dir()
            .context("Failed to resolve the session store directory")?;
        tracing::debug!("[Bootstrap] Session store at {}", dir.display());
        Ok(Arc::new(FileKeyValueStore::new(dir)))
    }
}

pub struct App {
    pub config: AppConfig,
    pub engine: CardsmithEngine,
}

/// Loads config, opens the store and wires the engine.
///
/// The active session is not restored; commands decide which session to
/// work on.
pub fn build(options: &BootstrapOptions, with_analysis: bool) -> Result<App> {
    let config = options.load_config()?;
    let store = options.open_store()?;
    let client = Arc::new(
        HttpGenerationClient::from_config(&config.service)
            .context("Failed to create the generation service client")?,
    );
    tracing::debug!("[Bootstrap] Generation service at {}", client.base_url());

    let service: Arc<dyn GenerationService> = client.clone();
    let analysis: Option<Arc<dyn AnalysisService>> = if with_analysis {
        Some(client)
    } else {
        None
    };
    let engine = CardsmithEngine::new(&config, store, service, analysis);
    Ok(App { config, engine })
}
