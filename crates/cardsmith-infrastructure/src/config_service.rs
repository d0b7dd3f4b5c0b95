//! Configuration service implementation.
//!
//! Loads [`AppConfig`] from `config.toml` in the platform config directory.

use crate::paths::CardsmithPaths;
use crate::storage::AtomicTextFile;
use cardsmith_core::config::AppConfig;
use cardsmith_core::error::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `config.toml` from the resolved config directory.
    pub fn from_paths(paths: &CardsmithPaths) -> Result<Self> {
        Ok(Self::new(paths.config_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the configuration. A missing or empty file yields defaults;
    /// a malformed one is an error.
    pub fn load(&self) -> Result<AppConfig> {
        let file = AtomicTextFile::new(self.path.clone());
        match file.load()? {
            Some(content) if !content.trim().is_empty() => {
                let config: AppConfig = toml::from_str(&content)?;
                tracing::debug!("[ConfigService] Loaded {}", self.path.display());
                Ok(config)
            }
            _ => {
                tracing::debug!(
                    "[ConfigService] No config at {}, using defaults",
                    self.path.display()
                );
                Ok(AppConfig::default())
            }
        }
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        let content = toml::to_string_pretty(config)?;
        AtomicTextFile::new(self.path.clone()).save_locked(&content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let service = ConfigService::new(temp_dir.path().join("config.toml"));

        assert_eq!(service.load().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = CardsmithPaths::new(Some(temp_dir.path().to_path_buf()));
        let service = ConfigService::from_paths(&paths).unwrap();

        let mut config = AppConfig::default();
        config.generation.hard_abort_secs = 5;
        config.persistence.max_sessions = 10;
        service.save(&config).unwrap();

        assert_eq!(service.load().unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[persistence\nmax_sessions = ").unwrap();

        let err = ConfigService::new(path).load().unwrap_err();
        assert!(matches!(
            err,
            cardsmith_core::CardsmithError::Serialization { .. }
        ));
    }
}
