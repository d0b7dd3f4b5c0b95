//! Unified path management for Cardsmith files.
//!
//! ```text
//! ~/.config/cardsmith/         # Config directory
//! └── config.toml              # Application configuration
//!
//! ~/.local/share/cardsmith/    # Data directory
//! └── store/                   # Key-value store files
//!     ├── cardsmith.sessions.json
//!     └── cardsmith.active_session.json
//! ```

use cardsmith_core::CardsmithError;
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR_NAME: &str = "cardsmith";

/// Errors that can occur during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    /// Neither the platform config nor data directory could be determined.
    #[error("Cannot find home directory")]
    HomeDirNotFound,
}

impl From<PathError> for CardsmithError {
    fn from(err: PathError) -> Self {
        CardsmithError::config(err.to_string())
    }
}

/// Resolves every path the application reads or writes.
///
/// With a base override (tests, `--data-dir`), config and data both live
/// under that directory instead of the platform locations.
#[derive(Debug, Clone, Default)]
pub struct CardsmithPaths {
    base_override: Option<PathBuf>,
}

impl CardsmithPaths {
    pub fn new(base_override: Option<PathBuf>) -> Self {
        Self { base_override }
    }

    /// Returns the configuration directory (e.g. `~/.config/cardsmith/`).
    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base_override {
            Some(base) => Ok(base.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or(PathError::HomeDirNotFound),
        }
    }

    /// Returns the data directory (e.g. `~/.local/share/cardsmith/`).
    pub fn data_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base_override {
            Some(base) => Ok(base.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .ok_or(PathError::HomeDirNotFound),
        }
    }

    pub fn config_file(&self) -> Result<PathBuf, PathError> {
        Ok(self.config_dir()?.join("config.toml"))
    }

    /// Directory holding one file per store key.
    pub fn store_dir(&self) -> Result<PathBuf, PathError> {
        Ok(self.data_dir()?.join("store"))
    }

    pub fn base_override(&self) -> Option<&Path> {
        self.base_override.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_places_everything_under_base() {
        let paths = CardsmithPaths::new(Some(PathBuf::from("/tmp/cardsmith-test")));

        assert_eq!(
            paths.config_file().unwrap(),
            PathBuf::from("/tmp/cardsmith-test/config.toml")
        );
        assert_eq!(
            paths.store_dir().unwrap(),
            PathBuf::from("/tmp/cardsmith-test/store")
        );
    }

    #[test]
    fn test_store_dir_is_under_data_dir() {
        let paths = CardsmithPaths::default();
        if let (Ok(data_dir), Ok(store_dir)) = (paths.data_dir(), paths.store_dir()) {
            assert!(data_dir.ends_with(APP_DIR_NAME));
            assert!(store_dir.starts_with(&data_dir));
        }
    }
}
