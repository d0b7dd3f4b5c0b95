//! File-backed key-value store.
//!
//! Each key maps to one file in the store directory. Writes go through
//! [`AtomicTextFile`], so a crash mid-write leaves the previous value intact.

use crate::storage::AtomicTextFile;
use async_trait::async_trait;
use cardsmith_core::error::{CardsmithError, Result};
use cardsmith_core::session::KeyValueStore;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, key: &str) -> AtomicTextFile {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        AtomicTextFile::new(self.root.join(format!("{name}.json")))
    }
}

async fn run_blocking<T, F>(op: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CardsmithError::internal(format!("Failed to join {op} task: {e}")))?
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let file = self.file_for(key);
        run_blocking("get", move || Ok(file.load()?)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let file = self.file_for(key);
        let value = value.to_string();
        tracing::debug!(
            "[FileStore] Writing {} chars to {}",
            value.len(),
            file.path().display()
        );
        run_blocking("set", move || Ok(file.save_locked(&value)?)).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let file = self.file_for(key);
        run_blocking("remove", move || Ok(file.remove()?)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path());

        assert_eq!(store.get("cardsmith.sessions").await.unwrap(), None);

        store.set("cardsmith.sessions", "[]").await.unwrap();
        assert_eq!(
            store.get("cardsmith.sessions").await.unwrap().as_deref(),
            Some("[]")
        );
        assert!(temp_dir.path().join("cardsmith.sessions.json").exists());

        store.remove("cardsmith.sessions").await.unwrap();
        assert_eq!(store.get("cardsmith.sessions").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_are_sanitized_into_file_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path());

        store.set("../escape/key", "v").await.unwrap();

        assert!(temp_dir.path().join(".._escape_key.json").exists());
        assert_eq!(store.get("../escape/key").await.unwrap().as_deref(), Some("v"));
    }
}
