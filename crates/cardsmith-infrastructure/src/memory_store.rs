//! In-memory key-value store.
//!
//! Used by tests and by the CLI's `--ephemeral` mode. Counts writes per key
//! so debounce behavior can be asserted.

use async_trait::async_trait;
use cardsmith_core::error::{CardsmithError, Result};
use cardsmith_core::session::KeyValueStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    writes: HashMap<String, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyValueStore {
    inner: Arc<RwLock<Inner>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entries`. Seeding is not counted
    /// as a write.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(Inner {
                values,
                writes: HashMap::new(),
            })),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of `set` calls that reached `key`.
    pub async fn write_count(&self, key: &str) -> usize {
        self.inner.read().await.writes.get(key).copied().unwrap_or(0)
    }

    /// Makes every subsequent `set`/`remove` fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CardsmithError::io("store is read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        inner.values.insert(key.to_string(), value.to_string());
        *inner.writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.inner.write().await.values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_writes_per_key() {
        let store = InMemoryKeyValueStore::with_entries([("a", "seed")]);

        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();
        store.set("b", "x").await.unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.write_count("a").await, 2);
        assert_eq!(store.write_count("b").await, 1);
        assert_eq!(store.write_count("c").await, 0);
    }

    #[tokio::test]
    async fn test_failing_writes_leave_values_untouched() {
        let store = InMemoryKeyValueStore::with_entries([("a", "keep")]);
        store.set_fail_writes(true);

        assert!(store.set("a", "lost").await.is_err());
        assert!(store.remove("a").await.is_err());
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("keep"));
    }
}
