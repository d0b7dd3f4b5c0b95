//! Durable local store boundary.
//!
//! The engine never queries the store partially: it reads, writes and
//! removes whole serialized blobs under a small set of well-known keys.

use crate::error::Result;
use async_trait::async_trait;

/// Key holding the serialized session list (JSON array).
pub const SESSIONS_KEY: &str = "cardsmith.sessions";

/// Key holding the id of the active session (plain string).
pub const ACTIVE_SESSION_KEY: &str = "cardsmith.active_session";

/// An abstract key-value store for whole serialized values.
///
/// Implementations decide where the bytes live (files, memory, browser
/// storage); the engine only relies on get/set/remove being atomic per key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: Value found
    /// - `Ok(None)`: Nothing stored under this key
    /// - `Err(_)`: Error occurred during retrieval
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replaces the value stored under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
