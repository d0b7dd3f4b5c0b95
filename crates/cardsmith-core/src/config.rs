//! Application configuration model.
//!
//! Every field has a serde default, so a partial (or empty) `config.toml`
//! is always valid.

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::resolver::DEFAULT_HIGHLIGHT_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub persistence: PersistenceConfig,
    pub generation: GenerationConfig,
    pub history: HistoryConfig,
    pub service: ServiceConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Quiet period before a scheduled save is written.
    pub debounce_ms: u64,
    /// How long the `saved` status stays visible before returning to idle.
    pub saved_status_ms: u64,
    pub max_sessions: usize,
    /// Ceiling on the serialized session list, in characters.
    pub max_serialized_chars: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 350,
            saved_status_ms: 2_500,
            max_sessions: 30,
            max_serialized_chars: 4_000_000,
        }
    }
}

impl PersistenceConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn saved_status(&self) -> Duration {
        Duration::from_millis(self.saved_status_ms)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Grace period between the cooperative cancel and the forced abort.
    pub hard_abort_secs: u64,
    pub highlight_separator: String,
    pub default_model: Option<String>,
    pub default_deck: String,
    /// Maximum retained progress log lines per request.
    pub log_capacity: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            hard_abort_secs: 20,
            highlight_separator: DEFAULT_HIGHLIGHT_SEPARATOR.to_string(),
            default_model: None,
            default_deck: crate::card::DEFAULT_DECK.to_string(),
            log_capacity: 200,
        }
    }
}

impl GenerationConfig {
    pub fn hard_abort(&self) -> Duration {
        Duration::from_secs(self.hard_abort_secs)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Run document analysis before generating when no context exists.
    pub analysis_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_string(),
            request_timeout_secs: 300,
            analysis_enabled: true,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.persistence.debounce(), Duration::from_millis(350));
        assert_eq!(config.generation.hard_abort(), Duration::from_secs(20));
        assert_eq!(config.history.capacity, 50);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [persistence]
            max_sessions = 5

            [service]
            base_url = "http://cards.local"
            "#,
        )
        .unwrap();

        assert_eq!(config.persistence.max_sessions, 5);
        assert_eq!(config.persistence.max_serialized_chars, 4_000_000);
        assert_eq!(config.service.base_url, "http://cards.local");
        assert!(config.service.analysis_enabled);
    }
}
