//! Error types for the Cardsmith engine.

use thiserror::Error;

/// A shared error type for the whole engine.
///
/// Every failure the generation and persistence boundaries can observe maps
/// onto one of these variants, so callers can decide how to surface it
/// (warning, retry hint, silent skip) without string matching.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CardsmithError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Nothing to generate from.
    #[error("No content to generate cards from")]
    EmptyContent,

    /// A generation job is already preparing or streaming.
    #[error("A generation job is already running (request {request_id})")]
    GenerationInProgress { request_id: String },

    /// The service reported that the text cannot support the requested card count.
    #[error("Not enough content for the requested cards: {message}")]
    ContentScarcity {
        message: String,
        recommended_max: Option<u32>,
    },

    /// Network, gateway or timeout failure talking to a remote service.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The job was aborted through its cancellation token.
    #[error("Aborted: {0}")]
    Aborted(String),

    /// The serialized store would exceed its size ceiling.
    #[error("Storage quota exceeded: {size} characters (limit {limit})")]
    QuotaExceeded { size: usize, limit: usize },

    /// The remote service rejected the request.
    #[error("Service error: {0}")]
    Service(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CardsmithError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a Service error
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }

    /// Creates an Aborted error
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an abort (expected outcome of cancellation)
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }

    /// Check if this is a transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if the service reported content scarcity
    pub fn is_content_scarcity(&self) -> bool {
        matches!(self, Self::ContentScarcity { .. })
    }

    /// Check if a write was refused by the size ceiling
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for CardsmithError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for CardsmithError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for CardsmithError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for CardsmithError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from String (for error messages)
impl From<String> for CardsmithError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, CardsmithError>`.
pub type Result<T> = std::result::Result<T, CardsmithError>;
