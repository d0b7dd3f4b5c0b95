pub mod card;
pub mod config;
pub mod error;
pub mod generation;
pub mod history;
pub mod resolver;
pub mod session;

// Re-export common error type
pub use error::{CardsmithError, Result};
