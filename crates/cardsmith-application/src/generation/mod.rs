//! Generation orchestration.
//!
//! - `orchestrator`: single-flight, cancellable streaming job runner
//! - `failure`: user-facing wording for failed runs

mod failure;
mod orchestrator;

pub use failure::{RETRY_HINT, describe_failure};
pub use orchestrator::GenerationOrchestrator;
