//! Application layer for Cardsmith.
//!
//! Coordinates the domain types from `cardsmith-core` with a durable store
//! and a generation service: active-session state, debounced persistence,
//! the generation orchestrator and card editing with undo/redo.

pub mod card_usecase;
pub mod engine;
pub mod generation;
pub mod notification;
pub mod session;

pub use card_usecase::CardUseCase;
pub use engine::CardsmithEngine;
pub use generation::GenerationOrchestrator;
pub use notification::{Notification, NotificationLevel, Notifier};
pub use session::{SaveStatus, SessionPersistenceManager};
