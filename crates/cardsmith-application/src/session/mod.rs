//! Active-session state and its persistence.
//!
//! - `state`: the shared in-memory session, undo history and guards
//! - `persistence`: debounced saving and session switching
//! - `debounce`: cancellable delayed task used for debouncing

mod debounce;
mod persistence;
mod state;

pub use debounce::DelayedTask;
pub use persistence::{SaveStatus, SessionPersistenceManager};
pub use state::{SessionState, SharedSessionState, shared_state};
