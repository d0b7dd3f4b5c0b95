//! In-memory state of the active session.

use cardsmith_core::history::MutationHistory;
use cardsmith_core::session::Session;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Everything that must change together: the active session (and its card
/// list), the undo history for that list, and the restoring guard.
#[derive(Debug)]
pub struct SessionState {
    pub session: Session,
    pub history: MutationHistory,
    /// Set while a stored session is being loaded; saves are not scheduled
    /// and edits are not treated as user input.
    pub restoring: bool,
    /// The raw text changed since the last analysis.
    pub needs_analysis: bool,
}

impl SessionState {
    pub fn new(session: Session, history_capacity: usize) -> Self {
        Self {
            session,
            history: MutationHistory::new(history_capacity),
            restoring: false,
            needs_analysis: false,
        }
    }
}

pub type SharedSessionState = Arc<RwLock<SessionState>>;

pub fn shared_state(session: Session, history_capacity: usize) -> SharedSessionState {
    Arc::new(RwLock::new(SessionState::new(session, history_capacity)))
}
