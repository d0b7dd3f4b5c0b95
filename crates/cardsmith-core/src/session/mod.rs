//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`) and its derived artifacts
//! - `persisted`: The durable session list (`PersistedState`)
//! - `store`: Key-value store trait and the keys the engine uses

mod model;
mod persisted;
mod store;

pub use model::{QuestionItem, Session, TopicSegment, UNTITLED_SESSION_TITLE, sort_by_recency};
pub use persisted::PersistedState;
pub use store::{ACTIVE_SESSION_KEY, KeyValueStore, SESSIONS_KEY};
