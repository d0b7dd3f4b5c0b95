//! Durable representation of the session list.

use super::model::{Session, sort_by_recency};

/// The session list plus the active-session pointer, as held by the
/// durable store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub sessions: Vec<Session>,
    pub active_session_id: Option<String>,
}

impl PersistedState {
    pub fn new(sessions: Vec<Session>, active_session_id: Option<String>) -> Self {
        Self {
            sessions,
            active_session_id,
        }
    }

    pub fn find(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    /// Inserts the session or replaces the stored copy with the same id.
    pub fn upsert(&mut self, session: Session) {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session,
            None => self.sessions.push(session),
        }
    }

    pub fn remove(&mut self, session_id: &str) -> Option<Session> {
        let position = self.sessions.iter().position(|s| s.id == session_id)?;
        Some(self.sessions.remove(position))
    }

    /// Orders sessions by descending update time and drops everything past
    /// `max_sessions`. Returns the evicted sessions.
    pub fn enforce_cap(&mut self, max_sessions: usize) -> Vec<Session> {
        sort_by_recency(&mut self.sessions);
        if self.sessions.len() > max_sessions {
            self.sessions.split_off(max_sessions)
        } else {
            Vec::new()
        }
    }

    /// The most recently updated session, if any.
    pub fn most_recent(&self) -> Option<&Session> {
        self.sessions.iter().max_by_key(|s| s.updated_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(id: &str, day: u32) -> Session {
        let mut session = Session::with_id(id);
        session.updated_at = format!("2024-01-{day:02}T00:00:00Z");
        session
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut state = PersistedState::default();
        state.upsert(session_at("a", 1));
        let mut updated = session_at("a", 2);
        updated.title = "Renamed".to_string();
        state.upsert(updated);

        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.sessions[0].title, "Renamed");
    }

    #[test]
    fn test_enforce_cap_keeps_most_recent() {
        let mut state = PersistedState::default();
        for day in 1..=5 {
            state.upsert(session_at(&format!("s{day}"), day));
        }

        let evicted = state.enforce_cap(3);

        let kept: Vec<_> = state.sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(kept, vec!["s5", "s4", "s3"]);
        let evicted: Vec<_> = evicted.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(evicted, vec!["s2", "s1"]);
    }

    #[test]
    fn test_most_recent_and_remove() {
        let mut state = PersistedState::new(
            vec![session_at("a", 3), session_at("b", 9), session_at("c", 5)],
            Some("b".to_string()),
        );
        assert_eq!(state.most_recent().map(|s| s.id.as_str()), Some("b"));

        assert!(state.remove("b").is_some());
        assert!(state.remove("b").is_none());
        assert_eq!(state.most_recent().map(|s| s.id.as_str()), Some("c"));
    }
}
