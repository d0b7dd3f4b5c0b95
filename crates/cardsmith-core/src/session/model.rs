//! Session domain model.
//!
//! A session is one named unit of saved work: the source text, the rich-text
//! snapshot the editor produced for it, the cards generated from it and the
//! document context used to steer generation.

use crate::card::Card;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to sessions that have not been named yet.
pub const UNTITLED_SESSION_TITLE: &str = "Untitled session";

const DERIVED_TITLE_MAX_CHARS: usize = 60;

/// A topic segment produced by the segmentation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSegment {
    pub title: String,
    /// Character offset where the segment starts in the raw text
    #[serde(default)]
    pub start: usize,
    /// Character offset where the segment ends (exclusive)
    #[serde(default)]
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A generated question attached to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionItem {
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
}

/// Represents a work session in the application's domain layer.
///
/// This is the "pure" domain model that business logic operates on,
/// independent of how the durable store encodes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Human-readable session title
    pub title: String,
    /// Timestamp when the session was created (RFC 3339)
    pub created_at: String,
    /// Timestamp when the session was last persisted (RFC 3339)
    pub updated_at: String,
    /// Raw text the user is studying
    #[serde(default)]
    pub raw_text: String,
    /// Rich-text document snapshot, opaque to the engine
    #[serde(default)]
    pub document: serde_json::Value,
    /// Ordered card list
    #[serde(default)]
    pub cards: Vec<Card>,
    /// Free-form context (usually an analysis summary) sent with generation
    #[serde(default)]
    pub document_context: String,
    /// Identifier returned by the analysis service for `document_context`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<TopicSegment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<QuestionItem>>,
}

impl Session {
    /// Creates an empty session with a fresh identifier.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Creates an empty session with the given identifier.
    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            title: UNTITLED_SESSION_TITLE.to_string(),
            created_at: now.clone(),
            updated_at: now,
            raw_text: String::new(),
            document: serde_json::Value::Null,
            cards: Vec::new(),
            document_context: String::new(),
            analysis_id: None,
            segments: None,
            questions: None,
        }
    }

    /// Returns true when there is nothing worth persisting:
    /// no text, no cards and no context.
    pub fn is_blank(&self) -> bool {
        self.raw_text.trim().is_empty()
            && self.cards.is_empty()
            && self.document_context.trim().is_empty()
    }

    /// Stamps `updated_at` with the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }

    /// Update time in milliseconds since the epoch.
    ///
    /// Unparsable timestamps sort as the oldest possible value.
    pub fn updated_millis(&self) -> i64 {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(i64::MIN)
    }

    pub fn has_default_title(&self) -> bool {
        self.title.trim().is_empty() || self.title == UNTITLED_SESSION_TITLE
    }

    /// Replaces the raw text.
    ///
    /// The title follows the first non-empty line of the text for as long
    /// as it is a placeholder or was itself derived from the previous text.
    /// A title the user set is kept.
    pub fn set_raw_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        let title_is_derived = self.has_default_title()
            || derive_title(&self.raw_text).is_some_and(|derived| derived == self.title);
        self.raw_text = text;
        if title_is_derived {
            self.title =
                derive_title(&self.raw_text).unwrap_or_else(|| UNTITLED_SESSION_TITLE.to_string());
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn derive_title(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|line| !line.is_empty())?;
    let mut title: String = line.chars().take(DERIVED_TITLE_MAX_CHARS).collect();
    if line.chars().count() > DERIVED_TITLE_MAX_CHARS {
        title.push('…');
    }
    Some(title)
}

/// Sorts sessions by descending update time.
///
/// The sort is stable, so sessions with equal timestamps keep their order.
pub fn sort_by_recency(sessions: &mut [Session]) {
    sessions.sort_by_key(|session| std::cmp::Reverse(session.updated_millis()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(id: &str, updated_at: &str) -> Session {
        let mut session = Session::with_id(id);
        session.updated_at = updated_at.to_string();
        session
    }

    #[test]
    fn test_new_session_is_blank() {
        let session = Session::new();
        assert!(session.is_blank());
        assert_eq!(session.title, UNTITLED_SESSION_TITLE);
        assert!(Uuid::parse_str(&session.id).is_ok());
    }

    #[test]
    fn test_context_alone_is_not_blank() {
        let mut session = Session::new();
        session.document_context = "Cell biology".to_string();
        assert!(!session.is_blank());
    }

    #[test]
    fn test_sort_by_recency_descending() {
        let mut sessions = vec![
            session_at("old", "2024-01-01T00:00:00Z"),
            session_at("new", "2024-03-01T00:00:00Z"),
            session_at("broken", "not a date"),
            session_at("mid", "2024-02-01T00:00:00+02:00"),
        ];
        sort_by_recency(&mut sessions);
        let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old", "broken"]);
    }

    #[test]
    fn test_derived_title_follows_text() {
        let mut session = Session::new();
        session.set_raw_text("\n  Mitochondria  \nproduce ATP");
        assert_eq!(session.title, "Mitochondria");

        for text in ["C", "Ce", "Cells divide"] {
            session.set_raw_text(text);
        }
        assert_eq!(session.title, "Cells divide");

        session.set_raw_text("   ");
        assert_eq!(session.title, UNTITLED_SESSION_TITLE);
    }

    #[test]
    fn test_user_title_is_kept() {
        let mut session = Session::new();
        session.set_raw_text("Cells");
        session.title = "Biology notes".to_string();

        session.set_raw_text("Cells divide by mitosis");

        assert_eq!(session.title, "Biology notes");
    }

    #[test]
    fn test_derive_title_truncates() {
        let mut session = Session::new();
        session.set_raw_text("x".repeat(80));
        assert_eq!(session.title.chars().count(), DERIVED_TITLE_MAX_CHARS + 1);
        assert!(session.title.ends_with('…'));
    }
}
