//! Session record decoding (anti-corruption layer).
//!
//! Stored session lists may come from older releases or be partially
//! corrupted. Records are coerced field by field into the domain model
//! instead of failing the whole list:
//!
//! - missing title → "Untitled session" (legacy `name` is honored)
//! - missing id → fresh UUID
//! - missing timestamps → the other timestamp, or the epoch
//! - missing arrays → empty; malformed entries inside arrays are skipped
//! - non-object records are skipped

use cardsmith_core::card::{Card, DEFAULT_DECK};
use cardsmith_core::error::{CardsmithError, Result};
use cardsmith_core::session::{QuestionItem, Session, TopicSegment, UNTITLED_SESSION_TITLE};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Timestamp used when a record carries neither creation nor update time.
pub const EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00+00:00";

/// Decodes the stored session list.
///
/// Returns an error only when the blob is not a JSON array at all; callers
/// treat that as an empty list.
pub fn decode_sessions(raw: &str) -> Result<Vec<Session>> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Array(entries) = value else {
        return Err(CardsmithError::Serialization {
            format: "JSON".to_string(),
            message: "session list is not an array".to_string(),
        });
    };

    let total = entries.len();
    let sessions: Vec<Session> = entries
        .into_iter()
        .filter_map(|entry| match entry {
            Value::Object(record) => Some(coerce_session(&record)),
            _ => None,
        })
        .collect();

    if sessions.len() < total {
        tracing::warn!(
            "[SessionDto] Skipped {} non-object session records",
            total - sessions.len()
        );
    }
    Ok(sessions)
}

pub fn encode_sessions(sessions: &[Session]) -> Result<String> {
    Ok(serde_json::to_string(sessions)?)
}

/// Normalizes the stored active-session pointer.
///
/// Older releases stored it JSON-quoted; both forms are accepted.
pub fn decode_active_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let id = serde_json::from_str::<String>(trimmed).unwrap_or_else(|_| trimmed.to_string());
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

fn field<'a>(record: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| record.get(*name))
        .find(|value| !value.is_null())
}

fn string_field(record: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(record, names)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Decodes each array element independently, dropping the ones that fail.
fn lenient_array<T: DeserializeOwned>(value: Option<&Value>) -> Vec<T> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn coerce_card(value: &Value) -> Option<Card> {
    let record = value.as_object()?;
    let front = string_field(record, &["front", "question"]).unwrap_or_default();
    let back = string_field(record, &["back", "answer"]).unwrap_or_default();
    if front.trim().is_empty() && back.trim().is_empty() {
        return None;
    }
    let deck = non_blank(string_field(record, &["deck", "deckName", "deck_name"]))
        .unwrap_or_else(|| DEFAULT_DECK.to_string());
    Some(Card {
        front,
        back,
        deck,
        source_ref: string_field(record, &["sourceRef", "source_ref"]),
    })
}

fn coerce_session(record: &Map<String, Value>) -> Session {
    let id = non_blank(string_field(record, &["id"])).unwrap_or_else(|| Uuid::new_v4().to_string());
    let title = non_blank(string_field(record, &["title", "name"]))
        .unwrap_or_else(|| UNTITLED_SESSION_TITLE.to_string());

    let created_at = non_blank(string_field(record, &["createdAt", "created_at"]));
    let updated_at = non_blank(string_field(record, &["updatedAt", "updated_at"]));
    let (created_at, updated_at) = match (created_at, updated_at) {
        (Some(created), Some(updated)) => (created, updated),
        (Some(created), None) => (created.clone(), created),
        (None, Some(updated)) => (updated.clone(), updated),
        (None, None) => (EPOCH_TIMESTAMP.to_string(), EPOCH_TIMESTAMP.to_string()),
    };

    let cards = match field(record, &["cards", "flashcards"]) {
        Some(Value::Array(items)) => items.iter().filter_map(coerce_card).collect(),
        _ => Vec::new(),
    };

    let segments = field(record, &["segments", "topicSegments"])
        .map(|value| lenient_array::<TopicSegment>(Some(value)));
    let questions = field(record, &["questions", "questionItems"])
        .map(|value| lenient_array::<QuestionItem>(Some(value)));

    Session {
        id,
        title,
        created_at,
        updated_at,
        raw_text: string_field(record, &["rawText", "raw_text", "text"]).unwrap_or_default(),
        document: field(record, &["document", "doc"])
            .cloned()
            .unwrap_or(Value::Null),
        cards,
        document_context: string_field(record, &["documentContext", "document_context", "context"])
            .unwrap_or_default(),
        analysis_id: non_blank(string_field(record, &["analysisId", "analysis_id"])),
        segments,
        questions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_current_format() {
        let mut session = Session::with_id("s-1");
        session.title = "Biology".to_string();
        session.raw_text = "Cells".to_string();
        session.cards = vec![Card::new("What is a cell?", "The unit of life")];
        session.analysis_id = Some("an-1".to_string());

        let encoded = encode_sessions(std::slice::from_ref(&session)).unwrap();
        assert!(encoded.contains("\"rawText\""));

        let decoded = decode_sessions(&encoded).unwrap();
        assert_eq!(decoded, vec![session]);
    }

    #[test]
    fn test_missing_fields_are_coerced() {
        let raw = json!([{ "rawText": "hello" }]).to_string();

        let sessions = decode_sessions(&raw).unwrap();

        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.title, UNTITLED_SESSION_TITLE);
        assert!(Uuid::parse_str(&session.id).is_ok());
        assert_eq!(session.created_at, EPOCH_TIMESTAMP);
        assert_eq!(session.updated_at, EPOCH_TIMESTAMP);
        assert!(session.cards.is_empty());
        assert!(session.segments.is_none());
    }

    #[test]
    fn test_one_timestamp_fills_the_other() {
        let raw = json!([{ "id": "a", "updatedAt": "2024-05-01T10:00:00Z" }]).to_string();

        let session = &decode_sessions(&raw).unwrap()[0];

        assert_eq!(session.created_at, "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_legacy_field_names() {
        let raw = json!([{
            "id": "legacy",
            "name": "Old notes",
            "text": "body",
            "context": "summary",
            "flashcards": [
                { "question": "Q", "answer": "A" },
                "garbage",
                { "front": "", "back": "" }
            ]
        }])
        .to_string();

        let session = &decode_sessions(&raw).unwrap()[0];

        assert_eq!(session.title, "Old notes");
        assert_eq!(session.raw_text, "body");
        assert_eq!(session.document_context, "summary");
        assert_eq!(session.cards, vec![Card::new("Q", "A")]);
    }

    #[test]
    fn test_non_object_entries_are_skipped() {
        let raw = json!([1, "x", null, { "id": "ok" }]).to_string();

        let sessions = decode_sessions(&raw).unwrap();

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "ok");
    }

    #[test]
    fn test_unparsable_blob_is_an_error() {
        assert!(decode_sessions("{not json").is_err());
        assert!(decode_sessions(r#"{"id": "a"}"#).is_err());
    }

    #[test]
    fn test_malformed_segments_are_dropped() {
        let raw = json!([{
            "id": "seg",
            "segments": [{ "title": "Intro", "start": 0, "end": 5 }, { "start": "x" }]
        }])
        .to_string();

        let session = &decode_sessions(&raw).unwrap()[0];

        let segments = session.segments.as_ref().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].title, "Intro");
    }

    #[test]
    fn test_active_id_plain_or_quoted() {
        assert_eq!(decode_active_id("abc").as_deref(), Some("abc"));
        assert_eq!(decode_active_id("\"abc\"").as_deref(), Some("abc"));
        assert_eq!(decode_active_id("  "), None);
    }
}
