//! Stage events emitted by the generation service.
//!
//! The service reports progress as `{stage, data}` pairs. Known stages are
//! decoded into [`StageEvent`]; anything else is kept as
//! [`StageEvent::Unknown`] so newer services keep working.

use crate::card::Card;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A stage event exactly as the service emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStageEvent {
    pub stage: String,
    #[serde(default)]
    pub data: Value,
}

impl RawStageEvent {
    pub fn new(stage: impl Into<String>, data: Value) -> Self {
        Self {
            stage: stage.into(),
            data,
        }
    }
}

/// A raw event tagged with the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEnvelope {
    pub request_id: String,
    pub event: RawStageEvent,
}

/// Error categories a service can report through an `error` stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageErrorKind {
    ContentScarcity,
    Transport,
    Timeout,
    Validation,
    Other(String),
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentScarcity => write!(f, "content_scarcity"),
            Self::Transport => write!(f, "transport"),
            Self::Timeout => write!(f, "timeout"),
            Self::Validation => write!(f, "validation"),
            Self::Other(kind) => write!(f, "{kind}"),
        }
    }
}

impl StageErrorKind {
    pub fn parse(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "content_scarcity" | "content-scarcity" | "scarcity" => Self::ContentScarcity,
            "transport" | "network" => Self::Transport,
            "timeout" => Self::Timeout,
            "validation" => Self::Validation,
            _ => Self::Other(kind.to_string()),
        }
    }
}

/// Decoded stage event.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    Started,
    /// Candidate cards parsed from the model output.
    Parsed { count: u32, cards: Vec<Card> },
    /// One quality-filter pass (1-based).
    Filtered { kept: u32, dropped: u32, pass: u32 },
    /// Quality threshold loosened because too few cards survived.
    Relaxed { threshold: Option<f64> },
    /// Second generation pass after under-production (`repair_*`).
    Repair { phase: String },
    LanguageCheck,
    Done { total: u32 },
    Warning { message: String },
    Error {
        kind: StageErrorKind,
        message: Option<String>,
        recommended_max: Option<u32>,
    },
    Cancelled { partial_count: u32 },
    /// Stage name this engine does not know about.
    Unknown { stage: String, data: Value },
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ParsedData {
    count: Option<u32>,
    cards: Vec<Card>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct FilteredData {
    kept: u32,
    dropped: u32,
    pass: Option<u32>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RelaxedData {
    threshold: Option<f64>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct DoneData {
    total: u32,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct MessageData {
    message: String,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ErrorData {
    kind: String,
    message: Option<String>,
    #[serde(alias = "recommended_max", alias = "maxCards")]
    recommended_max: Option<u32>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct CancelledData {
    #[serde(alias = "partial_count")]
    partial_count: u32,
}

/// Lenient payload decoding: a malformed payload yields defaults instead
/// of dropping the event.
fn payload<T: DeserializeOwned + Default>(data: &Value) -> T {
    serde_json::from_value(data.clone()).unwrap_or_default()
}

impl StageEvent {
    pub fn from_raw(raw: &RawStageEvent) -> Self {
        let stage = raw.stage.trim();
        match stage {
            "started" => Self::Started,
            "parsed" => {
                let data: ParsedData = payload(&raw.data);
                let count = data.count.unwrap_or(data.cards.len() as u32);
                Self::Parsed {
                    count,
                    cards: data.cards,
                }
            }
            "filtered" => {
                let data: FilteredData = payload(&raw.data);
                Self::Filtered {
                    kept: data.kept,
                    dropped: data.dropped,
                    pass: data.pass.unwrap_or(1).max(1),
                }
            }
            "relaxed" => {
                let data: RelaxedData = payload(&raw.data);
                Self::Relaxed {
                    threshold: data.threshold,
                }
            }
            "language_check" => Self::LanguageCheck,
            "done" => {
                let data: DoneData = payload(&raw.data);
                Self::Done { total: data.total }
            }
            "warning" => {
                let data: MessageData = payload(&raw.data);
                Self::Warning {
                    message: data.message,
                }
            }
            "error" => {
                let data: ErrorData = payload(&raw.data);
                Self::Error {
                    kind: StageErrorKind::parse(&data.kind),
                    message: data.message,
                    recommended_max: data.recommended_max,
                }
            }
            "cancelled" => {
                let data: CancelledData = payload(&raw.data);
                Self::Cancelled {
                    partial_count: data.partial_count,
                }
            }
            _ => match stage.strip_prefix("repair_") {
                Some(phase) => Self::Repair {
                    phase: phase.to_string(),
                },
                None => Self::Unknown {
                    stage: raw.stage.clone(),
                    data: raw.data.clone(),
                },
            },
        }
    }

    /// Progress percentage this event represents, if it moves progress.
    pub fn progress(&self) -> Option<u8> {
        match self {
            Self::Started => Some(5),
            Self::Parsed { .. } => Some(30),
            Self::Filtered { pass, .. } => {
                let step = pass.saturating_sub(1).min(3) as u8;
                Some(45 + 5 * step)
            }
            Self::Relaxed { .. } => Some(62),
            Self::Repair { .. } => Some(70),
            Self::LanguageCheck => Some(85),
            Self::Done { .. } => Some(100),
            Self::Warning { .. }
            | Self::Error { .. }
            | Self::Cancelled { .. }
            | Self::Unknown { .. } => None,
        }
    }

    /// Human-readable stage label.
    pub fn label(&self) -> String {
        match self {
            Self::Started => "Starting generation".to_string(),
            Self::Parsed { count, .. } => format!("Parsed {count} candidate cards"),
            Self::Filtered {
                kept,
                dropped,
                pass,
            } => format!("Quality filter pass {pass}: kept {kept}, dropped {dropped}"),
            Self::Relaxed { threshold: Some(t) } => {
                format!("Relaxed quality threshold to {t:.2}")
            }
            Self::Relaxed { threshold: None } => "Relaxed quality threshold".to_string(),
            Self::Repair { phase } => format!("Repair pass ({phase})"),
            Self::LanguageCheck => "Checking language".to_string(),
            Self::Done { total } => format!("Done: {total} cards"),
            Self::Warning { message } => format!("Warning: {message}"),
            Self::Error {
                kind,
                message: Some(message),
                ..
            } => format!("Error ({kind}): {message}"),
            Self::Error { kind, .. } => format!("Error ({kind})"),
            Self::Cancelled { partial_count } => {
                format!("Cancelled with {partial_count} partial cards")
            }
            Self::Unknown { stage, .. } => stage.clone(),
        }
    }

    /// Events still meaningful once a cancellation has been accepted.
    pub fn relevant_while_cancelling(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::Warning { .. })
    }

    pub fn is_content_scarcity(&self) -> bool {
        matches!(
            self,
            Self::Error {
                kind: StageErrorKind::ContentScarcity,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(stage: &str, data: Value) -> StageEvent {
        StageEvent::from_raw(&RawStageEvent::new(stage, data))
    }

    #[test]
    fn test_parsed_carries_cards_and_count() {
        let event = decode(
            "parsed",
            json!({"cards": [{"front": "Q", "back": "A"}, {"front": "Q2", "back": "A2"}]}),
        );
        match event {
            StageEvent::Parsed { count, cards } => {
                assert_eq!(count, 2);
                assert_eq!(cards[0].front, "Q");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert_eq!(
            decode("parsed", json!({"count": 3})),
            StageEvent::Parsed {
                count: 3,
                cards: vec![]
            }
        );
    }

    #[test]
    fn test_error_kind_and_recommended_max() {
        let event = decode(
            "error",
            json!({"kind": "content_scarcity", "recommended_max": 4}),
        );
        assert!(event.is_content_scarcity());
        match event {
            StageEvent::Error {
                recommended_max, ..
            } => assert_eq!(recommended_max, Some(4)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_repair_prefix_and_unknown_passthrough() {
        assert_eq!(
            decode("repair_started", Value::Null),
            StageEvent::Repair {
                phase: "started".to_string()
            }
        );

        let unknown = decode("embedding_warmup", json!({"x": 1}));
        assert_eq!(unknown.label(), "embedding_warmup");
        assert_eq!(unknown.progress(), None);
    }

    #[test]
    fn test_malformed_payload_uses_defaults() {
        let event = decode("done", json!("not an object"));
        assert_eq!(event, StageEvent::Done { total: 0 });
        assert_eq!(event.progress(), Some(100));
    }

    #[test]
    fn test_progress_order_of_pipeline() {
        let pipeline = [
            decode("started", Value::Null),
            decode("parsed", json!({"count": 10})),
            decode("filtered", json!({"kept": 6, "dropped": 4})),
            decode("filtered", json!({"kept": 5, "dropped": 1, "pass": 2})),
            decode("relaxed", json!({"threshold": 0.5})),
            decode("repair_generate", Value::Null),
            decode("language_check", Value::Null),
            decode("done", json!({"total": 5})),
        ];
        let progress: Vec<u8> = pipeline.iter().filter_map(StageEvent::progress).collect();
        assert_eq!(progress, vec![5, 30, 45, 50, 62, 70, 85, 100]);
    }

    #[test]
    fn test_cancelled_accepts_camel_and_snake_case() {
        assert_eq!(
            decode("cancelled", json!({"partialCount": 2})),
            StageEvent::Cancelled { partial_count: 2 }
        );
        assert_eq!(
            decode("cancelled", json!({"partial_count": 3})),
            StageEvent::Cancelled { partial_count: 3 }
        );
    }
}
