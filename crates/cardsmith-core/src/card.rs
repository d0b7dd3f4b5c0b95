//! Study card model.

use serde::{Deserialize, Serialize};

/// Deck label used when a card arrives without one.
pub const DEFAULT_DECK: &str = "Default";

/// A single study card.
///
/// Cards are owned by exactly one session and are never shared across
/// sessions; they are created by generation or manual edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Prompt side
    pub front: String,
    /// Answer side
    pub back: String,
    /// Deck the card belongs to
    #[serde(default = "default_deck")]
    pub deck: String,
    /// Optional pointer to where the card came from (e.g. a parent card)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
}

fn default_deck() -> String {
    DEFAULT_DECK.to_string()
}

impl Card {
    /// Creates a card in the default deck.
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            deck: default_deck(),
            source_ref: None,
        }
    }

    pub fn with_deck(mut self, deck: impl Into<String>) -> Self {
        self.deck = deck.into();
        self
    }

    pub fn with_source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }
}
