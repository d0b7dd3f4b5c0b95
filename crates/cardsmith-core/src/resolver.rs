//! Content resolution: which text scope feeds a generation request.
//!
//! Generation quality and cost depend on what is sent, so the scope is
//! picked by a fixed priority and a fallback to the whole document is always
//! flagged to the user.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Separator placed between highlighted spans by default.
pub const DEFAULT_HIGHLIGHT_SEPARATOR: &str = "\n\n";

const FULL_DOCUMENT_MESSAGE: &str =
    "Nothing is selected or highlighted, so the whole document will be used.";
const EMPTY_DOCUMENT_MESSAGE: &str = "The document is empty. Add some text before generating.";

/// A highlighted span of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightSpan {
    /// Character offset of the span in the document
    pub start: usize,
    pub text: String,
}

impl HighlightSpan {
    pub fn new(start: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            text: text.into(),
        }
    }
}

/// Read access to the editor state the resolver depends on.
///
/// Highlighting and selection tracking live in the editor; the resolver only
/// needs their current results.
pub trait EditorView {
    /// Current live selection (may be empty)
    fn selection(&self) -> String;
    /// Highlighted spans, in any order
    fn highlights(&self) -> Vec<HighlightSpan>;
    /// Full document text
    fn document_text(&self) -> String;
}

/// Plain in-memory editor state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSnapshot {
    pub selection: String,
    pub highlights: Vec<HighlightSpan>,
    pub document_text: String,
}

impl TextSnapshot {
    pub fn new(document_text: impl Into<String>) -> Self {
        Self {
            document_text: document_text.into(),
            ..Self::default()
        }
    }

    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = selection.into();
        self
    }

    pub fn with_highlight(mut self, span: HighlightSpan) -> Self {
        self.highlights.push(span);
        self
    }
}

impl EditorView for TextSnapshot {
    fn selection(&self) -> String {
        self.selection.clone()
    }

    fn highlights(&self) -> Vec<HighlightSpan> {
        self.highlights.clone()
    }

    fn document_text(&self) -> String {
        self.document_text.clone()
    }
}

/// Where the resolved content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentSource {
    Selection,
    Highlight,
    Full,
    Empty,
}

/// The text chosen for generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedContent {
    pub source: ContentSource,
    pub content: String,
    /// True when the user did not explicitly pick the scope
    pub should_warn: bool,
    pub message: Option<String>,
}

impl ResolvedContent {
    /// Generation must not start from an empty resolution.
    pub fn is_empty(&self) -> bool {
        self.source == ContentSource::Empty || self.content.trim().is_empty()
    }
}

/// Picks the text fed to generation.
///
/// Priority, first non-empty wins: live selection, concatenated highlights,
/// full document. Pure and deterministic for a given editor state.
#[derive(Debug, Clone)]
pub struct ContentResolver {
    separator: String,
}

impl ContentResolver {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    pub fn resolve(&self, view: &dyn EditorView) -> ResolvedContent {
        let selection = view.selection();
        let selection = selection.trim();
        if !selection.is_empty() {
            return ResolvedContent {
                source: ContentSource::Selection,
                content: selection.to_string(),
                should_warn: false,
                message: None,
            };
        }

        let mut highlights: Vec<HighlightSpan> = view
            .highlights()
            .into_iter()
            .filter(|span| !span.text.trim().is_empty())
            .collect();
        if !highlights.is_empty() {
            // stable: equal offsets keep their input order
            highlights.sort_by_key(|span| span.start);
            let content = highlights
                .iter()
                .map(|span| span.text.trim())
                .collect::<Vec<_>>()
                .join(&self.separator);
            return ResolvedContent {
                source: ContentSource::Highlight,
                content,
                should_warn: false,
                message: None,
            };
        }

        let document = view.document_text();
        let document = document.trim();
        if !document.is_empty() {
            return ResolvedContent {
                source: ContentSource::Full,
                content: document.to_string(),
                should_warn: true,
                message: Some(FULL_DOCUMENT_MESSAGE.to_string()),
            };
        }

        ResolvedContent {
            source: ContentSource::Empty,
            content: String::new(),
            should_warn: true,
            message: Some(EMPTY_DOCUMENT_MESSAGE.to_string()),
        }
    }
}

impl Default for ContentResolver {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_SEPARATOR)
    }
}
