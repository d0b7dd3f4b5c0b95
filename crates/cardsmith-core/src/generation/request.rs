//! Generation request lifecycle types.

use super::stage::StageEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Kind of card the service should produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CardType {
    #[default]
    Basic,
    Reversed,
    Cloze,
}

/// Caller-supplied knobs for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationOptions {
    pub deck_names: Vec<String>,
    pub card_type: CardType,
    pub model: Option<String>,
    pub validation_model: Option<String>,
    pub analysis_model: Option<String>,
    pub custom_prompts: BTreeMap<String, String>,
    pub max_cards: Option<u32>,
}

impl GenerationOptions {
    pub fn with_max_cards(mut self, max_cards: u32) -> Self {
        self.max_cards = Some(max_cards);
        self
    }

    pub fn with_deck(mut self, deck: impl Into<String>) -> Self {
        self.deck_names.push(deck.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Everything the generation service receives for one request.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub request_id: String,
    pub content: String,
    pub context: String,
    pub analysis_id: Option<String>,
    pub options: GenerationOptions,
    /// Fires when the transport must be torn down (forced abort).
    pub cancellation_token: CancellationToken,
}

/// Where a cancellation currently stands.
///
/// `None → Requested → Cooperating → Forced`. The forced transition only
/// happens when the hard-abort timer fires before the job finished.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CancelPhase {
    #[default]
    None,
    /// `cancel()` accepted, cooperative signal not yet dispatched
    Requested,
    /// Cooperative signal sent, hard-abort timer armed
    Cooperating,
    /// Transport torn down
    Forced,
}

impl CancelPhase {
    /// True once a cancellation has been accepted.
    pub fn is_cancelling(self) -> bool {
        self != Self::None
    }
}

/// Orchestrator state machine.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Preparing,
    Streaming,
    Completing,
    Cancelling,
    Cancelled,
    Failed,
}

impl JobState {
    /// True while a job occupies the single-flight slot.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Preparing | Self::Streaming | Self::Completing | Self::Cancelling
        )
    }
}

/// Ephemeral state of one orchestration run.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: String,
    pub token: CancellationToken,
    pub stage: String,
    pub progress: u8,
    pub log: Vec<String>,
    pub cancelled: bool,
    pub cancel_phase: CancelPhase,
    log_capacity: usize,
}

impl GenerationRequest {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            token: CancellationToken::new(),
            stage: "Preparing".to_string(),
            progress: 0,
            log: Vec::new(),
            cancelled: false,
            cancel_phase: CancelPhase::None,
            log_capacity: log_capacity.max(1),
        }
    }

    /// Folds a stage event into label, progress and log.
    ///
    /// Progress never moves backwards.
    pub fn apply(&mut self, event: &StageEvent) {
        let label = event.label();
        if let Some(progress) = event.progress() {
            self.progress = self.progress.max(progress.min(100));
        }
        self.push_log(label.clone());
        self.stage = label;
    }

    pub fn set_stage(&mut self, stage: impl Into<String>) {
        let stage = stage.into();
        self.push_log(stage.clone());
        self.stage = stage;
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
        if self.log.len() > self.log_capacity {
            let excess = self.log.len() - self.log_capacity;
            self.log.drain(..excess);
        }
    }
}

/// Snapshot of the orchestrator published to observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatus {
    pub state: JobState,
    pub request_id: Option<String>,
    pub stage: String,
    pub progress: u8,
    pub log: Vec<String>,
    pub cancel_phase: CancelPhase,
}

impl GenerationStatus {
    pub fn from_request(state: JobState, request: &GenerationRequest) -> Self {
        Self {
            state,
            request_id: Some(request.id.clone()),
            stage: request.stage.clone(),
            progress: request.progress,
            log: request.log.clone(),
            cancel_phase: request.cancel_phase,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Completed {
        request_id: String,
        appended: usize,
        requested: Option<u32>,
    },
    Cancelled {
        request_id: String,
        preserved: usize,
        forced: bool,
    },
    ContentScarcity {
        request_id: String,
        recommended_max: Option<u32>,
    },
    Failed {
        request_id: String,
        message: String,
        preserved: usize,
    },
}

impl GenerationOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Completed { request_id, .. }
            | Self::Cancelled { request_id, .. }
            | Self::ContentScarcity { request_id, .. }
            | Self::Failed { request_id, .. } => request_id,
        }
    }

    /// Cards that ended up in the session.
    pub fn cards_added(&self) -> usize {
        match self {
            Self::Completed { appended, .. } => *appended,
            Self::Cancelled { preserved, .. } | Self::Failed { preserved, .. } => *preserved,
            Self::ContentScarcity { .. } => 0,
        }
    }

    /// Completed, but with fewer cards than were asked for.
    pub fn is_partial_success(&self) -> bool {
        matches!(
            self,
            Self::Completed {
                appended,
                requested: Some(requested),
                ..
            } if (*appended as u64) < u64::from(*requested)
        )
    }

    /// State the orchestrator settles in once the outcome is published.
    pub fn state(&self) -> JobState {
        match self {
            Self::Completed { .. } => JobState::Idle,
            Self::Cancelled { .. } => JobState::Cancelled,
            Self::ContentScarcity { .. } | Self::Failed { .. } => JobState::Failed,
        }
    }
}
