//! Generation and analysis service traits.

use super::request::GenerationJob;
use super::stage::{RawStageEvent, StageEnvelope};
use crate::card::Card;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Channel a service reports stage events through.
///
/// Events are delivered to the orchestrator in emission order.
#[derive(Debug, Clone)]
pub struct StageSink {
    request_id: String,
    sender: UnboundedSender<StageEnvelope>,
}

impl StageSink {
    pub fn new(request_id: impl Into<String>, sender: UnboundedSender<StageEnvelope>) -> Self {
        Self {
            request_id: request_id.into(),
            sender,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Emits an event for this sink's request. Returns false once the
    /// orchestrator stopped listening.
    pub fn emit(&self, event: RawStageEvent) -> bool {
        self.forward(StageEnvelope {
            request_id: self.request_id.clone(),
            event,
        })
    }

    /// Forwards an already-tagged envelope (e.g. relayed from a remote
    /// stream that carries its own request id).
    pub fn forward(&self, envelope: StageEnvelope) -> bool {
        self.sender.send(envelope).is_ok()
    }
}

/// The remote card generation service.
///
/// # Implementation Notes
///
/// - `generate` may call the sink zero or more times before resolving.
/// - When `job.cancellation_token` fires, implementations should stop and
///   return [`crate::CardsmithError::Aborted`].
/// - `cancel_request` is best-effort: it asks the service to stop and flush
///   partial output, with no guaranteed acknowledgement time.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, job: GenerationJob, sink: StageSink) -> Result<Vec<Card>>;

    async fn cancel_request(&self, request_id: &str) -> Result<()>;
}

/// Result of document analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub analysis_id: String,
}

/// Summarizes a document so generation can be steered by its context.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, text: &str, model: Option<&str>) -> Result<AnalysisResult>;
}
