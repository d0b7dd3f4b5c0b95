//! Wiring of the engine components around one active session.

use crate::card_usecase::CardUseCase;
use crate::generation::GenerationOrchestrator;
use crate::notification::Notifier;
use crate::session::{SessionPersistenceManager, shared_state};
use cardsmith_core::config::AppConfig;
use cardsmith_core::error::Result;
use cardsmith_core::generation::{AnalysisService, GenerationService};
use cardsmith_core::resolver::ContentResolver;
use cardsmith_core::session::{KeyValueStore, Session};
use std::sync::Arc;

/// Every engine component, sharing one session state and one notifier.
#[derive(Clone)]
pub struct CardsmithEngine {
    pub notifier: Notifier,
    pub resolver: ContentResolver,
    pub persistence: SessionPersistenceManager,
    pub cards: CardUseCase,
    pub orchestrator: GenerationOrchestrator,
}

impl CardsmithEngine {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        service: Arc<dyn GenerationService>,
        analysis: Option<Arc<dyn AnalysisService>>,
    ) -> Self {
        let notifier = Notifier::default();
        let state = shared_state(Session::new(), config.history.capacity);
        let persistence = SessionPersistenceManager::new(
            state,
            store,
            config.persistence.clone(),
            notifier.clone(),
        );
        let analysis = analysis.filter(|_| config.service.analysis_enabled);
        let orchestrator = GenerationOrchestrator::new(
            service,
            analysis,
            persistence.clone(),
            notifier.clone(),
            config.generation.clone(),
        );

        Self {
            resolver: ContentResolver::new(config.generation.highlight_separator.clone()),
            cards: CardUseCase::new(persistence.clone()),
            notifier,
            persistence,
            orchestrator,
        }
    }

    /// Restores the last active session, if any was stored.
    pub async fn restore(&self) -> Result<Option<Session>> {
        self.persistence.restore_last_active().await
    }

    /// Writes out any pending debounced save. Call before shutting down.
    pub async fn shutdown(&self) -> Result<()> {
        if self.orchestrator.is_running().await {
            tracing::warn!("[Engine] Shutting down with a generation job still running");
        }
        if self.persistence.flush().await? {
            tracing::info!("[Engine] Flushed pending save");
        }
        Ok(())
    }
}
