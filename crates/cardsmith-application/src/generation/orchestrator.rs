//! Generation Orchestrator.
//!
//! Runs one cancellable streaming generation job at a time. Stage events
//! from the service are folded into a [`GenerationStatus`] that observers
//! follow through a watch channel; produced cards are appended to the
//! session the job was started from.
//!
//! Cancellation is two-phase: a cooperative `cancel_request` to the service,
//! then a hard abort of the transport if the job is still running once the
//! grace period has elapsed.

use super::failure::describe_failure;
use crate::notification::Notifier;
use crate::session::{DelayedTask, SessionPersistenceManager};
use cardsmith_core::card::Card;
use cardsmith_core::config::GenerationConfig;
use cardsmith_core::error::{CardsmithError, Result};
use cardsmith_core::generation::{
    AnalysisService, CancelPhase, GenerationJob, GenerationOptions, GenerationOutcome,
    GenerationRequest, GenerationService, GenerationStatus, JobState, StageEnvelope, StageEvent,
    StageSink,
};
use cardsmith_core::resolver::ResolvedContent;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// The service said the text cannot support the requested card count.
#[derive(Debug, Clone, Copy)]
struct Scarcity {
    recommended_max: Option<u32>,
}

/// The job occupying the single-flight slot.
struct ActiveJob {
    request: GenerationRequest,
    state: JobState,
    /// Session the job was started from; cards land there even if the user
    /// switched sessions meanwhile.
    session_id: String,
    requested: Option<u32>,
    /// Cards carried by `parsed` events, kept in case the run does not
    /// complete normally.
    partial_cards: Vec<Card>,
    scarcity: Option<Scarcity>,
}

/// What is left of a job once it stops streaming.
struct Finishing {
    session_id: String,
    requested: Option<u32>,
    partial_cards: Vec<Card>,
    scarcity: Option<Scarcity>,
    phase: CancelPhase,
}

/// How the streaming phase ended.
enum RunEnd {
    /// Cancelled before the service was called.
    CancelledEarly,
    /// The hard abort tore the transport down.
    Forced,
    Returned(Result<Vec<Card>>),
}

struct OrchestratorInner {
    service: Arc<dyn GenerationService>,
    analysis: Option<Arc<dyn AnalysisService>>,
    persistence: SessionPersistenceManager,
    notifier: Notifier,
    config: GenerationConfig,
    current: Mutex<Option<ActiveJob>>,
    hard_abort: Mutex<DelayedTask>,
    status: watch::Sender<GenerationStatus>,
}

#[derive(Clone)]
pub struct GenerationOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl GenerationOrchestrator {
    pub fn new(
        service: Arc<dyn GenerationService>,
        analysis: Option<Arc<dyn AnalysisService>>,
        persistence: SessionPersistenceManager,
        notifier: Notifier,
        config: GenerationConfig,
    ) -> Self {
        let (status, _) = watch::channel(GenerationStatus::default());
        Self {
            inner: Arc::new(OrchestratorInner {
                service,
                analysis,
                persistence,
                notifier,
                config,
                current: Mutex::new(None),
                hard_abort: Mutex::new(DelayedTask::new()),
                status,
            }),
        }
    }

    /// Subscribes to status changes.
    pub fn status(&self) -> watch::Receiver<GenerationStatus> {
        self.inner.status.subscribe()
    }

    pub fn current_status(&self) -> GenerationStatus {
        self.inner.status.borrow().clone()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.current.lock().await.is_some()
    }

    /// Starts generation from resolved editor content.
    ///
    /// Surfaces the resolver's warning (e.g. "using the whole document")
    /// before starting.
    pub async fn start_resolved(
        &self,
        resolved: ResolvedContent,
        options: GenerationOptions,
    ) -> Result<GenerationOutcome> {
        if resolved.is_empty() {
            return Err(CardsmithError::EmptyContent);
        }
        if resolved.should_warn
            && let Some(message) = &resolved.message
        {
            self.inner.notifier.info(message.clone());
        }
        self.start(&resolved.content, options).await
    }

    /// Runs one generation job to its end.
    ///
    /// Fails fast with `EmptyContent` or `GenerationInProgress`; every other
    /// failure is reported through the returned outcome and the notifier.
    pub async fn start(
        &self,
        content: &str,
        options: GenerationOptions,
    ) -> Result<GenerationOutcome> {
        let inner = &self.inner;
        let content = content.trim();
        if content.is_empty() {
            return Err(CardsmithError::EmptyContent);
        }
        let options = inner.apply_defaults(options);

        let (request_id, token, session, needs_analysis) = {
            let mut current = inner.current.lock().await;
            if let Some(job) = current.as_ref() {
                return Err(CardsmithError::GenerationInProgress {
                    request_id: job.request.id.clone(),
                });
            }
            let (session, needs_analysis) = inner.persistence.take_generation_snapshot().await;
            let request = GenerationRequest::new(inner.config.log_capacity);
            let (request_id, token) = (request.id.clone(), request.token.clone());
            let job = ActiveJob {
                request,
                state: JobState::Preparing,
                session_id: session.id.clone(),
                requested: options.max_cards,
                partial_cards: Vec::new(),
                scarcity: None,
            };
            inner.publish(&job);
            *current = Some(job);
            (request_id, token, session, needs_analysis)
        };
        tracing::info!(
            "[Orchestrator] Starting request {} for session {} ({} chars)",
            request_id,
            session.id,
            content.chars().count()
        );

        let stale_context = needs_analysis || session.document_context.trim().is_empty();
        let (context, analysis_id) = if stale_context && inner.analysis.is_some() {
            inner
                .analyze(&request_id, &token, &session.id, content, &options)
                .await
        } else {
            (session.document_context.clone(), session.analysis_id.clone())
        };

        let cancelled_early = inner
            .with_job(&request_id, |job| {
                if job.request.cancel_phase.is_cancelling() {
                    true
                } else {
                    job.state = JobState::Streaming;
                    job.request.set_stage("Sending to generation service");
                    false
                }
            })
            .await
            .unwrap_or(true);
        if cancelled_early {
            return Ok(inner.finish(&request_id, RunEnd::CancelledEarly).await);
        }

        let job = GenerationJob {
            request_id: request_id.clone(),
            content: content.to_string(),
            context,
            analysis_id,
            options,
            cancellation_token: token.clone(),
        };
        let end = inner.stream(job, &token).await;
        Ok(inner.finish(&request_id, end).await)
    }

    /// Requests cancellation of the running job.
    ///
    /// Returns true when a new cancellation was accepted. Calling again while
    /// cancelling only refreshes the published status. A job that has not
    /// reached the service yet is stopped at once.
    pub async fn cancel(&self) -> bool {
        let inner = &self.inner;
        let mut current = inner.current.lock().await;
        let Some(job) = current.as_mut() else {
            tracing::debug!("[Orchestrator] Cancel requested with no active job");
            return false;
        };
        if job.request.cancel_phase.is_cancelling() {
            inner.notifier.info("Cancellation already in progress");
            inner.publish(job);
            return false;
        }
        if job.state == JobState::Completing {
            tracing::debug!("[Orchestrator] Request {} is already completing", job.request.id);
            return false;
        }

        job.request.cancelled = true;
        job.request.cancel_phase = CancelPhase::Requested;
        let preparing = job.state == JobState::Preparing;
        job.state = JobState::Cancelling;
        job.request.set_stage("Cancelling");

        let request_id = job.request.id.clone();
        if preparing {
            // the service has not seen this request yet
            tracing::info!(
                "[Orchestrator] Cancelling request {} before it was sent",
                request_id
            );
            job.request.token.cancel();
            inner.publish(job);
            return true;
        }
        inner.publish(job);
        tracing::info!("[Orchestrator] Cancelling request {}", request_id);

        let service = inner.service.clone();
        let cancel_id = request_id.clone();
        tokio::spawn(async move {
            if let Err(err) = service.cancel_request(&cancel_id).await {
                tracing::warn!(
                    "[Orchestrator] Cooperative cancel of {} failed: {}",
                    cancel_id,
                    err
                );
            }
        });
        job.request.cancel_phase = CancelPhase::Cooperating;
        inner.publish(job);

        let aborter = self.inner.clone();
        inner
            .hard_abort
            .lock()
            .await
            .schedule(inner.config.hard_abort(), async move {
                aborter.force_abort(&request_id).await;
            });
        true
    }
}

impl OrchestratorInner {
    fn publish(&self, job: &ActiveJob) {
        self.status
            .send_replace(GenerationStatus::from_request(job.state, &job.request));
    }

    /// Runs `update` on the active job if it is still `request_id`, then
    /// publishes the new status.
    async fn with_job<R>(
        &self,
        request_id: &str,
        update: impl FnOnce(&mut ActiveJob) -> R,
    ) -> Option<R> {
        let mut current = self.current.lock().await;
        let job = current.as_mut().filter(|job| job.request.id == request_id)?;
        let result = update(job);
        self.publish(job);
        Some(result)
    }

    fn apply_defaults(&self, mut options: GenerationOptions) -> GenerationOptions {
        if options.model.is_none() {
            options.model = self.config.default_model.clone();
        }
        if options.deck_names.is_empty() {
            options.deck_names.push(self.config.default_deck.clone());
        }
        options
    }

    /// Fills the session's document context from the analysis service.
    ///
    /// Failures only cost the context; generation goes ahead without it.
    async fn analyze(
        &self,
        request_id: &str,
        token: &CancellationToken,
        session_id: &str,
        content: &str,
        options: &GenerationOptions,
    ) -> (String, Option<String>) {
        let Some(analysis) = &self.analysis else {
            return (String::new(), None);
        };
        self.with_job(request_id, |job| job.request.set_stage("Analyzing document"))
            .await;

        let result = tokio::select! {
            _ = token.cancelled() => {
                self.persistence.mark_needs_analysis(session_id).await;
                return (String::new(), None);
            }
            result = analysis.analyze(content, options.analysis_model.as_deref()) => result,
        };
        match result {
            Ok(result) => {
                tracing::info!(
                    "[Orchestrator] Analysis {} attached to session {}",
                    result.analysis_id,
                    session_id
                );
                self.persistence
                    .update_session(session_id, |session| {
                        session.document_context = result.summary.clone();
                        session.analysis_id = Some(result.analysis_id.clone());
                    })
                    .await;
                (result.summary, Some(result.analysis_id))
            }
            Err(err) => {
                tracing::warn!("[Orchestrator] Analysis failed: {}", err);
                self.persistence.mark_needs_analysis(session_id).await;
                self.notifier.warning(format!(
                    "Document analysis failed, generating without context: {err}"
                ));
                (String::new(), None)
            }
        }
    }

    /// Drives the service call, folding stage events in emission order.
    async fn stream(&self, job: GenerationJob, token: &CancellationToken) -> RunEnd {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let sink = StageSink::new(job.request_id.clone(), sender);
        let mut generation = self.service.generate(job, sink);

        let returned = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break None,
                Some(envelope) = receiver.recv() => self.handle_envelope(envelope).await,
                result = &mut generation => break Some(result),
            }
        };
        drop(generation);

        match returned {
            Some(result) => {
                // events emitted right before the service returned
                while let Ok(envelope) = receiver.try_recv() {
                    self.handle_envelope(envelope).await;
                }
                RunEnd::Returned(result)
            }
            None => RunEnd::Forced,
        }
    }

    async fn handle_envelope(&self, envelope: StageEnvelope) {
        let event = StageEvent::from_raw(&envelope.event);
        let mut current = self.current.lock().await;
        let Some(job) = current
            .as_mut()
            .filter(|job| job.request.id == envelope.request_id)
        else {
            tracing::debug!(
                "[Orchestrator] Dropping '{}' for stale request {}",
                envelope.event.stage,
                envelope.request_id
            );
            return;
        };

        let phase = job.request.cancel_phase;
        if phase == CancelPhase::Forced
            || (phase.is_cancelling() && !event.relevant_while_cancelling())
        {
            tracing::debug!(
                "[Orchestrator] Ignoring '{}' after cancellation of {}",
                envelope.event.stage,
                envelope.request_id
            );
            return;
        }

        job.request.apply(&event);
        match &event {
            StageEvent::Parsed { cards, .. } => job.partial_cards.extend(cards.iter().cloned()),
            StageEvent::Error {
                recommended_max, ..
            } if event.is_content_scarcity() => {
                job.scarcity = Some(Scarcity {
                    recommended_max: *recommended_max,
                });
            }
            StageEvent::Warning { message } => self.notifier.warning(message.clone()),
            StageEvent::Unknown { stage, .. } => {
                tracing::debug!("[Orchestrator] Unknown stage '{}'", stage);
            }
            _ => {}
        }
        self.publish(job);
    }

    async fn force_abort(&self, request_id: &str) {
        let mut current = self.current.lock().await;
        let Some(job) = current
            .as_mut()
            .filter(|job| job.request.id == request_id)
        else {
            return;
        };
        if job.request.cancel_phase != CancelPhase::Cooperating {
            return;
        }
        tracing::warn!(
            "[Orchestrator] Service did not acknowledge cancel of {} within {}s, aborting",
            request_id,
            self.config.hard_abort_secs
        );
        job.request.cancel_phase = CancelPhase::Forced;
        job.request.set_stage("Aborting");
        job.request.token.cancel();
        self.publish(job);
    }

    /// Settles the job, applies its cards and frees the single-flight slot.
    async fn finish(&self, request_id: &str, end: RunEnd) -> GenerationOutcome {
        let finishing = self
            .with_job(request_id, |job| {
                job.state = JobState::Completing;
                job.request.set_stage("Completing");
                Finishing {
                    session_id: job.session_id.clone(),
                    requested: job.requested,
                    partial_cards: std::mem::take(&mut job.partial_cards),
                    scarcity: job.scarcity.take(),
                    phase: job.request.cancel_phase,
                }
            })
            .await;
        self.hard_abort.lock().await.cancel();

        let outcome = match finishing {
            Some(finishing) => self.settle(request_id.to_string(), finishing, end).await,
            None => GenerationOutcome::Failed {
                request_id: request_id.to_string(),
                message: "Generation state was lost".to_string(),
                preserved: 0,
            },
        };

        let mut current = self.current.lock().await;
        if let Some(mut job) = current.take_if(|job| job.request.id == request_id) {
            job.state = outcome.state();
            job.request.set_stage(final_label(&outcome));
            self.publish(&job);
        }
        tracing::info!(
            "[Orchestrator] Request {} finished: {}",
            request_id,
            final_label(&outcome)
        );
        outcome
    }

    async fn settle(
        &self,
        request_id: String,
        finishing: Finishing,
        end: RunEnd,
    ) -> GenerationOutcome {
        let Finishing {
            session_id,
            requested,
            partial_cards,
            scarcity,
            phase,
        } = finishing;

        let returned = match end {
            RunEnd::Forced => {
                return self
                    .keep_cancelled(request_id, &session_id, partial_cards, true)
                    .await;
            }
            RunEnd::CancelledEarly => {
                return self
                    .keep_cancelled(request_id, &session_id, partial_cards, false)
                    .await;
            }
            RunEnd::Returned(result) => result,
        };

        if let Some(scarcity) = scarcity {
            return self.scarce(request_id, scarcity.recommended_max);
        }
        let forced = phase == CancelPhase::Forced;
        match returned {
            Err(CardsmithError::ContentScarcity {
                recommended_max, ..
            }) => self.scarce(request_id, recommended_max),
            Ok(cards) if phase.is_cancelling() => {
                let kept = if cards.is_empty() { partial_cards } else { cards };
                self.keep_cancelled(request_id, &session_id, kept, forced)
                    .await
            }
            Err(err) if phase.is_cancelling() || err.is_aborted() => {
                tracing::debug!("[Orchestrator] Request {} aborted: {}", request_id, err);
                self.keep_cancelled(request_id, &session_id, partial_cards, forced)
                    .await
            }
            Ok(cards) => self.complete(request_id, &session_id, cards, requested).await,
            Err(err) => self.fail(request_id, &session_id, &err, partial_cards).await,
        }
    }

    async fn complete(
        &self,
        request_id: String,
        session_id: &str,
        cards: Vec<Card>,
        requested: Option<u32>,
    ) -> GenerationOutcome {
        let appended = match self.persistence.append_cards(session_id, cards).await {
            Ok(appended) => appended,
            Err(err) => {
                tracing::error!("[Orchestrator] Could not store generated cards: {}", err);
                let message = format!("Generated cards could not be saved: {err}");
                self.notifier.error(message.clone());
                return GenerationOutcome::Failed {
                    request_id,
                    message,
                    preserved: 0,
                };
            }
        };

        let outcome = GenerationOutcome::Completed {
            request_id,
            appended,
            requested,
        };
        match requested {
            _ if appended == 0 => self.notifier.warning("The service returned no cards"),
            Some(requested) if outcome.is_partial_success() => self.notifier.warning(format!(
                "Generated {appended} of {requested} requested cards"
            )),
            _ => self.notifier.success(format!("Generated {appended} cards")),
        }
        outcome
    }

    async fn keep_cancelled(
        &self,
        request_id: String,
        session_id: &str,
        cards: Vec<Card>,
        forced: bool,
    ) -> GenerationOutcome {
        let preserved = self.preserve(session_id, cards).await;
        if preserved > 0 {
            self.notifier.info(format!(
                "Generation cancelled. Kept {preserved} cards produced before the cancel."
            ));
        } else {
            self.notifier.info("Generation cancelled");
        }
        GenerationOutcome::Cancelled {
            request_id,
            preserved,
            forced,
        }
    }

    fn scarce(&self, request_id: String, recommended_max: Option<u32>) -> GenerationOutcome {
        match recommended_max {
            Some(max) => self.notifier.warning(format!(
                "Not enough content for that many cards. Try at most {max} cards or add more text."
            )),
            None => self
                .notifier
                .warning("Not enough content for that many cards. Add more text."),
        }
        GenerationOutcome::ContentScarcity {
            request_id,
            recommended_max,
        }
    }

    async fn fail(
        &self,
        request_id: String,
        session_id: &str,
        err: &CardsmithError,
        partial_cards: Vec<Card>,
    ) -> GenerationOutcome {
        tracing::error!("[Orchestrator] Request {} failed: {}", request_id, err);
        let message = describe_failure(err);
        let preserved = self.preserve(session_id, partial_cards).await;
        if preserved > 0 {
            self.notifier.error(format!(
                "{message} ({preserved} cards produced before the failure were kept)"
            ));
        } else {
            self.notifier.error(message.clone());
        }
        GenerationOutcome::Failed {
            request_id,
            message,
            preserved,
        }
    }

    /// Appends partial output, reporting instead of failing.
    async fn preserve(&self, session_id: &str, cards: Vec<Card>) -> usize {
        match self.persistence.append_cards(session_id, cards).await {
            Ok(appended) => appended,
            Err(err) => {
                tracing::error!("[Orchestrator] Could not keep partial cards: {}", err);
                self.notifier
                    .error(format!("Partial cards could not be saved: {err}"));
                0
            }
        }
    }
}

fn final_label(outcome: &GenerationOutcome) -> String {
    match outcome {
        GenerationOutcome::Completed { appended, .. } => format!("Generated {appended} cards"),
        GenerationOutcome::Cancelled { preserved, .. } => {
            format!("Cancelled ({preserved} cards kept)")
        }
        GenerationOutcome::ContentScarcity { .. } => "Not enough content".to_string(),
        GenerationOutcome::Failed { message, .. } => message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Notification, NotificationLevel};
    use crate::session::shared_state;
    use async_trait::async_trait;
    use cardsmith_core::config::PersistenceConfig;
    use cardsmith_core::generation::{AnalysisResult, RawStageEvent};
    use cardsmith_core::session::{KeyValueStore, SESSIONS_KEY, Session};
    use cardsmith_infrastructure::InMemoryKeyValueStore;
    use cardsmith_infrastructure::dto::decode_sessions;
    use serde_json::{Value, json};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::{Notify, broadcast};

    // ============================================================================
    // Mock collaborators
    // ============================================================================

    #[derive(Clone)]
    enum Step {
        Emit(&'static str, Value),
        /// Emits an event tagged with another request's id.
        EmitForeign(&'static str, Value),
        /// Waits until `cancel_request` was called.
        AwaitCancel,
        /// Waits until the test releases the service.
        AwaitRelease,
        /// Never returns on its own; only the cancellation token ends it.
        Hang,
    }

    struct ScriptedService {
        steps: Vec<Step>,
        result: Result<Vec<Card>>,
        cancel_signal: Notify,
        release: Notify,
        cancel_calls: StdMutex<Vec<String>>,
        jobs: StdMutex<Vec<GenerationJob>>,
    }

    impl ScriptedService {
        fn new(steps: Vec<Step>, result: Result<Vec<Card>>) -> Self {
            Self {
                steps,
                result,
                cancel_signal: Notify::new(),
                release: Notify::new(),
                cancel_calls: StdMutex::new(Vec::new()),
                jobs: StdMutex::new(Vec::new()),
            }
        }

        fn cancel_calls(&self) -> usize {
            self.cancel_calls.lock().unwrap().len()
        }

        fn last_job(&self) -> GenerationJob {
            self.jobs.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn generate(&self, job: GenerationJob, sink: StageSink) -> Result<Vec<Card>> {
            self.jobs.lock().unwrap().push(job.clone());
            for step in &self.steps {
                match step {
                    Step::Emit(stage, data) => {
                        sink.emit(RawStageEvent::new(*stage, data.clone()));
                    }
                    Step::EmitForeign(stage, data) => {
                        sink.forward(StageEnvelope {
                            request_id: "previous-request".to_string(),
                            event: RawStageEvent::new(*stage, data.clone()),
                        });
                    }
                    Step::AwaitCancel => self.cancel_signal.notified().await,
                    Step::AwaitRelease => self.release.notified().await,
                    Step::Hang => {
                        job.cancellation_token.cancelled().await;
                        return Err(CardsmithError::aborted("transport dropped"));
                    }
                }
            }
            self.result.clone()
        }

        async fn cancel_request(&self, request_id: &str) -> Result<()> {
            self.cancel_calls.lock().unwrap().push(request_id.to_string());
            self.cancel_signal.notify_one();
            Ok(())
        }
    }

    struct StaticAnalysis(Result<AnalysisResult>);

    #[async_trait]
    impl AnalysisService for StaticAnalysis {
        async fn analyze(&self, _text: &str, _model: Option<&str>) -> Result<AnalysisResult> {
            self.0.clone()
        }
    }

    /// Numbers each analysis so tests can tell which one a job carried.
    #[derive(Default)]
    struct CountingAnalysis {
        calls: StdMutex<usize>,
    }

    impl CountingAnalysis {
        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl AnalysisService for CountingAnalysis {
        async fn analyze(&self, _text: &str, _model: Option<&str>) -> Result<AnalysisResult> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            Ok(AnalysisResult {
                summary: format!("Summary {calls}"),
                analysis_id: format!("an-{calls}"),
            })
        }
    }

    /// An analysis that never answers.
    struct PendingAnalysis;

    #[async_trait]
    impl AnalysisService for PendingAnalysis {
        async fn analyze(&self, _text: &str, _model: Option<&str>) -> Result<AnalysisResult> {
            std::future::pending().await
        }
    }

    struct Harness {
        orchestrator: GenerationOrchestrator,
        persistence: SessionPersistenceManager,
        store: InMemoryKeyValueStore,
        service: Arc<ScriptedService>,
        notifications: broadcast::Receiver<Notification>,
    }

    fn harness_with(service: ScriptedService, analysis: Option<Arc<dyn AnalysisService>>) -> Harness {
        let mut session = Session::new();
        session.raw_text = "Mitochondria produce ATP.".to_string();
        let store = InMemoryKeyValueStore::new();
        let notifier = Notifier::default();
        let notifications = notifier.subscribe();
        let persistence = SessionPersistenceManager::new(
            shared_state(session, 50),
            Arc::new(store.clone()),
            PersistenceConfig::default(),
            notifier.clone(),
        );
        let service = Arc::new(service);
        let orchestrator = GenerationOrchestrator::new(
            service.clone(),
            analysis,
            persistence.clone(),
            notifier,
            GenerationConfig::default(),
        );
        Harness {
            orchestrator,
            persistence,
            store,
            service,
            notifications,
        }
    }

    fn harness(service: ScriptedService) -> Harness {
        harness_with(service, None)
    }

    fn cards(n: usize) -> Vec<Card> {
        (0..n)
            .map(|i| Card::new(format!("Q{i}"), format!("A{i}")))
            .collect()
    }

    fn parsed(n: usize) -> Step {
        Step::Emit("parsed", json!({ "count": n, "cards": cards(n) }))
    }

    fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
        let mut received = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            received.push(notification);
        }
        received
    }

    async fn session_cards(h: &Harness) -> Vec<Card> {
        h.persistence.active_session().await.cards
    }

    async fn wait_for_progress(h: &Harness, progress: u8) {
        let mut status = h.orchestrator.status();
        status
            .wait_for(|status| status.progress >= progress)
            .await
            .unwrap();
    }

    // ============================================================================
    // Tests
    // ============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_appends_cards_and_autosaves() {
        let h = harness(ScriptedService::new(
            vec![
                Step::Emit("started", json!(null)),
                parsed(3),
                Step::Emit("done", json!({ "total": 3 })),
            ],
            Ok(cards(3)),
        ));

        let outcome = h
            .orchestrator
            .start("Mitochondria produce ATP.", GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.cards_added(), 3);
        assert!(matches!(outcome, GenerationOutcome::Completed { .. }));
        assert_eq!(h.service.last_job().content, "Mitochondria produce ATP.");
        assert_eq!(session_cards(&h).await.len(), 3);

        let status = h.orchestrator.current_status();
        assert_eq!(status.progress, 100);
        assert_eq!(status.state, JobState::Idle);
        assert!(!h.orchestrator.is_running().await);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(h.store.write_count(SESSIONS_KEY).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_defaults_fill_deck_and_trimmed_content() {
        let h = harness(ScriptedService::new(vec![], Ok(cards(1))));

        h.orchestrator
            .start("  text  ", GenerationOptions::default())
            .await
            .unwrap();

        let job = h.service.last_job();
        assert_eq!(job.content, "text");
        assert_eq!(
            job.options.deck_names,
            vec![cardsmith_core::card::DEFAULT_DECK.to_string()]
        );
        assert!(!job.cancellation_token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_success_warns() {
        let mut h = harness(ScriptedService::new(vec![parsed(3)], Ok(cards(3))));

        let outcome = h
            .orchestrator
            .start("text", GenerationOptions::default().with_max_cards(5))
            .await
            .unwrap();

        assert!(outcome.is_partial_success());
        let notifications = drain(&mut h.notifications);
        assert!(notifications.iter().any(|n| n.level == NotificationLevel::Warning
            && n.message.contains("3 of 5")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_content_creates_no_job() {
        let h = harness(ScriptedService::new(vec![], Ok(cards(1))));

        let err = h
            .orchestrator
            .start("   \n ", GenerationOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, CardsmithError::EmptyContent);
        assert!(h.service.jobs.lock().unwrap().is_empty());
        assert_eq!(h.orchestrator.current_status().request_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_resolution_is_refused() {
        let h = harness(ScriptedService::new(vec![], Ok(cards(1))));
        let resolved = cardsmith_core::resolver::ContentResolver::default()
            .resolve(&cardsmith_core::resolver::TextSnapshot::default());

        let err = h
            .orchestrator
            .start_resolved(resolved, GenerationOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, CardsmithError::EmptyContent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected_while_running() {
        let h = harness(ScriptedService::new(
            vec![Step::Emit("started", json!(null)), Step::AwaitCancel],
            Ok(Vec::new()),
        ));
        let orchestrator = h.orchestrator.clone();
        let running = tokio::spawn(async move {
            orchestrator
                .start("first", GenerationOptions::default())
                .await
        });
        wait_for_progress(&h, 5).await;

        let err = h
            .orchestrator
            .start("second", GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CardsmithError::GenerationInProgress { .. }));

        assert!(h.orchestrator.cancel().await);
        let outcome = running.await.unwrap().unwrap();
        assert!(matches!(outcome, GenerationOutcome::Cancelled { forced: false, .. }));
        assert_eq!(h.service.jobs.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_scarcity_appends_nothing() {
        let mut h = harness(ScriptedService::new(
            vec![
                Step::Emit("started", json!(null)),
                parsed(2),
                Step::Emit(
                    "error",
                    json!({ "kind": "content_scarcity", "recommended_max": 4 }),
                ),
            ],
            Err(CardsmithError::ContentScarcity {
                message: "too short".to_string(),
                recommended_max: Some(4),
            }),
        ));

        let outcome = h
            .orchestrator
            .start("short text", GenerationOptions::default().with_max_cards(20))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            GenerationOutcome::ContentScarcity {
                request_id: outcome.request_id().to_string(),
                recommended_max: Some(4),
            }
        );
        assert!(session_cards(&h).await.is_empty());
        assert_eq!(h.orchestrator.current_status().state, JobState::Failed);
        let notifications = drain(&mut h.notifications);
        assert!(notifications.iter().any(|n| n.level == NotificationLevel::Warning
            && n.message.contains("at most 4")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooperative_cancel_keeps_returned_cards() {
        let h = harness(ScriptedService::new(
            vec![
                parsed(3),
                Step::AwaitCancel,
                Step::Emit("cancelled", json!({ "partialCount": 3 })),
            ],
            Ok(cards(3)),
        ));
        let orchestrator = h.orchestrator.clone();
        let running =
            tokio::spawn(async move { orchestrator.start("text", GenerationOptions::default()).await });
        wait_for_progress(&h, 30).await;

        assert!(h.orchestrator.cancel().await);
        let outcome = running.await.unwrap().unwrap();

        assert_eq!(
            outcome,
            GenerationOutcome::Cancelled {
                request_id: outcome.request_id().to_string(),
                preserved: 3,
                forced: false,
            }
        );
        assert_eq!(session_cards(&h).await.len(), 3);
        let status = h.orchestrator.current_status();
        assert_eq!(status.state, JobState::Cancelled);
        assert!(status.log.iter().any(|line| line.contains("Cancelled with 3")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_abort_after_grace_period_keeps_parsed_cards() {
        let h = harness(ScriptedService::new(vec![parsed(2), Step::Hang], Ok(Vec::new())));
        let orchestrator = h.orchestrator.clone();
        let running =
            tokio::spawn(async move { orchestrator.start("text", GenerationOptions::default()).await });
        wait_for_progress(&h, 30).await;

        assert!(h.orchestrator.cancel().await);
        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(
            h.orchestrator.current_status().cancel_phase,
            CancelPhase::Cooperating
        );
        assert!(!running.is_finished());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let outcome = running.await.unwrap().unwrap();

        assert!(matches!(
            outcome,
            GenerationOutcome::Cancelled {
                preserved: 2,
                forced: true,
                ..
            }
        ));
        assert_eq!(session_cards(&h).await, cards(2));
        assert!(h.service.last_job().cancellation_token.is_cancelled());
        assert_eq!(h.service.cancel_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_after_cancel_do_not_add_cards() {
        let h = harness(ScriptedService::new(
            vec![
                parsed(2),
                Step::AwaitCancel,
                Step::Emit("parsed", json!({ "cards": cards(5) })),
                Step::Emit("done", json!({ "total": 7 })),
            ],
            Ok(Vec::new()),
        ));
        let orchestrator = h.orchestrator.clone();
        let running =
            tokio::spawn(async move { orchestrator.start("text", GenerationOptions::default()).await });
        wait_for_progress(&h, 30).await;

        h.orchestrator.cancel().await;
        let outcome = running.await.unwrap().unwrap();

        assert_eq!(outcome.cards_added(), 2);
        assert_eq!(session_cards(&h).await, cards(2));
        assert!(h.orchestrator.current_status().progress < 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_request_events_are_dropped() {
        let h = harness(ScriptedService::new(
            vec![
                Step::EmitForeign("parsed", json!({ "cards": cards(5) })),
                Step::EmitForeign("done", json!({ "total": 5 })),
                parsed(1),
            ],
            Ok(cards(1)),
        ));

        h.orchestrator
            .start("text", GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(session_cards(&h).await.len(), 1);
        let status = h.orchestrator.current_status();
        assert!(!status.log.iter().any(|line| line.contains("Parsed 5")));
        assert!(!status.log.iter().any(|line| line.starts_with("Done")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_keeps_partial_cards() {
        let mut h = harness(ScriptedService::new(
            vec![parsed(2)],
            Err(CardsmithError::transport("connection reset by peer")),
        ));

        let outcome = h
            .orchestrator
            .start("a very long text", GenerationOptions::default())
            .await
            .unwrap();

        match &outcome {
            GenerationOutcome::Failed {
                message, preserved, ..
            } => {
                assert!(message.contains("Shorten the input and retry"));
                assert_eq!(*preserved, 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(session_cards(&h).await.len(), 2);
        assert_eq!(h.orchestrator.current_status().state, JobState::Failed);
        assert!(drain(&mut h.notifications)
            .iter()
            .any(|n| n.level == NotificationLevel::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_cancel_does_not_rearm() {
        let mut h = harness(ScriptedService::new(vec![parsed(1), Step::Hang], Ok(Vec::new())));
        assert!(!h.orchestrator.cancel().await);

        let orchestrator = h.orchestrator.clone();
        let running =
            tokio::spawn(async move { orchestrator.start("text", GenerationOptions::default()).await });
        wait_for_progress(&h, 30).await;

        assert!(h.orchestrator.cancel().await);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!h.orchestrator.cancel().await);

        // the timer armed by the first call still fires at 20s
        tokio::time::sleep(Duration::from_secs(11)).await;
        let outcome = running.await.unwrap().unwrap();
        assert!(matches!(outcome, GenerationOutcome::Cancelled { forced: true, .. }));
        assert_eq!(h.service.cancel_calls(), 1);
        assert!(drain(&mut h.notifications)
            .iter()
            .any(|n| n.message == "Cancellation already in progress"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_fills_document_context() {
        let analysis = StaticAnalysis(Ok(AnalysisResult {
            summary: "Cell biology".to_string(),
            analysis_id: "an-1".to_string(),
        }));
        let h = harness_with(
            ScriptedService::new(vec![], Ok(cards(1))),
            Some(Arc::new(analysis)),
        );

        h.orchestrator
            .start("text", GenerationOptions::default())
            .await
            .unwrap();

        let job = h.service.last_job();
        assert_eq!(job.context, "Cell biology");
        assert_eq!(job.analysis_id.as_deref(), Some("an-1"));
        let session = h.persistence.active_session().await;
        assert_eq!(session.document_context, "Cell biology");
        assert_eq!(session.analysis_id.as_deref(), Some("an-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_analysis_failure_warns_and_continues() {
        let analysis = StaticAnalysis(Err(CardsmithError::service("analysis offline")));
        let mut h = harness_with(
            ScriptedService::new(vec![], Ok(cards(2))),
            Some(Arc::new(analysis)),
        );

        let outcome = h
            .orchestrator
            .start("text", GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.cards_added(), 2);
        assert!(h.service.last_job().context.is_empty());
        assert!(drain(&mut h.notifications)
            .iter()
            .any(|n| n.level == NotificationLevel::Warning && n.message.contains("analysis")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cards_land_in_original_session_after_switch() {
        let h = harness(ScriptedService::new(
            vec![parsed(2), Step::AwaitRelease],
            Ok(cards(2)),
        ));
        let original_id = h.persistence.active_session().await.id;
        let orchestrator = h.orchestrator.clone();
        let running =
            tokio::spawn(async move { orchestrator.start("text", GenerationOptions::default()).await });
        wait_for_progress(&h, 30).await;

        h.persistence.new_session().await.unwrap();
        h.service.release.notify_one();
        let outcome = running.await.unwrap().unwrap();

        assert_eq!(outcome.cards_added(), 2);
        assert!(session_cards(&h).await.is_empty());
        let raw = h.store.get(SESSIONS_KEY).await.unwrap().unwrap();
        let stored = decode_sessions(&raw).unwrap();
        let original = stored.iter().find(|s| s.id == original_id).unwrap();
        assert_eq!(original.cards, cards(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edited_text_is_analyzed_again() {
        let analysis = Arc::new(CountingAnalysis::default());
        let h = harness_with(
            ScriptedService::new(vec![], Ok(cards(1))),
            Some(analysis.clone() as Arc<dyn AnalysisService>),
        );

        h.orchestrator
            .start("Mitochondria produce ATP.", GenerationOptions::default())
            .await
            .unwrap();
        h.orchestrator
            .start("Mitochondria produce ATP.", GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(analysis.calls(), 1);
        assert_eq!(h.service.last_job().analysis_id.as_deref(), Some("an-1"));

        let revolution = "The French Revolution began in 1789.";
        h.persistence.on_text_changed(revolution).await;
        h.orchestrator
            .start(revolution, GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(analysis.calls(), 2);
        let job = h.service.last_job();
        assert_eq!(job.context, "Summary 2");
        assert_eq!(job.analysis_id.as_deref(), Some("an-2"));
        assert_eq!(
            h.persistence.active_session().await.document_context,
            "Summary 2"
        );
        assert!(!h.persistence.state().read().await.needs_analysis);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_analyzing_stops_at_once() {
        let h = harness_with(
            ScriptedService::new(vec![], Ok(cards(1))),
            Some(Arc::new(PendingAnalysis)),
        );
        let orchestrator = h.orchestrator.clone();
        let running =
            tokio::spawn(async move { orchestrator.start("text", GenerationOptions::default()).await });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(h.orchestrator.current_status().state, JobState::Preparing);

        let cancelled_at = tokio::time::Instant::now();
        assert!(h.orchestrator.cancel().await);
        let outcome = running.await.unwrap().unwrap();

        assert!(cancelled_at.elapsed() < Duration::from_secs(1));
        assert!(matches!(
            outcome,
            GenerationOutcome::Cancelled {
                preserved: 0,
                forced: false,
                ..
            }
        ));
        assert_eq!(h.service.cancel_calls(), 0);
        assert!(h.service.jobs.lock().unwrap().is_empty());
        assert_eq!(h.orchestrator.current_status().state, JobState::Cancelled);
        assert!(h.persistence.state().read().await.needs_analysis);
    }
}
