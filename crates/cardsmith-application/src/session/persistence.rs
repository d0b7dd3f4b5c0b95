//! Session Persistence Manager.
//!
//! Snapshots the active session into the durable store with debounced
//! writes, enforces the session-count cap and the serialized size ceiling,
//! and switches the active session (restore, delete, new, clear).

use super::debounce::DelayedTask;
use super::state::SharedSessionState;
use crate::notification::Notifier;
use cardsmith_core::card::Card;
use cardsmith_core::config::PersistenceConfig;
use cardsmith_core::error::{CardsmithError, Result};
use cardsmith_core::session::{
    ACTIVE_SESSION_KEY, KeyValueStore, PersistedState, SESSIONS_KEY, Session, sort_by_recency,
};
use cardsmith_infrastructure::dto::{decode_active_id, decode_sessions, encode_sessions};
use serde::Serialize;
use std::sync::Arc;
use strum::{AsRefStr, Display};
use tokio::sync::{Mutex, watch};

/// Save indicator shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SaveStatus {
    #[default]
    Idle,
    /// A save is scheduled or running
    Saving,
    /// The last save landed
    Saved,
    /// The last save was rejected or failed
    Failed,
}

struct PersistenceInner {
    state: SharedSessionState,
    store: Arc<dyn KeyValueStore>,
    config: PersistenceConfig,
    notifier: Notifier,
    status: watch::Sender<SaveStatus>,
    save_timer: Mutex<DelayedTask>,
    status_timer: Mutex<DelayedTask>,
    /// Serializes read-modify-write cycles on the stored session list.
    write_lock: Mutex<()>,
}

/// Persists the active session and manages the stored session list.
#[derive(Clone)]
pub struct SessionPersistenceManager {
    inner: Arc<PersistenceInner>,
}

impl SessionPersistenceManager {
    pub fn new(
        state: SharedSessionState,
        store: Arc<dyn KeyValueStore>,
        config: PersistenceConfig,
        notifier: Notifier,
    ) -> Self {
        let (status, _) = watch::channel(SaveStatus::Idle);
        Self {
            inner: Arc::new(PersistenceInner {
                state,
                store,
                config,
                notifier,
                status,
                save_timer: Mutex::new(DelayedTask::new()),
                status_timer: Mutex::new(DelayedTask::new()),
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn state(&self) -> &SharedSessionState {
        &self.inner.state
    }

    /// Subscribes to save status changes.
    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status.subscribe()
    }

    pub fn current_status(&self) -> SaveStatus {
        *self.inner.status.borrow()
    }

    /// Snapshot of the active session.
    pub async fn active_session(&self) -> Session {
        self.inner.state.read().await.session.clone()
    }

    /// Schedules a debounced save of the active session.
    ///
    /// Ignored while a session is being restored.
    pub async fn schedule_save(&self) {
        if self.inner.state.read().await.restoring {
            tracing::debug!("[Persistence] Restoring, save not scheduled");
            return;
        }

        self.inner.status_timer.lock().await.cancel();
        self.inner.status.send_replace(SaveStatus::Saving);

        let inner = self.inner.clone();
        self.inner
            .save_timer
            .lock()
            .await
            .schedule(self.inner.config.debounce(), async move {
                // failures are reported through status and notifications
                let _ = inner.save_and_report().await;
            });
    }

    /// Saves immediately, dropping any pending debounced save.
    pub async fn save_now(&self) -> Result<()> {
        self.inner.save_timer.lock().await.cancel();
        self.inner.status_timer.lock().await.cancel();
        self.inner.status.send_replace(SaveStatus::Saving);
        self.inner.save_and_report().await
    }

    /// Runs a pending debounced save right away, after waiting for one that
    /// already started.
    ///
    /// Returns whether a save was pending.
    pub async fn flush(&self) -> Result<bool> {
        let (running, pending) = {
            let mut timer = self.inner.save_timer.lock().await;
            (timer.take_running(), timer.cancel())
        };
        if let Some(running) = running {
            tracing::debug!("[Persistence] Waiting for in-flight save");
            if let Err(err) = running.await {
                tracing::warn!("[Persistence] In-flight save did not finish: {}", err);
            }
        }
        if pending {
            self.inner.save_and_report().await?;
        }
        Ok(pending)
    }

    /// Loads the stored session list and active pointer.
    pub async fn load_state(&self) -> Result<PersistedState> {
        self.inner.load_state().await
    }

    /// Stored sessions, most recently updated first.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut persisted = self.inner.load_state().await?;
        sort_by_recency(&mut persisted.sessions);
        Ok(persisted.sessions)
    }

    /// Persists the active session, then makes `session_id` active.
    ///
    /// Undo history is cleared. Restoring the already-active session is a
    /// no-op.
    pub async fn restore(&self, session_id: &str) -> Result<Session> {
        {
            let state = self.inner.state.read().await;
            if state.session.id == session_id {
                return Ok(state.session.clone());
            }
        }

        self.inner.save_timer.lock().await.cancel();
        self.inner.persist_active().await?;

        let _guard = self.inner.write_lock.lock().await;
        let persisted = self.inner.load_state().await?;
        let target = persisted
            .find(session_id)
            .cloned()
            .ok_or_else(|| CardsmithError::not_found("Session", session_id))?;

        tracing::info!(
            "[Persistence] Restoring session {} ('{}')",
            target.id,
            target.title
        );
        self.inner.activate(target.clone()).await?;
        Ok(target)
    }

    /// Activates the session recorded as active in the store, falling back
    /// to the most recently updated one. Used at startup.
    pub async fn restore_last_active(&self) -> Result<Option<Session>> {
        let _guard = self.inner.write_lock.lock().await;
        let persisted = self.inner.load_state().await?;
        let target = persisted
            .active_session_id
            .as_deref()
            .and_then(|id| persisted.find(id))
            .or_else(|| persisted.most_recent())
            .cloned();

        match target {
            Some(session) => {
                tracing::info!("[Persistence] Restored last active session {}", session.id);
                self.inner.activate(session.clone()).await?;
                Ok(Some(session))
            }
            None => {
                tracing::debug!("[Persistence] No stored sessions to restore");
                Ok(None)
            }
        }
    }

    /// Deletes a stored session.
    ///
    /// When the active session is deleted, the most recently updated
    /// remaining session becomes active, or an empty workspace if none is
    /// left. Confirmation is the caller's job.
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.write_lock.lock().await;
        let mut persisted = inner.load_state().await?;
        let removed = persisted.remove(session_id).is_some();
        let is_active = inner.state.read().await.session.id == session_id;

        if !removed && !is_active {
            return Err(CardsmithError::not_found("Session", session_id));
        }

        if is_active {
            inner.save_timer.lock().await.cancel();
            let next = persisted.most_recent().cloned();
            persisted.active_session_id = next.as_ref().map(|s| s.id.clone());
            inner.begin_restore(next.unwrap_or_default()).await;
            let result = inner.write_state(&mut persisted).await;
            inner.end_restore().await;
            result?;
        } else {
            if persisted.active_session_id.as_deref() == Some(session_id) {
                persisted.active_session_id = None;
            }
            inner.write_state(&mut persisted).await?;
        }

        tracing::info!("[Persistence] Deleted session {}", session_id);
        Ok(())
    }

    /// Removes every stored session and starts an empty workspace.
    pub async fn clear_all(&self) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.write_lock.lock().await;
        inner.save_timer.lock().await.cancel();

        inner.begin_restore(Session::new()).await;
        let result = async {
            inner.store.remove(SESSIONS_KEY).await?;
            inner.store.remove(ACTIVE_SESSION_KEY).await
        }
        .await;
        inner.end_restore().await;
        result?;

        inner.notifier.info("All sessions cleared");
        Ok(())
    }

    /// Persists the active session and replaces it with a fresh one.
    ///
    /// The fresh session is not stored until it has content.
    pub async fn new_session(&self) -> Result<Session> {
        self.inner.save_timer.lock().await.cancel();
        self.inner.persist_active().await?;

        let session = Session::new();
        self.inner.begin_restore(session.clone()).await;
        self.inner.end_restore().await;
        tracing::info!("[Persistence] Started new session {}", session.id);
        Ok(session)
    }

    /// Records an edit of the raw text and schedules a save.
    pub async fn on_text_changed(&self, text: impl Into<String>) {
        let restoring = {
            let mut state = self.inner.state.write().await;
            state.session.set_raw_text(text);
            if !state.restoring {
                state.needs_analysis = true;
            }
            state.restoring
        };
        if !restoring {
            self.schedule_save().await;
        }
    }

    /// Snapshot of the active session for a generation run, with whether
    /// its text changed since the last analysis. The flag is cleared;
    /// [`Self::mark_needs_analysis`] raises it again when the analysis does
    /// not land.
    pub async fn take_generation_snapshot(&self) -> (Session, bool) {
        let mut state = self.inner.state.write().await;
        let needs_analysis = std::mem::take(&mut state.needs_analysis);
        (state.session.clone(), needs_analysis)
    }

    pub async fn mark_needs_analysis(&self, session_id: &str) {
        let mut state = self.inner.state.write().await;
        if state.session.id == session_id {
            state.needs_analysis = true;
        }
    }

    /// Applies `update` to the active session if it is `session_id`, then
    /// schedules a save. Returns whether the session was active.
    pub async fn update_session<F>(&self, session_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let updated = {
            let mut state = self.inner.state.write().await;
            if state.session.id == session_id {
                update(&mut state.session);
                true
            } else {
                false
            }
        };
        if updated {
            self.schedule_save().await;
        }
        updated
    }

    /// Appends cards to `session_id`, whether it is still active or has
    /// been replaced in the meantime.
    pub async fn append_cards(&self, session_id: &str, cards: Vec<Card>) -> Result<usize> {
        let count = cards.len();
        if count == 0 {
            return Ok(0);
        }

        let mut pending = Some(cards);
        self.update_session(session_id, |session| {
            if let Some(cards) = pending.take() {
                session.cards.extend(cards);
            }
        })
        .await;
        let Some(cards) = pending else {
            return Ok(count);
        };

        let _guard = self.inner.write_lock.lock().await;
        let mut persisted = self.inner.load_state().await?;
        let stored = persisted
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| CardsmithError::not_found("Session", session_id))?;
        stored.cards.extend(cards);
        stored.touch();
        self.inner.write_state(&mut persisted).await?;

        tracing::info!(
            "[Persistence] Appended {} cards to inactive session {}",
            count,
            session_id
        );
        Ok(count)
    }
}

impl PersistenceInner {
    async fn save_and_report(self: &Arc<Self>) -> Result<()> {
        let result = self.persist_active().await;
        let status = match &result {
            Ok(true) => SaveStatus::Saved,
            Ok(false) => SaveStatus::Idle,
            Err(err) => {
                if !err.is_quota_exceeded() {
                    self.notifier
                        .error(format!("Failed to save session: {err}"));
                }
                SaveStatus::Failed
            }
        };
        self.status.send_replace(status);

        if status != SaveStatus::Idle {
            let inner = self.clone();
            self.status_timer
                .lock()
                .await
                .schedule(self.config.saved_status(), async move {
                    inner.status.send_if_modified(|status| {
                        if matches!(status, SaveStatus::Saved | SaveStatus::Failed) {
                            *status = SaveStatus::Idle;
                            true
                        } else {
                            false
                        }
                    });
                });
        }

        result.map(|_| ())
    }

    /// Writes the active session into the stored list.
    ///
    /// Returns false when the session was blank and nothing was written.
    async fn persist_active(&self) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let mut state = self.state.write().await;
            if state.session.is_blank() {
                tracing::debug!(
                    "[Persistence] Session {} is blank, skipping save",
                    state.session.id
                );
                return Ok(false);
            }
            state.session.touch();
            state.session.clone()
        };

        let mut persisted = self.load_state().await?;
        persisted.active_session_id = Some(snapshot.id.clone());
        persisted.upsert(snapshot);
        self.write_state(&mut persisted).await?;
        Ok(true)
    }

    async fn load_state(&self) -> Result<PersistedState> {
        let sessions = match self.store.get(SESSIONS_KEY).await? {
            Some(raw) if !raw.trim().is_empty() => match decode_sessions(&raw) {
                Ok(sessions) => sessions,
                Err(err) => {
                    tracing::warn!("[Persistence] Stored session list is unreadable: {}", err);
                    self.notifier
                        .warning("Saved sessions could not be read and were ignored");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };
        let active_session_id = self
            .store
            .get(ACTIVE_SESSION_KEY)
            .await?
            .and_then(|raw| decode_active_id(&raw));

        Ok(PersistedState::new(sessions, active_session_id))
    }

    /// Caps, size-checks and writes the session list. The store is left
    /// untouched when the size check fails.
    async fn write_state(&self, persisted: &mut PersistedState) -> Result<()> {
        let evicted = persisted.enforce_cap(self.config.max_sessions);
        if !evicted.is_empty() {
            tracing::info!(
                "[Persistence] Evicted {} sessions over the cap of {}",
                evicted.len(),
                self.config.max_sessions
            );
        }

        let encoded = encode_sessions(&persisted.sessions)?;
        let size = encoded.chars().count();
        let limit = self.config.max_serialized_chars;
        if size > limit {
            self.notifier.warning(format!(
                "Sessions were not saved: {size} characters exceeds the {limit} character limit. \
                 Delete older sessions or shorten the text."
            ));
            return Err(CardsmithError::QuotaExceeded { size, limit });
        }

        self.store.set(SESSIONS_KEY, &encoded).await?;
        match &persisted.active_session_id {
            Some(id) => self.store.set(ACTIVE_SESSION_KEY, id).await?,
            None => self.store.remove(ACTIVE_SESSION_KEY).await?,
        }
        tracing::debug!(
            "[Persistence] Wrote {} sessions ({} chars)",
            persisted.sessions.len(),
            size
        );
        Ok(())
    }

    /// Makes `session` active and records it as such. Caller holds the
    /// write lock.
    async fn activate(&self, session: Session) -> Result<()> {
        let session_id = session.id.clone();
        self.begin_restore(session).await;
        let result = self.store.set(ACTIVE_SESSION_KEY, &session_id).await;
        self.end_restore().await;
        result
    }

    /// Swaps the in-memory session and raises the restoring guard.
    async fn begin_restore(&self, session: Session) {
        let mut state = self.state.write().await;
        state.restoring = true;
        state.session = session;
        state.history.clear();
        state.needs_analysis = false;
    }

    async fn end_restore(&self) {
        self.state.write().await.restoring = false;
    }
}
