//! Card use case: edits of the active session's card list.
//!
//! Every mutation happens under the shared state lock together with its
//! history record, and schedules a debounced save afterwards.

use crate::session::SessionPersistenceManager;
use cardsmith_core::card::Card;
use cardsmith_core::error::{CardsmithError, Result};
use cardsmith_core::history::MutationRecord;

#[derive(Clone)]
pub struct CardUseCase {
    persistence: SessionPersistenceManager,
}

impl CardUseCase {
    pub fn new(persistence: SessionPersistenceManager) -> Self {
        Self { persistence }
    }

    pub async fn cards(&self) -> Vec<Card> {
        self.persistence.state().read().await.session.cards.clone()
    }

    /// Appends a card and returns its index.
    pub async fn add_card(&self, card: Card) -> usize {
        let index = {
            let mut state = self.persistence.state().write().await;
            state.session.cards.push(card);
            state.session.cards.len() - 1
        };
        self.persistence.schedule_save().await;
        index
    }

    pub async fn update_card(&self, index: usize, card: Card) -> Result<()> {
        {
            let mut state = self.persistence.state().write().await;
            let slot = state
                .session
                .cards
                .get_mut(index)
                .ok_or_else(|| card_not_found(index))?;
            *slot = card;
        }
        self.persistence.schedule_save().await;
        Ok(())
    }

    /// Deletes one card; undoable.
    pub async fn delete_card(&self, index: usize) -> Result<Card> {
        let removed = {
            let mut state = self.persistence.state().write().await;
            let removed = state
                .session
                .cards
                .get(index)
                .cloned()
                .ok_or_else(|| card_not_found(index))?;
            if let Some(record) = MutationRecord::delete(&mut state.session.cards, index) {
                state.history.push(record);
            }
            removed
        };
        self.persistence.schedule_save().await;
        Ok(removed)
    }

    /// Deletes several cards as one undoable step. Returns how many were
    /// removed; out-of-range indices are ignored.
    pub async fn delete_cards(&self, indices: &[usize]) -> usize {
        let removed = {
            let mut state = self.persistence.state().write().await;
            let before = state.session.cards.len();
            if let Some(record) = MutationRecord::delete_many(&mut state.session.cards, indices) {
                state.history.push(record);
            }
            before - state.session.cards.len()
        };
        if removed > 0 {
            self.persistence.schedule_save().await;
        }
        removed
    }

    /// Removes every card as one undoable step.
    pub async fn clear_cards(&self) -> usize {
        let removed = {
            let mut state = self.persistence.state().write().await;
            let count = state.session.cards.len();
            if let Some(record) = MutationRecord::clear(&mut state.session.cards) {
                state.history.push(record);
            }
            count
        };
        if removed > 0 {
            self.persistence.schedule_save().await;
        }
        removed
    }

    /// Reverts the latest mutation. Returns its description.
    pub async fn undo(&self) -> Option<String> {
        let description = {
            let mut guard = self.persistence.state().write().await;
            let state = &mut *guard;
            state
                .history
                .undo(&mut state.session.cards)
                .map(MutationRecord::describe)
        };
        if let Some(description) = &description {
            tracing::debug!("[CardUseCase] Undo: {}", description);
            self.persistence.schedule_save().await;
        }
        description
    }

    /// Re-applies the latest undone mutation. Returns its description.
    pub async fn redo(&self) -> Option<String> {
        let description = {
            let mut guard = self.persistence.state().write().await;
            let state = &mut *guard;
            state
                .history
                .redo(&mut state.session.cards)
                .map(MutationRecord::describe)
        };
        if let Some(description) = &description {
            tracing::debug!("[CardUseCase] Redo: {}", description);
            self.persistence.schedule_save().await;
        }
        description
    }

    pub async fn can_undo(&self) -> bool {
        self.persistence.state().read().await.history.can_undo()
    }

    pub async fn can_redo(&self) -> bool {
        self.persistence.state().read().await.history.can_redo()
    }
}

fn card_not_found(index: usize) -> CardsmithError {
    CardsmithError::not_found("Card", index.to_string())
}
