//! Undo/redo history for card-list mutations.
//!
//! Each destructive change to a card list is captured as an invertible
//! [`MutationRecord`]. The history keeps a bounded undo stack and a redo
//! stack that any new mutation invalidates.

use crate::card::Card;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of undo entries kept by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// A card together with the index it occupied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedCard {
    pub index: usize,
    pub card: Card,
}

/// An invertible change to a card list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationRecord {
    /// A single card removed from `index`.
    Delete { index: usize, card: Card },
    /// Several cards removed at once, ordered by ascending index.
    BulkDelete { entries: Vec<IndexedCard> },
    /// The whole list was emptied.
    ClearAll { cards: Vec<Card> },
}

impl MutationRecord {
    /// Removes the card at `index` and records the change.
    ///
    /// Returns `None` (and leaves `cards` untouched) when `index` is out of range.
    pub fn delete(cards: &mut Vec<Card>, index: usize) -> Option<Self> {
        if index >= cards.len() {
            return None;
        }
        let card = cards.remove(index);
        Some(Self::Delete { index, card })
    }

    /// Removes every card at `indices` and records the change.
    ///
    /// Duplicate and out-of-range indices are ignored. Returns `None` when
    /// nothing was removed.
    pub fn delete_many(cards: &mut Vec<Card>, indices: &[usize]) -> Option<Self> {
        let mut indices: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&index| index < cards.len())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        if indices.is_empty() {
            return None;
        }

        let mut entries: Vec<IndexedCard> = indices
            .iter()
            .rev()
            .map(|&index| IndexedCard {
                index,
                card: cards.remove(index),
            })
            .collect();
        entries.reverse();
        Some(Self::BulkDelete { entries })
    }

    /// Empties the list and records the previous contents.
    pub fn clear(cards: &mut Vec<Card>) -> Option<Self> {
        if cards.is_empty() {
            return None;
        }
        Some(Self::ClearAll {
            cards: std::mem::take(cards),
        })
    }

    /// Re-applies the forward change.
    pub fn apply(&self, cards: &mut Vec<Card>) {
        match self {
            Self::Delete { index, .. } => {
                if *index < cards.len() {
                    cards.remove(*index);
                }
            }
            Self::BulkDelete { entries } => {
                // descending, so earlier removals don't shift later indices
                for entry in entries.iter().rev() {
                    if entry.index < cards.len() {
                        cards.remove(entry.index);
                    }
                }
            }
            Self::ClearAll { .. } => cards.clear(),
        }
    }

    /// Applies the inverse change.
    pub fn revert(&self, cards: &mut Vec<Card>) {
        match self {
            Self::Delete { index, card } => {
                let index = (*index).min(cards.len());
                cards.insert(index, card.clone());
            }
            Self::BulkDelete { entries } => {
                // ascending, so each insertion lands at its original index
                for entry in entries {
                    let index = entry.index.min(cards.len());
                    cards.insert(index, entry.card.clone());
                }
            }
            Self::ClearAll { cards: snapshot } => {
                *cards = snapshot.clone();
            }
        }
    }

    /// Short description for logs and notifications.
    pub fn describe(&self) -> String {
        match self {
            Self::Delete { index, .. } => format!("delete card {}", index + 1),
            Self::BulkDelete { entries } => format!("delete {} cards", entries.len()),
            Self::ClearAll { cards } => format!("clear {} cards", cards.len()),
        }
    }
}

/// Paired undo/redo stacks of card mutations.
#[derive(Debug, Clone)]
pub struct MutationHistory {
    undo_stack: VecDeque<MutationRecord>,
    redo_stack: Vec<MutationRecord>,
    capacity: usize,
}

impl MutationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records a new mutation. Drops the oldest entry past capacity and
    /// invalidates the redo stack.
    pub fn push(&mut self, record: MutationRecord) {
        self.undo_stack.push_back(record);
        while self.undo_stack.len() > self.capacity {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Reverts the most recent mutation on `cards`.
    ///
    /// Returns the reverted record, or `None` when there is nothing to undo.
    pub fn undo(&mut self, cards: &mut Vec<Card>) -> Option<&MutationRecord> {
        let record = self.undo_stack.pop_back()?;
        record.revert(cards);
        self.redo_stack.push(record);
        self.redo_stack.last()
    }

    /// Re-applies the most recently undone mutation on `cards`.
    pub fn redo(&mut self, cards: &mut Vec<Card>) -> Option<&MutationRecord> {
        let record = self.redo_stack.pop()?;
        record.apply(cards);
        self.undo_stack.push_back(record);
        self.undo_stack.back()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forgets everything, e.g. when another session becomes active.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for MutationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck(n: usize) -> Vec<Card> {
        (0..n)
            .map(|i| Card::new(format!("Q{i}"), format!("A{i}")))
            .collect()
    }

    #[test]
    fn test_delete_then_undo_reinserts_at_index() {
        let original = deck(5);
        let mut cards = original.clone();
        let mut history = MutationHistory::default();

        let record = MutationRecord::delete(&mut cards, 2).unwrap();
        history.push(record);
        assert_eq!(cards.len(), 4);
        assert_eq!(cards[2].front, "Q3");

        history.undo(&mut cards).unwrap();
        assert_eq!(cards, original);
        assert_eq!(cards[2], Card::new("Q2", "A2"));
    }

    #[test]
    fn test_round_trip_for_every_record_kind() {
        let original = deck(6);

        let mut cards = original.clone();
        let records = [
            MutationRecord::delete(&mut cards.clone(), 4).unwrap(),
            MutationRecord::delete_many(&mut cards.clone(), &[5, 0, 3, 3, 99]).unwrap(),
            MutationRecord::clear(&mut cards.clone()).unwrap(),
        ];

        for record in records {
            cards = original.clone();
            let mut history = MutationHistory::default();
            record.apply(&mut cards);
            let after = cards.clone();
            history.push(record);

            history.undo(&mut cards).unwrap();
            assert_eq!(cards, original);
            history.redo(&mut cards).unwrap();
            assert_eq!(cards, after);
        }
    }

    #[test]
    fn test_bulk_delete_records_ascending_entries() {
        let mut cards = deck(5);
        let record = MutationRecord::delete_many(&mut cards, &[3, 1]).unwrap();

        match &record {
            MutationRecord::BulkDelete { entries } => {
                let indices: Vec<_> = entries.iter().map(|e| e.index).collect();
                assert_eq!(indices, vec![1, 3]);
                assert_eq!(entries[1].card.front, "Q3");
            }
            other => panic!("unexpected record: {other:?}"),
        }
        let fronts: Vec<_> = cards.iter().map(|c| c.front.as_str()).collect();
        assert_eq!(fronts, vec!["Q0", "Q2", "Q4"]);
    }

    #[test]
    fn test_out_of_range_mutations_are_not_recorded() {
        let mut cards = deck(2);
        assert!(MutationRecord::delete(&mut cards, 2).is_none());
        assert!(MutationRecord::delete_many(&mut cards, &[7, 9]).is_none());
        assert!(MutationRecord::clear(&mut Vec::new()).is_none());
        assert_eq!(cards.len(), 2);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut history = MutationHistory::default();
        for i in 0..51 {
            history.push(MutationRecord::Delete {
                index: i,
                card: Card::new(format!("Q{i}"), "A"),
            });
        }
        assert_eq!(history.undo_len(), DEFAULT_HISTORY_CAPACITY);

        // unwind everything: the first record (index 0) must be gone
        let mut cards = Vec::new();
        let mut last_index = None;
        while let Some(record) = history.undo(&mut cards) {
            if let MutationRecord::Delete { index, .. } = record {
                last_index = Some(*index);
            }
        }
        assert_eq!(last_index, Some(1));
    }

    #[test]
    fn test_push_after_undo_clears_redo() {
        let mut cards = deck(3);
        let mut history = MutationHistory::default();
        history.push(MutationRecord::delete(&mut cards, 0).unwrap());
        history.undo(&mut cards);
        assert!(history.can_redo());

        history.push(MutationRecord::delete(&mut cards, 1).unwrap());

        assert!(!history.can_redo());
        assert!(history.redo(&mut cards).is_none());
    }

    #[test]
    fn test_undo_on_shorter_list_clamps_index() {
        let mut cards = deck(3);
        let mut history = MutationHistory::default();
        history.push(MutationRecord::delete(&mut cards, 2).unwrap());
        cards.clear();

        history.undo(&mut cards);

        assert_eq!(cards, vec![Card::new("Q2", "A2")]);
    }
}
