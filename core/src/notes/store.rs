//! Note Store
//!
//! Holds every note the wallet knows about, in insertion order.
//!
//! Invariants kept under the write lock:
//! - commitments are unique
//! - `spent` only ever goes false -> true
//! - `spendable` equals the sum of unspent amounts
//! - the sum of all amounts fits in a `u128`, so balance can never overflow
//!
//! Reads take a short read lock and clone out, so balance queries stay
//! available while a transfer is being proven.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use cipherpay_privacy::{Commitment, Note, NoteValue};
use log::debug;

use crate::error::{Result, WalletError};

#[derive(Default)]
struct Inner {
    notes: Vec<Note>,
    index: HashMap<Commitment, usize>,
    total: NoteValue,
    spendable: NoteValue,
}

impl Inner {
    fn check_new(&self, note: &Note, total: NoteValue) -> Result<NoteValue> {
        if note.commitment.is_empty() {
            return Err(WalletError::Validation("note commitment is empty".into()));
        }
        if note.nullifier.is_empty() {
            return Err(WalletError::Validation("note nullifier is empty".into()));
        }
        if self.index.contains_key(&note.commitment) {
            return Err(WalletError::DuplicateCommitment(note.commitment.clone()));
        }
        total.checked_add(note.amount).ok_or_else(|| {
            WalletError::AmountOverflow(format!(
                "adding {} to wallet total {} overflows",
                note.amount, total
            ))
        })
    }

    fn check_spendable(&self, commitment: &Commitment) -> Result<usize> {
        let idx = *self
            .index
            .get(commitment)
            .ok_or_else(|| WalletError::NoteNotFound(commitment.clone()))?;
        if self.notes[idx].spent {
            return Err(WalletError::AlreadySpent(commitment.clone()));
        }
        Ok(idx)
    }

    fn push(&mut self, note: Note) {
        self.total = NoteValue::new(self.total.as_u128() + note.amount.as_u128());
        if !note.spent {
            self.spendable = NoteValue::new(self.spendable.as_u128() + note.amount.as_u128());
        }
        self.index.insert(note.commitment.clone(), self.notes.len());
        self.notes.push(note);
    }

    fn spend(&mut self, idx: usize) {
        let note = &mut self.notes[idx];
        note.spent = true;
        // spendable >= amount of any unspent note
        self.spendable = NoteValue::new(self.spendable.as_u128() - note.amount.as_u128());
    }
}

/// The wallet's set of shielded notes.
#[derive(Default)]
pub struct NoteStore {
    inner: RwLock<Inner>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a note.
    pub fn add_note(&self, note: Note) -> Result<()> {
        let mut inner = self.write();
        inner.check_new(&note, inner.total)?;
        debug!("Adding note {} ({})", note.commitment, note.amount);
        inner.push(note);
        Ok(())
    }

    /// Unspent notes in insertion order.
    pub fn spendable_notes(&self) -> Vec<Note> {
        self.read()
            .notes
            .iter()
            .filter(|n| n.is_spendable())
            .cloned()
            .collect()
    }

    pub fn all_notes(&self) -> Vec<Note> {
        self.read().notes.clone()
    }

    /// Sum of unspent amounts.
    pub fn balance(&self) -> NoteValue {
        self.read().spendable
    }

    pub fn get(&self, commitment: &Commitment) -> Option<Note> {
        let inner = self.read();
        inner.index.get(commitment).map(|idx| inner.notes[*idx].clone())
    }

    pub fn len(&self) -> usize {
        self.read().notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spendable_count(&self) -> usize {
        self.read().notes.iter().filter(|n| n.is_spendable()).count()
    }

    /// Flag a single note as spent.
    pub fn mark_spent(&self, commitment: &Commitment) -> Result<()> {
        let mut inner = self.write();
        let idx = inner.check_spendable(commitment)?;
        inner.spend(idx);
        debug!("Marked note {} spent", commitment);
        Ok(())
    }

    /// Mark `spent` as spent and append `created`, all or nothing.
    ///
    /// Every precondition is checked before the first mutation, so on error
    /// the store is exactly as it was.
    pub fn apply_settlement(&self, spent: &[Commitment], created: Vec<Note>) -> Result<()> {
        let mut inner = self.write();

        let mut seen = HashSet::with_capacity(spent.len());
        let mut indices = Vec::with_capacity(spent.len());
        for commitment in spent {
            if !seen.insert(commitment) {
                return Err(WalletError::AlreadySpent(commitment.clone()));
            }
            indices.push(inner.check_spendable(commitment)?);
        }

        let mut total = inner.total;
        let mut fresh = HashSet::with_capacity(created.len());
        for note in &created {
            total = inner.check_new(note, total)?;
            if !fresh.insert(&note.commitment) {
                return Err(WalletError::DuplicateCommitment(note.commitment.clone()));
            }
        }

        for idx in indices {
            inner.spend(idx);
        }
        for note in created {
            inner.push(note);
        }
        debug!(
            "Settlement applied: {} spent, balance now {}",
            spent.len(),
            inner.spendable
        );
        Ok(())
    }

    /// Best-effort settlement for a transfer the relay already accepted.
    ///
    /// Spends every input that is still unspent and appends every created
    /// note that fits; returns the commitments that could not be applied.
    pub fn reconcile_settlement(&self, spent: &[Commitment], created: Vec<Note>) -> Vec<Commitment> {
        let mut inner = self.write();
        let mut skipped = Vec::new();

        for commitment in spent {
            match inner.check_spendable(commitment) {
                Ok(idx) => inner.spend(idx),
                Err(_) => skipped.push(commitment.clone()),
            }
        }
        for note in created {
            let total = inner.total;
            match inner.check_new(&note, total) {
                Ok(_) => inner.push(note),
                Err(_) => skipped.push(note.commitment),
            }
        }
        debug!(
            "Settlement reconciled: {} skipped, balance now {}",
            skipped.len(),
            inner.spendable
        );
        skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, amount: u128) -> Note {
        Note::new(
            Commitment::from(id),
            format!("nf-{id}").as_str().into(),
            NoteValue::new(amount),
        )
    }

    fn assert_balance_invariant(store: &NoteStore) {
        let sum: u128 = store
            .spendable_notes()
            .iter()
            .map(|n| n.amount.as_u128())
            .sum();
        assert_eq!(store.balance().as_u128(), sum);
    }

    #[test]
    fn test_add_and_query() {
        let store = NoteStore::new();
        store.add_note(note("0x01", 100)).unwrap();
        store.add_note(note("0x02", 50)).unwrap();

        assert_eq!(store.balance(), NoteValue::new(150));
        assert_eq!(store.len(), 2);
        let ids: Vec<_> = store
            .spendable_notes()
            .into_iter()
            .map(|n| n.commitment)
            .collect();
        assert_eq!(ids, vec![Commitment::from("0x01"), Commitment::from("0x02")]);
        assert_balance_invariant(&store);
    }

    #[test]
    fn test_duplicate_commitment() {
        let store = NoteStore::new();
        store.add_note(note("0x01", 100)).unwrap();
        let err = store.add_note(note("0x01", 7)).unwrap_err();
        assert_eq!(err, WalletError::DuplicateCommitment("0x01".into()));
        assert_eq!(store.balance(), NoteValue::new(100));
    }

    #[test]
    fn test_empty_ids_rejected() {
        let store = NoteStore::new();
        let err = store.add_note(note("", 1)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_overflow_rejected() {
        let store = NoteStore::new();
        store.add_note(note("0x01", u128::MAX)).unwrap();
        let err = store.add_note(note("0x02", 1)).unwrap_err();
        assert!(matches!(err, WalletError::AmountOverflow(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.balance(), NoteValue::MAX);
    }

    #[test]
    fn test_mark_spent_once() {
        let store = NoteStore::new();
        store.add_note(note("0x01", 100)).unwrap();

        store.mark_spent(&"0x01".into()).unwrap();
        assert_eq!(store.balance(), NoteValue::ZERO);
        assert!(store.get(&"0x01".into()).unwrap().spent);

        let err = store.mark_spent(&"0x01".into()).unwrap_err();
        assert_eq!(err, WalletError::AlreadySpent("0x01".into()));
        assert!(store.spendable_notes().is_empty());
        assert_eq!(store.all_notes().len(), 1);
        assert_balance_invariant(&store);
    }

    #[test]
    fn test_mark_spent_unknown() {
        let store = NoteStore::new();
        let err = store.mark_spent(&"0x404".into()).unwrap_err();
        assert_eq!(err, WalletError::NoteNotFound("0x404".into()));
    }

    #[test]
    fn test_settlement_applies_atomically() {
        let store = NoteStore::new();
        store.add_note(note("0x01", 100)).unwrap();
        store.add_note(note("0x02", 50)).unwrap();

        store
            .apply_settlement(&["0x01".into(), "0x02".into()], vec![note("0x03", 30)])
            .unwrap();

        assert_eq!(store.balance(), NoteValue::new(30));
        assert_eq!(store.spendable_count(), 1);
        assert_balance_invariant(&store);
    }

    #[test]
    fn test_settlement_failure_leaves_store_unchanged() {
        let store = NoteStore::new();
        store.add_note(note("0x01", 100)).unwrap();
        store.add_note(note("0x02", 50)).unwrap();
        store.mark_spent(&"0x02".into()).unwrap();
        let before = store.all_notes();

        // second input already spent
        let err = store
            .apply_settlement(&["0x01".into(), "0x02".into()], vec![note("0x03", 30)])
            .unwrap_err();
        assert_eq!(err, WalletError::AlreadySpent("0x02".into()));
        assert_eq!(store.all_notes(), before);

        // change note collides with an existing commitment
        let err = store
            .apply_settlement(&["0x01".into()], vec![note("0x02", 30)])
            .unwrap_err();
        assert_eq!(err, WalletError::DuplicateCommitment("0x02".into()));
        assert_eq!(store.all_notes(), before);

        // same input listed twice
        let err = store
            .apply_settlement(&["0x01".into(), "0x01".into()], vec![])
            .unwrap_err();
        assert_eq!(err, WalletError::AlreadySpent("0x01".into()));
        assert_eq!(store.all_notes(), before);
        assert_balance_invariant(&store);
    }

    #[test]
    fn test_reconcile_applies_what_it_can() {
        let store = NoteStore::new();
        store.add_note(note("0x01", 600)).unwrap();
        store.add_note(note("0x02", 600)).unwrap();
        store.mark_spent(&"0x02".into()).unwrap();

        let skipped = store.reconcile_settlement(
            &["0x01".into(), "0x02".into(), "0x404".into()],
            vec![note("0x03", 200), note("0x01", 5)],
        );

        assert_eq!(
            skipped,
            vec![Commitment::from("0x02"), "0x404".into(), "0x01".into()]
        );
        assert!(store.get(&"0x01".into()).unwrap().spent);
        assert_eq!(store.balance(), NoteValue::new(200));
        assert_eq!(store.len(), 3);
        assert_balance_invariant(&store);
    }
}
