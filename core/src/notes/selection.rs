//! Input-note selection and in-flight reservations.
//!
//! A transfer reserves the notes it selected until it is submitted or
//! abandoned. Selection only considers unreserved notes, so two transfers
//! prepared concurrently never pick the same input.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use cipherpay_config::SelectionPolicy;
use cipherpay_privacy::{Commitment, Note, NoteValue};

use crate::error::{Result, WalletError};

/// Notes chosen to cover an amount.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub notes: Vec<Note>,
    pub total: NoteValue,
}

impl Selection {
    /// Value returned to the sender.
    pub fn change(&self, amount: NoteValue) -> NoteValue {
        self.total.checked_sub(amount).unwrap_or(NoteValue::ZERO)
    }
}

/// Pick notes covering `amount` from `candidates` (given in insertion order).
///
/// Returns `None` when the candidates cannot cover the amount.
pub fn select_notes(
    candidates: &[Note],
    amount: NoteValue,
    policy: SelectionPolicy,
) -> Option<Selection> {
    let mut ordered: Vec<&Note> = candidates.iter().filter(|n| n.is_spendable()).collect();
    if policy == SelectionPolicy::LargestFirst {
        // stable sort keeps insertion order among equal amounts
        ordered.sort_by(|a, b| b.amount.cmp(&a.amount));
    }

    let mut notes = Vec::new();
    let mut total = NoteValue::ZERO;
    for note in ordered {
        if total >= amount && !notes.is_empty() {
            break;
        }
        total = total.checked_add(note.amount)?;
        notes.push(note.clone());
    }

    (total >= amount && !notes.is_empty()).then_some(Selection { notes, total })
}

/// Commitments currently held by prepared transfers.
#[derive(Clone, Default)]
pub struct ReservationLedger {
    reserved: Arc<Mutex<HashSet<Commitment>>>,
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Commitment>> {
        self.reserved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_reserved(&self, commitment: &Commitment) -> bool {
        self.lock().contains(commitment)
    }

    pub fn reserved_count(&self) -> usize {
        self.lock().len()
    }

    /// Whether `reservation` was taken from this ledger.
    pub fn owns(&self, reservation: &NoteReservation) -> bool {
        Arc::ptr_eq(&self.reserved, &reservation.ledger.reserved)
    }

    /// Run `f` on `commitment` while no transfer can reserve it.
    ///
    /// Fails with `Validation` if a pending transfer already holds the note.
    pub fn with_unreserved<T>(
        &self,
        commitment: &Commitment,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let reserved = self.lock();
        if reserved.contains(commitment) {
            return Err(WalletError::Validation(format!(
                "note {commitment} is reserved by a pending transfer"
            )));
        }
        let outcome = f();
        drop(reserved);
        outcome
    }

    /// Select among unreserved spendable notes and reserve the result.
    pub fn select_and_reserve(
        &self,
        spendable: &[Note],
        amount: NoteValue,
        policy: SelectionPolicy,
    ) -> Result<(Selection, NoteReservation)> {
        let mut reserved = self.lock();
        let free: Vec<Note> = spendable
            .iter()
            .filter(|n| !reserved.contains(&n.commitment))
            .cloned()
            .collect();

        let selection = select_notes(&free, amount, policy).ok_or_else(|| {
            let available = NoteValue::checked_sum(free.iter().map(|n| n.amount))
                .unwrap_or(NoteValue::MAX);
            WalletError::InsufficientBalance {
                requested: amount,
                available,
            }
        })?;

        let commitments: Vec<Commitment> =
            selection.notes.iter().map(|n| n.commitment.clone()).collect();
        reserved.extend(commitments.iter().cloned());
        drop(reserved);

        Ok((selection, self.guard(commitments)))
    }

    /// Reserve exactly `notes`, chosen by the caller.
    pub fn reserve_exact(&self, notes: &[Note]) -> Result<NoteReservation> {
        let mut reserved = self.lock();
        if let Some(busy) = notes.iter().find(|n| reserved.contains(&n.commitment)) {
            return Err(WalletError::Validation(format!(
                "note {} is reserved by another pending transfer",
                busy.commitment
            )));
        }
        let commitments: Vec<Commitment> = notes.iter().map(|n| n.commitment.clone()).collect();
        reserved.extend(commitments.iter().cloned());
        drop(reserved);

        Ok(self.guard(commitments))
    }

    fn guard(&self, commitments: Vec<Commitment>) -> NoteReservation {
        NoteReservation {
            ledger: self.clone(),
            commitments,
        }
    }
}

/// Releases its notes when dropped.
pub struct NoteReservation {
    ledger: ReservationLedger,
    commitments: Vec<Commitment>,
}

impl NoteReservation {
    pub fn commitments(&self) -> &[Commitment] {
        &self.commitments
    }
}

impl Drop for NoteReservation {
    fn drop(&mut self) {
        let mut reserved = self.ledger.lock();
        for commitment in &self.commitments {
            reserved.remove(commitment);
        }
    }
}

impl std::fmt::Debug for NoteReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteReservation")
            .field("commitments", &self.commitments)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes(amounts: &[u128]) -> Vec<Note> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| {
                Note::new(
                    format!("0x{i:02}").as_str().into(),
                    format!("nf{i}").as_str().into(),
                    NoteValue::new(*a),
                )
            })
            .collect()
    }

    fn ids(selection: &Selection) -> Vec<&str> {
        selection.notes.iter().map(|n| n.commitment.as_str()).collect()
    }

    #[test]
    fn test_insertion_order_selection() {
        let candidates = notes(&[1_000_000_000, 500_000_000]);
        let s = select_notes(
            &candidates,
            NoteValue::new(1_200_000_000),
            SelectionPolicy::InsertionOrder,
        )
        .unwrap();
        assert_eq!(ids(&s), vec!["0x00", "0x01"]);
        assert_eq!(s.change(NoteValue::new(1_200_000_000)), NoteValue::new(300_000_000));
    }

    #[test]
    fn test_exact_sum_has_no_change() {
        let candidates = notes(&[40, 60, 10]);
        let s = select_notes(&candidates, NoteValue::new(100), SelectionPolicy::InsertionOrder)
            .unwrap();
        assert_eq!(ids(&s), vec!["0x00", "0x01"]);
        assert_eq!(s.change(NoteValue::new(100)), NoteValue::ZERO);
    }

    #[test]
    fn test_largest_first_selection() {
        let candidates = notes(&[10, 70, 70, 5]);
        let s = select_notes(&candidates, NoteValue::new(100), SelectionPolicy::LargestFirst)
            .unwrap();
        assert_eq!(ids(&s), vec!["0x01", "0x02"]);
    }

    #[test]
    fn test_insufficient_candidates() {
        let candidates = notes(&[10, 20]);
        assert!(select_notes(&candidates, NoteValue::new(31), SelectionPolicy::InsertionOrder).is_none());
        assert!(select_notes(&[], NoteValue::new(1), SelectionPolicy::InsertionOrder).is_none());
    }

    #[test]
    fn test_spent_notes_skipped() {
        let mut candidates = notes(&[50, 50]);
        candidates[0].spent = true;
        let s = select_notes(&candidates, NoteValue::new(50), SelectionPolicy::InsertionOrder)
            .unwrap();
        assert_eq!(ids(&s), vec!["0x01"]);
    }

    #[test]
    fn test_reservations_are_disjoint() {
        let ledger = ReservationLedger::new();
        let candidates = notes(&[50, 50, 50]);

        let (first, r1) = ledger
            .select_and_reserve(&candidates, NoteValue::new(60), SelectionPolicy::InsertionOrder)
            .unwrap();
        let (second, r2) = ledger
            .select_and_reserve(&candidates, NoteValue::new(50), SelectionPolicy::InsertionOrder)
            .unwrap();
        assert_eq!(ids(&first), vec!["0x00", "0x01"]);
        assert_eq!(ids(&second), vec!["0x02"]);
        assert_eq!(ledger.reserved_count(), 3);

        let err = ledger
            .select_and_reserve(&candidates, NoteValue::new(1), SelectionPolicy::InsertionOrder)
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::InsufficientBalance {
                requested: NoteValue::new(1),
                available: NoteValue::ZERO
            }
        );

        drop(r1);
        assert!(!ledger.is_reserved(&"0x00".into()));
        assert!(ledger.is_reserved(&"0x02".into()));
        drop(r2);
        assert_eq!(ledger.reserved_count(), 0);
    }

    #[test]
    fn test_reserve_exact_conflict() {
        let ledger = ReservationLedger::new();
        let candidates = notes(&[50, 50]);
        let _held = ledger.reserve_exact(&candidates[..1]).unwrap();
        let err = ledger.reserve_exact(&candidates).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(ledger.reserved_count(), 1);
    }

    #[test]
    fn test_with_unreserved_blocks_held_notes() {
        let ledger = ReservationLedger::new();
        let candidates = notes(&[50, 50]);
        let held = ledger.reserve_exact(&candidates[..1]).unwrap();

        let err = ledger
            .with_unreserved(&"0x00".into(), || Ok(()))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(ledger.with_unreserved(&"0x01".into(), || Ok(7)).unwrap(), 7);

        drop(held);
        assert!(ledger.with_unreserved(&"0x00".into(), || Ok(())).is_ok());
    }

    #[test]
    fn test_owns_only_its_reservations() {
        let ledger = ReservationLedger::new();
        let other = ReservationLedger::new();
        let candidates = notes(&[50]);
        let reservation = ledger.reserve_exact(&candidates).unwrap();
        assert!(ledger.owns(&reservation));
        assert!(ledger.clone().owns(&reservation));
        assert!(!other.owns(&reservation));
    }
}
