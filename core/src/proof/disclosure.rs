//! Payment attestations keyed by the wallet's view key.

use cipherpay_privacy::{Note, ViewKey, to_prefixed_hex};
use chrono::Utc;

use super::gateway::PaymentProver;
use super::types::{PaymentMetadata, PaymentProof};
use crate::error::{Result, WalletError};

/// Attests notes with a tag derived from the view key.
///
/// The tag binds commitment, amount and timestamp; checking it requires the
/// view key, which the attestation does not reveal.
pub struct ViewKeyDisclosure {
    view_key: ViewKey,
}

impl ViewKeyDisclosure {
    pub fn new(view_key: ViewKey) -> Self {
        Self { view_key }
    }
}

impl PaymentProver for ViewKeyDisclosure {
    fn prove_payment(&self, note: &Note) -> Result<PaymentProof> {
        if note.commitment.is_empty() {
            return Err(WalletError::ProofGeneration("note has no commitment".into()));
        }
        if note.nullifier.is_empty() {
            return Err(WalletError::ProofGeneration("note has no nullifier".into()));
        }

        let timestamp = Utc::now().timestamp();
        let tag = self
            .view_key
            .disclosure_tag(&note.commitment, note.amount, timestamp);
        Ok(PaymentProof {
            proof: to_prefixed_hex(&tag),
            metadata: PaymentMetadata {
                note_id: note.commitment.clone(),
                amount: note.amount,
                timestamp,
            },
        })
    }

    fn verify_payment(&self, proof: &PaymentProof, note: &Note, view_key: &ViewKey) -> Result<bool> {
        let tag = cipherpay_privacy::error::decode_hex32(&proof.proof)
            .map_err(|e| WalletError::Verification(format!("payment proof tag: {e}")))?;

        if proof.metadata.note_id != note.commitment || proof.metadata.amount != note.amount {
            return Ok(false);
        }
        let expected =
            view_key.disclosure_tag(&note.commitment, note.amount, proof.metadata.timestamp);
        // blake3::Hash equality is constant time
        Ok(blake3::Hash::from(tag) == blake3::Hash::from(expected))
    }

    fn view_key(&self) -> ViewKey {
        self.view_key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherpay_privacy::NoteValue;

    fn note() -> Note {
        Note::new("0xc1".into(), "0xn1".into(), NoteValue::new(250))
    }

    #[test]
    fn test_prove_and_verify() {
        let key = ViewKey::from_bytes([4u8; 32]);
        let disclosure = ViewKeyDisclosure::new(key.clone());
        let proof = disclosure.prove_payment(&note()).unwrap();

        assert_eq!(proof.metadata.note_id, note().commitment);
        assert!(!proof.proof.contains(&key.to_hex()));
        assert!(disclosure.verify_payment(&proof, &note(), &key).unwrap());
    }

    #[test]
    fn test_wrong_key_or_note_is_false() {
        let key = ViewKey::from_bytes([4u8; 32]);
        let disclosure = ViewKeyDisclosure::new(key.clone());
        let proof = disclosure.prove_payment(&note()).unwrap();

        let other_key = ViewKey::from_bytes([5u8; 32]);
        assert!(!disclosure.verify_payment(&proof, &note(), &other_key).unwrap());

        let mut other_note = note();
        other_note.amount = NoteValue::new(251);
        assert!(!disclosure.verify_payment(&proof, &other_note, &key).unwrap());
    }

    #[test]
    fn test_malformed_tag_is_error() {
        let key = ViewKey::from_bytes([4u8; 32]);
        let disclosure = ViewKeyDisclosure::new(key.clone());
        let mut proof = disclosure.prove_payment(&note()).unwrap();
        proof.proof.truncate(10);
        let err = disclosure.verify_payment(&proof, &note(), &key).unwrap_err();
        assert!(matches!(err, WalletError::Verification(_)));
    }

    #[test]
    fn test_note_missing_fields() {
        let disclosure = ViewKeyDisclosure::new(ViewKey::from_bytes([1u8; 32]));
        let bare = Note::new("".into(), "0xn".into(), NoteValue::new(1));
        assert!(matches!(
            disclosure.prove_payment(&bare),
            Err(WalletError::ProofGeneration(_))
        ));
    }
}
