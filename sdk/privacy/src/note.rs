//! Shielded Notes
//!
//! A Note is one unit of shielded value held by the wallet.
//!
//! ```text
//! Note = {
//!     commitment: Commitment,   // public id, leaf in the commitment tree
//!     nullifier: Nullifier,     // revealed once, when the note is spent
//!     amount: NoteValue,        // smallest unit (wei / lamports)
//!     encryptedNote: String,    // opaque ciphertext, never interpreted here
//!     spent: bool,              // false -> true exactly once
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::commitment::{Commitment, CommitmentScheme};
use crate::error::PrivacyError;
use crate::nullifier::Nullifier;

/// A shielded note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub commitment: Commitment,
    pub nullifier: Nullifier,
    pub amount: NoteValue,
    #[serde(default)]
    pub encrypted_note: String,
    #[serde(default)]
    pub spent: bool,
}

impl Note {
    /// An unspent note with an empty ciphertext payload.
    pub fn new(commitment: Commitment, nullifier: Nullifier, amount: NoteValue) -> Self {
        Self {
            commitment,
            nullifier,
            amount,
            encrypted_note: String::new(),
            spent: false,
        }
    }

    pub fn with_encrypted_note(mut self, encrypted_note: impl Into<String>) -> Self {
        self.encrypted_note = encrypted_note.into();
        self
    }

    /// Mint a fresh note for `owner` with random blinding.
    ///
    /// Used for change and transfer outputs; the payload carries the blinding
    /// factor so the owner can later re-derive the nullifier.
    pub fn create<R: Rng + ?Sized>(amount: NoteValue, owner: &str, rng: &mut R) -> Self {
        let mut rho = [0u8; 32];
        rng.fill_bytes(&mut rho);
        let commitment = CommitmentScheme::new().commit(amount, owner.as_bytes(), &rho);
        let nullifier = Nullifier::derive(&commitment, &rho);
        Self::new(commitment, nullifier, amount).with_encrypted_note(hex::encode(rho))
    }

    pub fn is_spendable(&self) -> bool {
        !self.spent
    }
}

/// Note value with overflow protection, serialized as a decimal string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NoteValue(pub u128);

impl NoteValue {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u128::MAX);

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Sum a sequence of values, `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Self>>(values: I) -> Option<Self> {
        values
            .into_iter()
            .try_fold(Self::ZERO, |acc, v| acc.checked_add(v))
    }
}

impl From<u64> for NoteValue {
    fn from(value: u64) -> Self {
        Self(value as u128)
    }
}

impl From<u128> for NoteValue {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl fmt::Display for NoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteValue {
    type Err = PrivacyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PrivacyError::InvalidAmount(s.to_string()));
        }
        trimmed
            .parse::<u128>()
            .map(Self)
            .map_err(|_| PrivacyError::InvalidAmount(s.to_string()))
    }
}

impl Serialize for NoteValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for NoteValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Self::from(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_value_checked_ops() {
        let a = NoteValue::new(10);
        assert_eq!(a.checked_add(NoteValue::new(5)), Some(NoteValue::new(15)));
        assert_eq!(a.checked_sub(NoteValue::new(11)), None);
        assert_eq!(NoteValue::MAX.checked_add(NoteValue::new(1)), None);
    }

    #[test]
    fn test_checked_sum() {
        let values = [NoteValue::new(1), NoteValue::new(2), NoteValue::new(3)];
        assert_eq!(NoteValue::checked_sum(values), Some(NoteValue::new(6)));
        assert_eq!(NoteValue::checked_sum([NoteValue::MAX, NoteValue::new(1)]), None);
    }

    #[test]
    fn test_note_value_parse() {
        assert_eq!("1000000000000000000".parse::<NoteValue>().unwrap(), NoteValue::new(10u128.pow(18)));
        assert!("-5".parse::<NoteValue>().is_err());
        assert!("1e18".parse::<NoteValue>().is_err());
        assert!("".parse::<NoteValue>().is_err());
    }

    #[test]
    fn test_note_json_shape() {
        let note = Note::new("0xc1".into(), "0xn1".into(), NoteValue::new(500));
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["amount"], "500");
        assert_eq!(json["encryptedNote"], "");
        assert_eq!(json["spent"], false);

        let parsed: Note = serde_json::from_str(
            r#"{"commitment":"0xc1","nullifier":"0xn1","amount":500}"#,
        )
        .unwrap();
        assert_eq!(parsed, note);
    }

    #[test]
    fn test_create_fresh_note() {
        let mut rng = rand::thread_rng();
        let a = Note::create(NoteValue::new(42), "0xowner", &mut rng);
        let b = Note::create(NoteValue::new(42), "0xowner", &mut rng);
        assert!(a.is_spendable());
        assert_eq!(a.amount, NoteValue::new(42));
        assert_ne!(a.commitment, b.commitment);
        assert_ne!(a.nullifier, b.nullifier);
        assert_eq!(a.encrypted_note.len(), 64);
    }
}
