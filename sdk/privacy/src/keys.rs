//! View keys and selective disclosure.
//!
//! A view key lets its holder read the wallet's notes. Payment attestations
//! are tagged with a key derived from it, so a verifier who is handed the
//! view key can check an attestation while the attestation itself reveals
//! nothing about the key.

use std::fmt;

use rand::Rng;

use crate::commitment::Commitment;
use crate::error::{Result, decode_hex32};
use crate::note::NoteValue;

const DISCLOSURE_CONTEXT: &str = "cipherpay payment disclosure v1";

#[derive(Clone, PartialEq, Eq)]
pub struct ViewKey([u8; 32]);

impl ViewKey {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut key = [0u8; 32];
        rng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self(key)
    }

    pub fn from_hex(input: &str) -> Result<Self> {
        decode_hex32(input).map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Key used to tag payment disclosures.
    fn disclosure_key(&self) -> [u8; 32] {
        blake3::derive_key(DISCLOSURE_CONTEXT, &self.0)
    }

    /// Tag binding a note's commitment and amount at `timestamp`.
    pub fn disclosure_tag(&self, commitment: &Commitment, amount: NoteValue, timestamp: i64) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(&self.disclosure_key());
        hasher.update(commitment.as_str().as_bytes());
        hasher.update(&amount.as_u128().to_le_bytes());
        hasher.update(&timestamp.to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

// Never print key material.
impl fmt::Debug for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ViewKey(..)")
    }
}
