//! Nullifiers
//!
//! A nullifier is revealed when its note is spent; the relay rejects any
//! transfer that reuses one.
//!
//! ```text
//! Nullifier = "0x" || hex(BLAKE3_derive("cipherpay nullifier v1", commitment || rho))
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::to_prefixed_hex;

const NULLIFIER_CONTEXT: &str = "cipherpay nullifier v1";

/// Spend tag of a note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nullifier(pub String);

impl Nullifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Derive the nullifier of a locally created note.
    pub fn derive(commitment: &Commitment, rho: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(NULLIFIER_CONTEXT);
        hasher.update(commitment.as_str().as_bytes());
        hasher.update(rho);
        Self(to_prefixed_hex(hasher.finalize().as_bytes()))
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Nullifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullifier_deterministic() {
        let c = Commitment::from("0xabc");
        assert_eq!(Nullifier::derive(&c, &[3u8; 32]), Nullifier::derive(&c, &[3u8; 32]));
    }

    #[test]
    fn test_nullifier_differs_from_commitment() {
        let c = Commitment::from("0xabc");
        let nf = Nullifier::derive(&c, &[3u8; 32]);
        assert_ne!(nf.as_str(), c.as_str());
        assert_ne!(nf, Nullifier::derive(&c, &[4u8; 32]));
    }
}
