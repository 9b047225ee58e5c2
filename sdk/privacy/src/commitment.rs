//! Note Commitments
//!
//! A commitment is the public identifier of a note. The wallet treats it as
//! an opaque string (the proving backend may mint its own), but notes created
//! locally use a hiding blake3 commitment:
//!
//! ```text
//! Commitment = "0x" || hex(BLAKE3_derive("cipherpay note commitment v1",
//!                                        value_le || owner || rho))
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::merkle::Hash32;
use crate::note::NoteValue;
use crate::to_prefixed_hex;

const COMMITMENT_CONTEXT: &str = "cipherpay note commitment v1";
const LEAF_CONTEXT: &str = "cipherpay merkle leaf v1";

/// A note commitment, unique per note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commitment(pub String);

impl Commitment {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Leaf value this commitment occupies in the commitment tree.
    pub fn leaf_hash(&self) -> Hash32 {
        let mut hasher = blake3::Hasher::new_derive_key(LEAF_CONTEXT);
        hasher.update(self.0.as_bytes());
        *hasher.finalize().as_bytes()
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Commitment {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Commitment scheme for locally created notes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommitmentScheme;

impl CommitmentScheme {
    pub fn new() -> Self {
        Self
    }

    /// Commit to `value` owned by `owner` under blinding factor `rho`.
    pub fn commit(&self, value: NoteValue, owner: &[u8], rho: &[u8; 32]) -> Commitment {
        let mut hasher = blake3::Hasher::new_derive_key(COMMITMENT_CONTEXT);
        hasher.update(&value.as_u128().to_le_bytes());
        hasher.update(&(owner.len() as u64).to_le_bytes());
        hasher.update(owner);
        hasher.update(rho);
        Commitment(to_prefixed_hex(hasher.finalize().as_bytes()))
    }
}
