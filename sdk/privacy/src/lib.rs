//! CipherPay Privacy SDK
//!
//! Value types shared by every layer of the wallet core: shielded notes,
//! their commitments and nullifiers, view keys and the commitment tree.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Shielded Note                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │  Commitment  │  │  Nullifier   │  │   Encrypted payload   │  │
//! │  │  (tree leaf) │  │  (on spend)  │  │   (opaque to us)      │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘  │
//! │         │                 │                                     │
//! │         ▼                 ▼                                     │
//! │  ┌────────────────┐  ┌──────────────────────┐                   │
//! │  │  MerkleTree    │  │  relay nullifier set │                   │
//! │  │  membership    │  │  double-spend guard  │                   │
//! │  └────────────────┘  └──────────────────────┘                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Commitments and nullifiers are opaque identifiers: the wallet never
//! interprets them beyond equality, and the proving backend is the only
//! party that knows how they were derived.

pub mod commitment;
pub mod error;
pub mod keys;
pub mod merkle;
pub mod note;
pub mod nullifier;

pub use commitment::{Commitment, CommitmentScheme};
pub use error::PrivacyError;
pub use keys::ViewKey;
pub use merkle::{Hash32, MerkleHasher, MerklePath, MerkleRoot, MerkleTree, RootHistory, TREE_DEPTH};
pub use note::{Note, NoteValue};
pub use nullifier::Nullifier;

/// Render bytes as a `0x`-prefixed lowercase hex identifier.
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
