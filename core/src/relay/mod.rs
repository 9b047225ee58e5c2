//! Relay service access.
//!
//! The relay owns the commitment tree and the nullifier set. The wallet
//! reads roots and membership paths from it and hands it finished transfers.

mod client;
mod simulated;
mod types;

use async_trait::async_trait;
use cipherpay_privacy::{Commitment, MerklePath, MerkleRoot};

use crate::error::Result;

pub use client::{HttpRelay, HttpRelayConfig};
pub use simulated::SimulatedRelay;
pub use types::{ComplianceMetadata, SubmissionReceipt, TransferKind, TransferSubmission, TxStatus};

#[async_trait]
pub trait Relay: Send + Sync {
    /// Current tree root; an empty tree is a normal answer.
    async fn fetch_root(&self) -> Result<MerkleRoot>;

    /// Membership path, `CommitmentNotFound` if the tree lacks the commitment.
    async fn merkle_path(&self, commitment: &Commitment) -> Result<MerklePath>;

    /// Hand over a proven transfer. Keyed by `submission.id`; never retried.
    async fn submit(&self, submission: &TransferSubmission) -> Result<SubmissionReceipt>;

    async fn tx_status(&self, tx_hash: &str) -> Result<TxStatus>;
}
