use std::fmt;

use cipherpay_privacy::{Commitment, Hash32, NoteValue, Nullifier};
use serde::{Deserialize, Serialize};

use crate::proof::TransferProof;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    /// Shielded note to shielded note
    Transfer,
    /// Shielded note to a public address
    Withdrawal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceMetadata {
    pub checked: bool,
    pub timestamp: i64,
    pub source: String,
}

/// A proven transfer as handed to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSubmission {
    /// Idempotency key
    pub id: String,
    pub kind: TransferKind,
    pub recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stealth_address: Option<String>,
    pub amount: NoteValue,
    #[serde(with = "hex::serde")]
    pub merkle_root: Hash32,
    pub nullifiers: Vec<Nullifier>,
    pub output_commitments: Vec<Commitment>,
    pub proof: TransferProof,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceMetadata>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub tx_hash: String,
    pub status: TxStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    #[serde(alias = "success")]
    Confirmed,
    Failed,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Pending => f.write_str("pending"),
            TxStatus::Confirmed => f.write_str("confirmed"),
            TxStatus::Failed => f.write_str("failed"),
        }
    }
}
