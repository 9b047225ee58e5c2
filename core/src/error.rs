//! Error taxonomy of the wallet core.
//!
//! Every failure surfaced to callers is one of these variants; none of them
//! leave the wallet in an unusable state.

use cipherpay_privacy::{Commitment, NoteValue};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    /// Caller input rejected before any side effect
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Recipient does not match the chain's address grammar
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: NoteValue,
        available: NoteValue,
    },

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Wallet connection failed: {0}")]
    Connection(String),

    #[error("Service is not initialized")]
    NotInitialized,

    #[error("Proof generation failed: {0}")]
    ProofGeneration(String),

    /// Structurally malformed proof, public signals or verifier key
    #[error("Proof verification error: {0}")]
    Verification(String),

    #[error("Commitment not found: {0}")]
    CommitmentNotFound(String),

    /// Transport failure or timeout talking to an external service
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Duplicate commitment: {0}")]
    DuplicateCommitment(Commitment),

    #[error("Note already spent: {0}")]
    AlreadySpent(Commitment),

    #[error("Note not found: {0}")]
    NoteNotFound(Commitment),

    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl WalletError {
    /// Whether a read that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::Unavailable(_))
    }

    /// Input validation failures, recipient grammar included.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WalletError::Validation(_) | WalletError::InvalidRecipient(_)
        )
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(err: reqwest::Error) -> Self {
        WalletError::Unavailable(err.to_string())
    }
}

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, WalletError>;
