use std::fmt;
use std::sync::Arc;

use cipherpay_privacy::{Commitment, Note, NoteValue};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::notes::NoteReservation;
use crate::relay::{ComplianceMetadata, TransferKind, TransferSubmission, TxStatus};

/// Progress of one transfer attempt.
///
/// ```text
/// Form -> Proving -> Submitting -> Settled
///   \________\___________\_______> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStage {
    Form,
    Proving,
    Submitting,
    Settled,
    Failed,
}

impl TransferStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStage::Settled | TransferStage::Failed)
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStage::Form => "form",
            TransferStage::Proving => "proving",
            TransferStage::Submitting => "submitting",
            TransferStage::Settled => "settled",
            TransferStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the caller wants to move.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub kind: TransferKind,
    pub recipient: String,
    pub amount: NoteValue,
    /// Caller pre-selection; the configured policy picks when `None`
    pub notes: Option<Vec<Commitment>>,
}

impl TransferRequest {
    pub fn transfer(recipient: impl Into<String>, amount: NoteValue) -> Self {
        Self {
            kind: TransferKind::Transfer,
            recipient: recipient.into(),
            amount,
            notes: None,
        }
    }

    pub fn withdrawal(recipient: impl Into<String>, amount: NoteValue) -> Self {
        Self {
            kind: TransferKind::Withdrawal,
            ..Self::transfer(recipient, amount)
        }
    }

    pub fn with_notes(mut self, notes: Vec<Commitment>) -> Self {
        self.notes = Some(notes);
        self
    }
}

/// Cancellation and progress reporting for one attempt.
#[derive(Debug, Clone)]
pub struct AttemptControl {
    pub cancel: CancellationToken,
    stage: Arc<watch::Sender<TransferStage>>,
}

impl AttemptControl {
    pub fn new() -> Self {
        let (stage, _) = watch::channel(TransferStage::Form);
        Self {
            cancel: CancellationToken::new(),
            stage: Arc::new(stage),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TransferStage> {
        self.stage.subscribe()
    }

    pub fn stage(&self) -> TransferStage {
        *self.stage.borrow()
    }

    pub(crate) fn advance(&self, stage: TransferStage) {
        self.stage.send_replace(stage);
    }
}

impl Default for AttemptControl {
    fn default() -> Self {
        Self::new()
    }
}

/// A proven transfer that has not been handed to the relay yet.
///
/// Holds the reservation on its input notes: dropping it releases them and
/// leaves the Note Store untouched.
#[derive(Debug)]
pub struct PreparedTransfer {
    pub(crate) submission: TransferSubmission,
    pub(crate) spent: Vec<Commitment>,
    pub(crate) change: Option<Note>,
    pub(crate) control: AttemptControl,
    pub(crate) _reservation: NoteReservation,
}

impl PreparedTransfer {
    /// Idempotency key sent with the submission.
    pub fn id(&self) -> &str {
        &self.submission.id
    }

    pub fn submission(&self) -> &TransferSubmission {
        &self.submission
    }

    pub fn inputs(&self) -> &[Commitment] {
        &self.spent
    }

    pub fn change_note(&self) -> Option<&Note> {
        self.change.as_ref()
    }

    pub fn stage(&self) -> TransferStage {
        self.control.stage()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransferStage> {
        self.control.subscribe()
    }
}

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub id: String,
    pub tx_hash: String,
    pub status: TxStatus,
    pub spent: Vec<Commitment>,
    pub change: Option<Commitment>,
}

/// Settled transfer kept for compliance reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledTransfer {
    pub id: String,
    pub tx_hash: String,
    pub kind: TransferKind,
    pub recipient: String,
    pub amount: NoteValue,
    pub timestamp: i64,
    pub compliance: Option<ComplianceMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub start: i64,
    pub end: i64,
    pub transfer_count: usize,
    pub total_amount: NoteValue,
    pub entries: Vec<SettledTransfer>,
}
