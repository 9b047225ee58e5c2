//! Transaction Orchestrator
//!
//! Drives one transfer attempt from intent to settlement:
//!
//! ```text
//! create_transfer: session -> amount -> balance -> recipient
//!                  -> select + reserve -> root + paths -> prove
//!                  => PreparedTransfer (stage: submitting)
//! submit_transfer: session + inputs -> relay.submit (once)
//!                  -> apply_settlement (atomic)
//! ```
//!
//! The Note Store is only written in `submit_transfer`, after the relay
//! accepted the transfer. No lock on it is held across an await.

mod types;

use std::sync::{Arc, Mutex};

use cipherpay_config::{ChainType, SelectionPolicy};
use cipherpay_privacy::{Commitment, Hash32, Note, NoteValue, to_prefixed_hex};
use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;

use crate::address::{StealthAddress, validate_recipient};
use crate::error::{Result, WalletError};
use crate::merkle::MerkleQueryClient;
use crate::notes::{NoteReservation, NoteStore, ReservationLedger, Selection};
use crate::proof::{OutputCommitment, OutputRole, ProofGateway, SpendWitness, TransferProofInput};
use crate::relay::{ComplianceMetadata, Relay, TransferKind, TransferSubmission, TxStatus};
use crate::retry::RetryPolicy;
use crate::wallet::WalletSession;

pub use types::{
    AttemptControl, ComplianceReport, PreparedTransfer, SettledTransfer, TransferReceipt,
    TransferRequest, TransferStage,
};

const COMPLIANCE_SOURCE: &str = "cipherpay-wallet";
const ROOT_READ_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub chain: ChainType,
    pub selection_policy: SelectionPolicy,
    pub stealth_addresses: bool,
    pub compliance: bool,
    /// Deposit destination; the holder's own address when unset
    pub deposit_address: Option<String>,
}

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct OrchestratorParts {
    pub store: Arc<NoteStore>,
    pub session: Arc<WalletSession>,
    pub merkle: Arc<MerkleQueryClient>,
    pub proofs: Arc<ProofGateway>,
    pub relay: Arc<dyn Relay>,
    pub status_retry: RetryPolicy,
}

pub struct TransactionOrchestrator {
    config: OrchestratorConfig,
    parts: OrchestratorParts,
    ledger: ReservationLedger,
    settled: Mutex<Vec<SettledTransfer>>,
}

impl TransactionOrchestrator {
    pub fn new(config: OrchestratorConfig, parts: OrchestratorParts) -> Self {
        Self {
            config,
            parts,
            ledger: ReservationLedger::new(),
            settled: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Notes currently held by prepared transfers.
    pub fn reserved_count(&self) -> usize {
        self.ledger.reserved_count()
    }

    pub async fn create_transfer(&self, recipient: &str, amount: NoteValue) -> Result<PreparedTransfer> {
        self.prepare(TransferRequest::transfer(recipient, amount), AttemptControl::new())
            .await
    }

    /// Unshield `amount` to the public address `recipient`.
    pub async fn withdraw(&self, amount: NoteValue, recipient: &str) -> Result<PreparedTransfer> {
        self.prepare(TransferRequest::withdrawal(recipient, amount), AttemptControl::new())
            .await
    }

    /// Run the pipeline up to a proven, reserved transfer.
    pub async fn prepare(&self, request: TransferRequest, control: AttemptControl) -> Result<PreparedTransfer> {
        control.advance(TransferStage::Form);
        let outcome = self.prepare_inner(request, &control).await;
        if let Err(e) = &outcome {
            control.advance(TransferStage::Failed);
            warn!("Transfer preparation failed: {}", e);
        }
        outcome
    }

    async fn prepare_inner(&self, request: TransferRequest, control: &AttemptControl) -> Result<PreparedTransfer> {
        let sender = self.parts.session.require_address()?;

        if request.amount.is_zero() {
            return Err(WalletError::Validation("amount must be greater than zero".into()));
        }
        let balance = self.parts.store.balance();
        if self.parts.store.spendable_count() == 0 || request.amount > balance {
            return Err(WalletError::InsufficientBalance {
                requested: request.amount,
                available: balance,
            });
        }
        validate_recipient(self.config.chain, &request.recipient)?;

        let (selection, reservation) = self.select(&request)?;
        debug!(
            "Selected {} notes totalling {} for {}",
            selection.notes.len(),
            selection.total,
            request.amount
        );

        let (root, inputs) = self.fetch_witnesses(&selection.notes).await?;

        let change_value = selection.change(request.amount);
        let (payee, change, stealth, id) = {
            let mut rng = rand::thread_rng();
            let stealth = (self.config.stealth_addresses && request.kind == TransferKind::Transfer)
                .then(|| StealthAddress::derive(self.config.chain, &request.recipient, &mut rng));
            let owner = stealth
                .as_ref()
                .map(|s| s.address.as_str())
                .unwrap_or(&request.recipient);
            let payee = Note::create(request.amount, owner, &mut rng);
            let change = (!change_value.is_zero()).then(|| Note::create(change_value, &sender, &mut rng));
            let id_bytes: [u8; 16] = rng.r#gen();
            (payee, change, stealth, to_prefixed_hex(&id_bytes))
        };

        let mut outputs = vec![OutputCommitment {
            commitment: payee.commitment.clone(),
            amount: payee.amount,
            role: OutputRole::Recipient,
        }];
        if let Some(change) = &change {
            outputs.push(OutputCommitment {
                commitment: change.commitment.clone(),
                amount: change.amount,
                role: OutputRole::Change,
            });
        }
        let input = TransferProofInput {
            amount: request.amount,
            recipient: request.recipient.clone(),
            merkle_root: root,
            inputs,
            outputs,
        };

        control.advance(TransferStage::Proving);
        let proof = self
            .parts
            .proofs
            .generate_transfer_proof_until(&input, &control.cancel)
            .await?;

        let timestamp = Utc::now().timestamp_millis();
        let compliance = self.config.compliance.then(|| ComplianceMetadata {
            checked: true,
            timestamp,
            source: COMPLIANCE_SOURCE.into(),
        });
        let submission = TransferSubmission {
            id,
            kind: request.kind,
            recipient: request.recipient,
            stealth_address: stealth.map(|s| s.address),
            amount: request.amount,
            merkle_root: input.merkle_root,
            nullifiers: input.nullifiers(),
            output_commitments: input.output_commitments(),
            proof,
            compliance,
            timestamp,
        };

        control.advance(TransferStage::Submitting);
        info!(
            "Prepared {:?} {} of {} ({} inputs, change {})",
            submission.kind,
            submission.id,
            submission.amount,
            selection.notes.len(),
            change_value
        );
        Ok(PreparedTransfer {
            submission,
            spent: reservation.commitments().to_vec(),
            change,
            control: control.clone(),
            _reservation: reservation,
        })
    }

    /// Current root plus a membership path for every note against it.
    ///
    /// The tree may grow between the root and the path reads; the pair is
    /// read again once before giving up with `Unavailable`.
    async fn fetch_witnesses(&self, notes: &[Note]) -> Result<(Hash32, Vec<SpendWitness>)> {
        for attempt in 1..=ROOT_READ_ATTEMPTS {
            let root = self.parts.merkle.fetch_root().await?.root;
            let mut inputs = Vec::with_capacity(notes.len());
            for note in notes {
                let merkle_path = self.parts.merkle.get_path_at(&note.commitment, &root).await?;
                inputs.push(SpendWitness {
                    commitment: note.commitment.clone(),
                    nullifier: note.nullifier.clone(),
                    amount: note.amount,
                    merkle_path,
                });
            }
            if inputs.iter().all(|w| w.merkle_path.verify(&w.commitment, &root)) {
                return Ok((root, inputs));
            }
            debug!(
                "Merkle root moved while reading paths (attempt {}/{})",
                attempt, ROOT_READ_ATTEMPTS
            );
        }
        Err(WalletError::Unavailable(
            "commitment tree changed while reading merkle paths".into(),
        ))
    }

    fn select(&self, request: &TransferRequest) -> Result<(Selection, NoteReservation)> {
        let Some(chosen) = &request.notes else {
            return self.ledger.select_and_reserve(
                &self.parts.store.spendable_notes(),
                request.amount,
                self.config.selection_policy,
            );
        };

        if chosen.is_empty() {
            return Err(WalletError::Validation("no notes were selected".into()));
        }
        let mut notes = Vec::with_capacity(chosen.len());
        for commitment in chosen {
            let note = self
                .parts
                .store
                .get(commitment)
                .ok_or_else(|| WalletError::NoteNotFound(commitment.clone()))?;
            if note.spent {
                return Err(WalletError::AlreadySpent(commitment.clone()));
            }
            if notes.iter().any(|n: &Note| n.commitment == note.commitment) {
                return Err(WalletError::Validation(format!("note {commitment} selected twice")));
            }
            notes.push(note);
        }
        let total = NoteValue::checked_sum(notes.iter().map(|n| n.amount))
            .ok_or_else(|| WalletError::AmountOverflow("selected notes".into()))?;
        if total < request.amount {
            return Err(WalletError::InsufficientBalance {
                requested: request.amount,
                available: total,
            });
        }
        let reservation = self.ledger.reserve_exact(&notes)?;
        Ok((Selection { notes, total }, reservation))
    }

    /// Hand a prepared transfer to the relay exactly once.
    ///
    /// On acceptance the inputs are marked spent and the change note is
    /// appended in one step. Session and inputs are checked again before the
    /// relay call; on any failure up to and including it the Note Store is
    /// unchanged.
    pub async fn submit_transfer(&self, prepared: PreparedTransfer) -> Result<TransferReceipt> {
        let PreparedTransfer {
            submission,
            spent,
            change,
            control,
            _reservation,
        } = prepared;

        let accepted = match self.check_submittable(&spent, &_reservation) {
            Ok(()) => self.parts.relay.submit(&submission).await,
            Err(e) => Err(e),
        };
        let receipt = match accepted {
            Ok(receipt) => receipt,
            Err(e) => {
                control.advance(TransferStage::Failed);
                warn!("Submission {} failed: {}", submission.id, e);
                return Err(e);
            }
        };

        let change_commitment = change.as_ref().map(|n| n.commitment.clone());
        let created: Vec<Note> = change.into_iter().collect();
        if let Err(e) = self.parts.store.apply_settlement(&spent, created.clone()) {
            // the relay has already spent the nullifiers
            let skipped = self.parts.store.reconcile_settlement(&spent, created);
            warn!(
                "Relay accepted {} as {} but the local settlement failed ({}); skipped {:?}",
                submission.id, receipt.tx_hash, e, skipped
            );
        }
        drop(_reservation);
        control.advance(TransferStage::Settled);
        info!("Transfer {} settled as {}", submission.id, receipt.tx_hash);

        self.record(SettledTransfer {
            id: submission.id.clone(),
            tx_hash: receipt.tx_hash.clone(),
            kind: submission.kind,
            recipient: submission.recipient,
            amount: submission.amount,
            timestamp: submission.timestamp,
            compliance: submission.compliance,
        });

        Ok(TransferReceipt {
            id: submission.id,
            tx_hash: receipt.tx_hash,
            status: receipt.status,
            spent,
            change: change_commitment,
        })
    }

    /// Preconditions re-checked right before a prepared transfer leaves.
    fn check_submittable(&self, spent: &[Commitment], reservation: &NoteReservation) -> Result<()> {
        self.parts.session.require_address()?;
        if !self.ledger.owns(reservation) {
            return Err(WalletError::Validation(
                "transfer was prepared by a different wallet session".into(),
            ));
        }
        for commitment in spent {
            let note = self
                .parts
                .store
                .get(commitment)
                .ok_or_else(|| WalletError::NoteNotFound(commitment.clone()))?;
            if note.spent {
                return Err(WalletError::AlreadySpent(commitment.clone()));
            }
        }
        Ok(())
    }

    /// Flag a note spent unless a prepared transfer holds it.
    pub fn mark_spent(&self, commitment: &Commitment) -> Result<()> {
        self.ledger
            .with_unreserved(commitment, || self.parts.store.mark_spent(commitment))
    }

    /// Poll the relay for a submitted transaction. Read-only.
    pub async fn check_status(&self, tx_hash: &str) -> Result<TxStatus> {
        if tx_hash.trim().is_empty() {
            return Err(WalletError::Validation("transaction reference is empty".into()));
        }
        self.parts
            .status_retry
            .run("fetch transaction status", || self.parts.relay.tx_status(tx_hash))
            .await
    }

    /// Move public funds into the pool through the wallet provider.
    pub async fn create_deposit(&self, amount: NoteValue) -> Result<String> {
        let sender = self.parts.session.require_address()?;
        if amount.is_zero() {
            return Err(WalletError::Validation("amount must be greater than zero".into()));
        }
        let target = self.config.deposit_address.clone().unwrap_or_else(|| sender.clone());
        info!("Depositing {} to {}", amount, target);
        self.parts
            .session
            .provider()
            .sign_and_send_deposit(&sender, &target, amount)
            .await
    }

    fn record(&self, transfer: SettledTransfer) {
        self.settled
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(transfer);
    }

    pub fn settled_transfers(&self) -> Vec<SettledTransfer> {
        self.settled.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Transfers settled with `start <= timestamp <= end` (unix millis).
    pub fn compliance_report(&self, start: i64, end: i64) -> Result<ComplianceReport> {
        if start > end {
            return Err(WalletError::Validation("report window ends before it starts".into()));
        }
        let entries: Vec<SettledTransfer> = self
            .settled_transfers()
            .into_iter()
            .filter(|t| t.timestamp >= start && t.timestamp <= end)
            .collect();
        let total_amount = NoteValue::checked_sum(entries.iter().map(|t| t.amount))
            .ok_or_else(|| WalletError::AmountOverflow("report total".into()))?;
        Ok(ComplianceReport {
            start,
            end,
            transfer_count: entries.len(),
            total_amount,
            entries,
        })
    }
}
