//! In-memory relay.
//!
//! Keeps a real commitment tree, a nullifier set and a window of recent
//! roots, so the simulated backend enforces the same rules a live relay does.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use cipherpay_privacy::{Commitment, MerklePath, MerkleRoot, MerkleTree, Nullifier, RootHistory};
use log::{debug, info, warn};
use rand::Rng;

use super::Relay;
use super::types::{SubmissionReceipt, TransferSubmission, TxStatus};
use crate::error::{Result, WalletError};

/// Recent roots accepted for proofs built against a slightly stale tree.
const ROOT_HISTORY_SIZE: usize = 32;

struct TrackedTx {
    polls: u32,
    status: TxStatus,
}

struct State {
    tree: MerkleTree,
    roots: RootHistory,
    nullifiers: HashSet<Nullifier>,
    txs: HashMap<String, TrackedTx>,
    /// idempotency key -> receipt
    receipts: HashMap<String, SubmissionReceipt>,
    offline: bool,
    reject_next: Option<String>,
    submissions: usize,
}

pub struct SimulatedRelay {
    state: Mutex<State>,
    confirm_after_polls: u32,
}

impl SimulatedRelay {
    pub fn new() -> Self {
        let tree = MerkleTree::new();
        let mut roots = RootHistory::new(ROOT_HISTORY_SIZE);
        roots.push(tree.root());
        Self {
            state: Mutex::new(State {
                tree,
                roots,
                nullifiers: HashSet::new(),
                txs: HashMap::new(),
                receipts: HashMap::new(),
                offline: false,
                reject_next: None,
                submissions: 0,
            }),
            confirm_after_polls: 1,
        }
    }

    /// Number of `pending` answers before a transaction reports `confirmed`.
    pub fn with_confirm_after_polls(mut self, polls: u32) -> Self {
        self.confirm_after_polls = polls;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a commitment to the tree, as a confirmed deposit would.
    pub fn insert_commitment(&self, commitment: &Commitment) -> u64 {
        let mut state = self.lock();
        let position = state.tree.insert(commitment);
        let root = state.tree.root();
        state.roots.push(root);
        position
    }

    /// While offline every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn reject_next_submission(&self, reason: impl Into<String>) {
        self.lock().reject_next = Some(reason.into());
    }

    /// Submissions that reached the relay, accepted or not.
    pub fn submission_count(&self) -> usize {
        self.lock().submissions
    }

    pub fn is_nullifier_spent(&self, nullifier: &Nullifier) -> bool {
        self.lock().nullifiers.contains(nullifier)
    }

    fn check_online(state: &State) -> Result<()> {
        if state.offline {
            return Err(WalletError::Unavailable("relay is offline".into()));
        }
        Ok(())
    }

    fn validate(state: &State, submission: &TransferSubmission) -> std::result::Result<(), String> {
        if !state.roots.is_valid(&submission.merkle_root) {
            return Err(format!(
                "unknown merkle root {}",
                hex::encode(submission.merkle_root)
            ));
        }
        let mut seen = HashSet::new();
        for nullifier in &submission.nullifiers {
            if state.nullifiers.contains(nullifier) || !seen.insert(nullifier) {
                return Err(format!("nullifier {nullifier} already spent"));
            }
        }
        if submission.nullifiers.is_empty() {
            return Err("transfer spends no notes".into());
        }
        Ok(())
    }
}

impl Default for SimulatedRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Relay for SimulatedRelay {
    async fn fetch_root(&self) -> Result<MerkleRoot> {
        let state = self.lock();
        Self::check_online(&state)?;
        Ok(state.tree.snapshot())
    }

    async fn merkle_path(&self, commitment: &Commitment) -> Result<MerklePath> {
        let state = self.lock();
        Self::check_online(&state)?;
        state
            .tree
            .path_for(commitment)
            .ok_or_else(|| WalletError::CommitmentNotFound(commitment.to_string()))
    }

    async fn submit(&self, submission: &TransferSubmission) -> Result<SubmissionReceipt> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        state.submissions += 1;

        if let Some(receipt) = state.receipts.get(&submission.id) {
            debug!("Replayed submission {}", submission.id);
            return Ok(receipt.clone());
        }
        if let Some(reason) = state.reject_next.take() {
            warn!("Simulated relay rejecting {}: {}", submission.id, reason);
            return Err(WalletError::SubmissionRejected(reason));
        }
        Self::validate(&state, submission).map_err(WalletError::SubmissionRejected)?;

        for nullifier in &submission.nullifiers {
            state.nullifiers.insert(nullifier.clone());
        }
        for commitment in &submission.output_commitments {
            state.tree.insert(commitment);
        }
        let root = state.tree.root();
        state.roots.push(root);

        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        let tx_hash = cipherpay_privacy::to_prefixed_hex(&bytes);
        let receipt = SubmissionReceipt {
            tx_hash: tx_hash.clone(),
            status: TxStatus::Pending,
        };
        state.txs.insert(
            tx_hash.clone(),
            TrackedTx {
                polls: 0,
                status: TxStatus::Pending,
            },
        );
        state.receipts.insert(submission.id.clone(), receipt.clone());
        info!(
            "Simulated relay accepted {} as {} ({} leaves)",
            submission.id,
            tx_hash,
            state.tree.leaf_count()
        );
        Ok(receipt)
    }

    async fn tx_status(&self, tx_hash: &str) -> Result<TxStatus> {
        let confirm_after = self.confirm_after_polls;
        let mut state = self.lock();
        Self::check_online(&state)?;
        let tx = state.txs.get_mut(tx_hash).ok_or_else(|| {
            WalletError::Validation(format!("unknown transaction reference {tx_hash}"))
        })?;
        if tx.status == TxStatus::Pending && tx.polls >= confirm_after {
            tx.status = TxStatus::Confirmed;
        }
        tx.polls += 1;
        Ok(tx.status)
    }
}
