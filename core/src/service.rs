//! Service lifecycle.
//!
//! `CipherPayService` owns one wallet session: it builds the backend on
//! [`initialize`](CipherPayService::initialize), wires the components
//! together and tears them down on [`destroy`](CipherPayService::destroy).
//! Every operation before initialization fails with `NotInitialized`.

use std::sync::Arc;
use std::time::Duration;

use cipherpay_config::{ChainType, CipherPayConfig};
use cipherpay_privacy::{Commitment, MerklePath, MerkleRoot, Note, NoteValue, ViewKey};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::backend::{BackendKind, BackendSelector};
use crate::error::{Result, WalletError};
use crate::merkle::{CacheStats, MerkleQueryClient, PathCacheConfig};
use crate::notes::NoteStore;
use crate::orchestrator::{
    AttemptControl, ComplianceReport, OrchestratorConfig, OrchestratorParts, PreparedTransfer,
    TransactionOrchestrator, TransferReceipt, TransferRequest,
};
use crate::proof::{Groth16Proof, PaymentProof, ProofGateway, TransferProof, TransferProofInput, VerifierKey};
use crate::relay::{Relay, TxStatus};
use crate::retry::RetryPolicy;
use crate::wallet::{EventMonitor, WalletProvider, WalletSession};

/// Components of an initialized service.
struct Runtime {
    kind: BackendKind,
    store: Arc<NoteStore>,
    session: Arc<WalletSession>,
    merkle: Arc<MerkleQueryClient>,
    proofs: Arc<ProofGateway>,
    orchestrator: TransactionOrchestrator,
    monitor: Option<Arc<dyn EventMonitor>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub initialized: bool,
    pub connected: bool,
    pub address: Option<String>,
    pub balance: NoteValue,
    pub note_count: usize,
    pub spendable_count: usize,
    pub cache: Option<CacheStats>,
    pub chain: ChainType,
    pub backend: Option<BackendKind>,
}

pub struct CipherPayService {
    config: CipherPayConfig,
    wallet: Option<Arc<dyn WalletProvider>>,
    relay: Option<Arc<dyn Relay>>,
    monitor: Option<Arc<dyn EventMonitor>>,
    runtime: RwLock<Option<Arc<Runtime>>>,
}

impl CipherPayService {
    pub fn new(config: CipherPayConfig) -> Self {
        Self {
            config,
            wallet: None,
            relay: None,
            monitor: None,
            runtime: RwLock::new(None),
        }
    }

    pub fn with_wallet_provider(mut self, wallet: Arc<dyn WalletProvider>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn with_relay(mut self, relay: Arc<dyn Relay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_event_monitor(mut self, monitor: Arc<dyn EventMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &CipherPayConfig {
        &self.config
    }

    /// Build the backend and start the event monitor. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        let mut slot = self.runtime.write().await;
        if slot.is_some() {
            return Ok(());
        }
        info!("Initializing CipherPay service ({})", self.config.network.chain_type);

        let mut selector = BackendSelector::new(self.config.clone());
        if let Some(wallet) = &self.wallet {
            selector = selector.with_wallet_provider(wallet.clone());
        }
        if let Some(relay) = &self.relay {
            selector = selector.with_relay(relay.clone());
        }
        if let Some(monitor) = &self.monitor {
            selector = selector.with_event_monitor(monitor.clone());
        }
        let backend = selector.build().await?;

        let store = Arc::new(NoteStore::new());
        for note in backend.seed_notes {
            store.add_note(note)?;
        }

        let relay_config = &self.config.relay;
        let retry = RetryPolicy {
            attempt_timeout: Duration::from_secs(relay_config.request_timeout_secs),
            max_retries: relay_config.max_retries,
            retry_delay: Duration::from_millis(relay_config.retry_delay_ms),
        };
        let mut merkle = MerkleQueryClient::new(backend.relay.clone(), retry);
        if self.config.features.enable_caching {
            merkle = merkle.with_cache(PathCacheConfig {
                max_size: self.config.cache.max_size,
                ttl: Duration::from_millis(self.config.cache.default_ttl_ms),
            });
        }
        let merkle = Arc::new(merkle);
        let proofs = Arc::new(ProofGateway::new(
            backend.prover,
            backend.payments,
            Duration::from_secs(self.config.prover.proof_timeout_secs),
        ));
        let session = Arc::new(WalletSession::new(backend.wallet));

        let orchestrator = TransactionOrchestrator::new(
            OrchestratorConfig {
                chain: self.config.network.chain_type,
                selection_policy: self.config.wallet.selection_policy,
                stealth_addresses: self.config.features.enable_stealth_addresses,
                compliance: self.config.features.enable_compliance,
                deposit_address: self.config.network.contract_address.clone(),
            },
            OrchestratorParts {
                store: store.clone(),
                session: session.clone(),
                merkle: merkle.clone(),
                proofs: proofs.clone(),
                relay: backend.relay,
                status_retry: retry,
            },
        );

        if let Some(monitor) = &backend.monitor {
            monitor.start().await?;
            info!("Event monitor started");
        }

        *slot = Some(Arc::new(Runtime {
            kind: backend.kind,
            store,
            session,
            merkle,
            proofs,
            orchestrator,
            monitor: backend.monitor,
        }));
        info!("CipherPay service initialized ({} backend)", backend.kind);
        Ok(())
    }

    /// Stop the monitor and drop all state. No-op when not initialized.
    pub async fn destroy(&self) -> Result<()> {
        let Some(runtime) = self.runtime.write().await.take() else {
            return Ok(());
        };
        if let Some(monitor) = &runtime.monitor {
            if let Err(e) = monitor.stop().await {
                warn!("Event monitor failed to stop: {}", e);
            }
        }
        info!("CipherPay service destroyed");
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.runtime.read().await.is_some()
    }

    async fn runtime(&self) -> Result<Arc<Runtime>> {
        self.runtime
            .read()
            .await
            .clone()
            .ok_or(WalletError::NotInitialized)
    }

    pub async fn status(&self) -> ServiceStatus {
        let chain = self.config.network.chain_type;
        match self.runtime.read().await.clone() {
            Some(rt) => ServiceStatus {
                initialized: true,
                connected: rt.session.is_connected(),
                address: rt.session.address(),
                balance: rt.store.balance(),
                note_count: rt.store.len(),
                spendable_count: rt.store.spendable_count(),
                cache: rt.merkle.cache_stats(),
                chain,
                backend: Some(rt.kind),
            },
            None => ServiceStatus {
                initialized: false,
                connected: false,
                address: None,
                balance: NoteValue::ZERO,
                note_count: 0,
                spendable_count: 0,
                cache: None,
                chain,
                backend: None,
            },
        }
    }

    // Wallet session

    pub async fn connect(&self) -> Result<String> {
        self.runtime().await?.session.connect().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.runtime().await?.session.disconnect().await
    }

    pub async fn address(&self) -> Result<Option<String>> {
        Ok(self.runtime().await?.session.address())
    }

    // Note Store

    pub async fn add_note(&self, note: Note) -> Result<()> {
        self.runtime().await?.store.add_note(note)
    }

    pub async fn spendable_notes(&self) -> Result<Vec<Note>> {
        Ok(self.runtime().await?.store.spendable_notes())
    }

    pub async fn all_notes(&self) -> Result<Vec<Note>> {
        Ok(self.runtime().await?.store.all_notes())
    }

    pub async fn balance(&self) -> Result<NoteValue> {
        Ok(self.runtime().await?.store.balance())
    }

    pub async fn note(&self, commitment: &Commitment) -> Result<Option<Note>> {
        Ok(self.runtime().await?.store.get(commitment))
    }

    pub async fn mark_spent(&self, commitment: &Commitment) -> Result<()> {
        self.runtime().await?.orchestrator.mark_spent(commitment)
    }

    // Merkle queries

    pub async fn fetch_root(&self) -> Result<MerkleRoot> {
        self.runtime().await?.merkle.fetch_root().await
    }

    pub async fn merkle_path(&self, commitment: &Commitment) -> Result<MerklePath> {
        self.runtime().await?.merkle.get_path(commitment).await
    }

    pub async fn cache_stats(&self) -> Result<Option<CacheStats>> {
        Ok(self.runtime().await?.merkle.cache_stats())
    }

    // Proofs

    pub async fn generate_transfer_proof(&self, input: &TransferProofInput) -> Result<TransferProof> {
        self.runtime().await?.proofs.generate_transfer_proof(input).await
    }

    pub async fn verify_transfer_proof(
        &self,
        proof: &Groth16Proof,
        public_signals: &[String],
        verifier_key: &VerifierKey,
    ) -> Result<bool> {
        self.runtime()
            .await?
            .proofs
            .verify_transfer_proof(proof, public_signals, verifier_key)
    }

    pub async fn generate_payment_proof(&self, note: &Note) -> Result<PaymentProof> {
        self.runtime().await?.proofs.generate_payment_proof(note)
    }

    pub async fn verify_payment_proof(&self, proof: &PaymentProof, note: &Note, view_key: &ViewKey) -> Result<bool> {
        self.runtime()
            .await?
            .proofs
            .verify_payment_proof(proof, note, view_key)
    }

    pub async fn export_view_key(&self) -> Result<String> {
        Ok(self.runtime().await?.proofs.export_view_key().to_hex())
    }

    // Transfers

    pub async fn create_transfer(&self, recipient: &str, amount: NoteValue) -> Result<PreparedTransfer> {
        self.runtime().await?.orchestrator.create_transfer(recipient, amount).await
    }

    pub async fn prepare_transfer(&self, request: TransferRequest, control: AttemptControl) -> Result<PreparedTransfer> {
        self.runtime().await?.orchestrator.prepare(request, control).await
    }

    pub async fn withdraw(&self, amount: NoteValue, recipient: &str) -> Result<PreparedTransfer> {
        self.runtime().await?.orchestrator.withdraw(amount, recipient).await
    }

    pub async fn submit_transfer(&self, prepared: PreparedTransfer) -> Result<TransferReceipt> {
        self.runtime().await?.orchestrator.submit_transfer(prepared).await
    }

    pub async fn check_status(&self, tx_hash: &str) -> Result<TxStatus> {
        self.runtime().await?.orchestrator.check_status(tx_hash).await
    }

    pub async fn create_deposit(&self, amount: NoteValue) -> Result<String> {
        self.runtime().await?.orchestrator.create_deposit(amount).await
    }

    /// Settled transfers in `[start, end]` (unix millis).
    pub async fn compliance_report(&self, start: i64, end: i64) -> Result<ComplianceReport> {
        let runtime = self.runtime().await?;
        if !self.config.features.enable_compliance {
            return Err(WalletError::Unsupported(
                "compliance reporting is disabled (features.enable_compliance)".into(),
            ));
        }
        runtime.orchestrator.compliance_report(start, end)
    }
}
