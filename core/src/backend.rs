//! Backend Selector
//!
//! Builds the wallet's capability set once, at initialization. Everything
//! downstream talks to trait objects and never asks which backend it got;
//! [`BackendKind`] exists for status reporting.
//!
//! | capability      | real                          | simulated                     |
//! |-----------------|-------------------------------|-------------------------------|
//! | transfer prover | [`HttpProver`] + arkworks     | [`SimulatedProver`]           |
//! | payment prover  | [`ViewKeyDisclosure`]         | [`ViewKeyDisclosure`]         |
//! | relay           | injected or [`HttpRelay`]     | injected or [`SimulatedRelay`] |
//! | wallet provider | injected or [`JsonRpcWallet`] | injected or [`SimulatedWallet`] |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cipherpay_config::{BackendMode, CipherPayConfig};
use cipherpay_privacy::{Note, NoteValue, ViewKey};
use log::{info, warn};
use serde::Serialize;

use crate::error::{Result, WalletError};
use crate::http::build_client;
use crate::proof::{
    HttpProver, HttpProverConfig, PaymentProver, SimulatedProver, TransferProver, ViewKeyDisclosure,
    load_verifier_key,
};
use crate::relay::{HttpRelay, HttpRelayConfig, Relay, SimulatedRelay};
use crate::wallet::{EventMonitor, JsonRpcWallet, SimulatedWallet, WalletProvider};

/// 1 ETH and 0.5 ETH in wei.
const DEMO_NOTE_AMOUNTS: [u128; 2] = [1_000_000_000_000_000_000, 500_000_000_000_000_000];
const DEMO_NOTE_OWNER: &str = "cipherpay-demo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Real,
    Simulated,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Real => f.write_str("real"),
            BackendKind::Simulated => f.write_str("simulated"),
        }
    }
}

/// Capability set handed to the service.
pub struct Backend {
    pub kind: BackendKind,
    pub prover: Arc<dyn TransferProver>,
    pub payments: Arc<dyn PaymentProver>,
    pub relay: Arc<dyn Relay>,
    pub wallet: Arc<dyn WalletProvider>,
    pub monitor: Option<Arc<dyn EventMonitor>>,
    /// Notes to load into a fresh Note Store
    pub seed_notes: Vec<Note>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("kind", &self.kind)
            .field("monitor", &self.monitor.is_some())
            .field("seed_notes", &self.seed_notes.len())
            .finish()
    }
}

pub struct BackendSelector {
    config: CipherPayConfig,
    wallet: Option<Arc<dyn WalletProvider>>,
    relay: Option<Arc<dyn Relay>>,
    monitor: Option<Arc<dyn EventMonitor>>,
}

impl BackendSelector {
    pub fn new(config: CipherPayConfig) -> Self {
        Self {
            config,
            wallet: None,
            relay: None,
            monitor: None,
        }
    }

    /// Relay supplied by the host; replaces the configured one.
    pub fn with_relay(mut self, relay: Arc<dyn Relay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Signer supplied by the host application; takes precedence over config.
    pub fn with_wallet_provider(mut self, wallet: Arc<dyn WalletProvider>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn with_event_monitor(mut self, monitor: Arc<dyn EventMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Decide the backend for this build profile.
    pub fn resolve_kind(&self) -> Result<BackendKind> {
        resolve_kind(
            self.config.backend.mode,
            self.config.backend.allow_simulated,
            cfg!(debug_assertions),
        )
    }

    pub async fn build(&self) -> Result<Backend> {
        let kind = self.resolve_kind()?;
        info!("Building {} backend", kind);

        let payments: Arc<dyn PaymentProver> = Arc::new(ViewKeyDisclosure::new(self.view_key()?));
        let backend = match kind {
            BackendKind::Real => self.build_real(payments).await?,
            BackendKind::Simulated => self.build_simulated(payments),
        };
        info!(
            "Backend ready: {} ({} seed notes, event monitor: {})",
            backend.kind,
            backend.seed_notes.len(),
            backend.monitor.is_some()
        );
        Ok(backend)
    }

    fn view_key(&self) -> Result<ViewKey> {
        match &self.config.wallet.view_key {
            Some(hex) => ViewKey::from_hex(hex)
                .map_err(|e| WalletError::Config(format!("invalid wallet.view_key: {e}"))),
            None => {
                warn!("No wallet.view_key configured, generating one for this session");
                Ok(ViewKey::random(&mut rand::thread_rng()))
            }
        }
    }

    async fn build_real(&self, payments: Arc<dyn PaymentProver>) -> Result<Backend> {
        let config = &self.config;
        let request_timeout = Duration::from_secs(config.relay.request_timeout_secs);

        let prover_url = config.prover.url.clone().ok_or_else(|| {
            WalletError::Config("real backend requires prover.url".into())
        })?;
        let verifier_key =
            load_verifier_key(&config.circuits.transfer_vkey, &build_client(request_timeout)?).await?;
        let prover = HttpProver::new(
            HttpProverConfig {
                url: prover_url,
                transfer_wasm: config.circuits.transfer_wasm.clone(),
                transfer_zkey: config.circuits.transfer_zkey.clone(),
                request_timeout: Duration::from_secs(config.prover.proof_timeout_secs),
            },
            verifier_key,
        )?;
        if !prover.health_check().await {
            warn!("Prover service did not answer its health check");
        }

        let relay: Arc<dyn Relay> = match &self.relay {
            Some(relay) => relay.clone(),
            None => Arc::new(HttpRelay::new(HttpRelayConfig {
                url: config.relay.url.clone(),
                api_key: config.relay.api_key.clone(),
                request_timeout,
            })?),
        };

        let wallet: Arc<dyn WalletProvider> = match (&self.wallet, &config.wallet.signer_url) {
            (Some(wallet), _) => wallet.clone(),
            (None, Some(url)) => Arc::new(JsonRpcWallet::new(url.clone(), request_timeout)?),
            (None, None) => {
                return Err(WalletError::Config(
                    "real backend requires wallet.signer_url or an injected wallet provider".into(),
                ));
            }
        };

        Ok(Backend {
            kind: BackendKind::Real,
            prover: Arc::new(prover),
            payments,
            relay,
            wallet,
            monitor: self.monitor.clone(),
            seed_notes: Vec::new(),
        })
    }

    fn build_simulated(&self, payments: Arc<dyn PaymentProver>) -> Backend {
        let backend = &self.config.backend;
        let prover = SimulatedProver::new()
            .with_latency(Duration::from_millis(backend.simulated_latency_ms))
            .with_failure_rate(backend.verify_failure_rate);

        // demo notes are only spendable against a tree we can seed
        let (relay, seed_notes): (Arc<dyn Relay>, Vec<Note>) = match &self.relay {
            Some(relay) => (relay.clone(), Vec::new()),
            None => {
                let relay = SimulatedRelay::new();
                let notes = if backend.seed_demo_notes {
                    demo_notes(&relay)
                } else {
                    Vec::new()
                };
                (Arc::new(relay), notes)
            }
        };

        Backend {
            kind: BackendKind::Simulated,
            prover: Arc::new(prover),
            payments,
            relay,
            wallet: self
                .wallet
                .clone()
                .unwrap_or_else(|| Arc::new(SimulatedWallet::new())),
            monitor: self.monitor.clone(),
            seed_notes,
        }
    }
}

fn demo_notes(relay: &SimulatedRelay) -> Vec<Note> {
    let mut rng = rand::thread_rng();
    DEMO_NOTE_AMOUNTS
        .iter()
        .map(|amount| {
            let note = Note::create(NoteValue::new(*amount), DEMO_NOTE_OWNER, &mut rng);
            relay.insert_commitment(&note.commitment);
            note
        })
        .collect()
}

/// Selection rule. An unset mode falls back to simulated only in debug
/// builds; a release build additionally needs `allow_simulated`.
fn resolve_kind(mode: Option<BackendMode>, allow_simulated: bool, debug_build: bool) -> Result<BackendKind> {
    match (mode, debug_build) {
        (Some(BackendMode::Real), _) => Ok(BackendKind::Real),
        (Some(BackendMode::Simulated), true) => Ok(BackendKind::Simulated),
        (Some(BackendMode::Simulated), false) if allow_simulated => Ok(BackendKind::Simulated),
        (Some(BackendMode::Simulated), false) => Err(WalletError::Config(
            "simulated backend in a release build requires backend.allow_simulated = true".into(),
        )),
        (None, true) => {
            warn!("backend.mode is not set, using the simulated backend (debug build)");
            Ok(BackendKind::Simulated)
        }
        (None, false) => Err(WalletError::Config(
            "backend.mode must be set to \"real\" or \"simulated\"".into(),
        )),
    }
}
