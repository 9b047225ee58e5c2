use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cipherpay_privacy::{NoteValue, to_prefixed_hex};
use log::info;
use rand::Rng;

use super::WalletProvider;
use crate::error::{Result, WalletError};

/// In-process signer with a fixed account.
pub struct SimulatedWallet {
    address: String,
    refuse: bool,
    connects: AtomicUsize,
    deposits: Mutex<Vec<(String, NoteValue)>>,
}

impl SimulatedWallet {
    /// Random Ethereum-style account.
    pub fn new() -> Self {
        let bytes: [u8; 20] = rand::thread_rng().r#gen();
        Self::with_address(to_prefixed_hex(&bytes))
    }

    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            refuse: false,
            connects: AtomicUsize::new(0),
            deposits: Mutex::new(Vec::new()),
        }
    }

    /// A signer that declines every connection request.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new()
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// `(to, amount)` of every deposit sent so far.
    pub fn deposits(&self) -> Vec<(String, NoteValue)> {
        self.deposits.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Default for SimulatedWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for SimulatedWallet {
    async fn connect(&self) -> Result<String> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(WalletError::Connection("user rejected the request".into()));
        }
        Ok(self.address.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn sign_and_send_deposit(&self, from: &str, to: &str, amount: NoteValue) -> Result<String> {
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        let tx_hash = to_prefixed_hex(&bytes);
        info!("Simulated deposit of {} from {} to {}: {}", amount, from, to, tx_hash);
        self.deposits
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((to.to_string(), amount));
        Ok(tx_hash)
    }
}
