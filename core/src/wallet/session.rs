use std::sync::{Arc, RwLock};

use log::{info, warn};
use tokio::sync::Mutex;

use super::WalletProvider;
use crate::error::{Result, WalletError};

/// Connection state of the holder's wallet. The only source of spend
/// permission: operations that move value call [`WalletSession::require_address`].
pub struct WalletSession {
    provider: Arc<dyn WalletProvider>,
    address: RwLock<Option<String>>,
    /// Serializes connect/disconnect round-trips
    transition: Mutex<()>,
}

impl WalletSession {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self {
            provider,
            address: RwLock::new(None),
            transition: Mutex::new(()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.provider
    }

    /// Idempotent: an existing connection is returned as is.
    pub async fn connect(&self) -> Result<String> {
        let _guard = self.transition.lock().await;
        if let Some(address) = self.address() {
            return Ok(address);
        }
        let address = self.provider.connect().await?;
        if address.trim().is_empty() {
            return Err(WalletError::Connection("signer returned no account".into()));
        }
        info!("Wallet connected: {}", address);
        *self.address.write().unwrap_or_else(|p| p.into_inner()) = Some(address.clone());
        Ok(address)
    }

    /// No-op when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        if self.address().is_none() {
            return Ok(());
        }
        if let Err(e) = self.provider.disconnect().await {
            warn!("Signer disconnect failed: {}", e);
        }
        *self.address.write().unwrap_or_else(|p| p.into_inner()) = None;
        info!("Wallet disconnected");
        Ok(())
    }

    pub fn address(&self) -> Option<String> {
        self.address.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.address().is_some()
    }

    pub fn require_address(&self) -> Result<String> {
        self.address().ok_or(WalletError::NotConnected)
    }
}
