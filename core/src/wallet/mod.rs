//! Wallet session and the host-side signer seam.

mod json_rpc;
mod session;
mod simulated;

use async_trait::async_trait;
use cipherpay_privacy::NoteValue;

use crate::error::Result;

pub use json_rpc::JsonRpcWallet;
pub use session::WalletSession;
pub use simulated::SimulatedWallet;

/// External signer holding the user's public account.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the signer for an account; `Connection` if it refuses.
    async fn connect(&self) -> Result<String>;

    async fn disconnect(&self) -> Result<()>;

    /// Sign and broadcast a deposit of `amount` from `from` to `to`.
    /// Returns the transaction reference.
    async fn sign_and_send_deposit(&self, from: &str, to: &str, amount: NoteValue) -> Result<String>;
}

/// Optional on-chain event watcher owned by the service lifecycle.
#[async_trait]
pub trait EventMonitor: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}
