//! CipherPay wallet core
//!
//! Client-side core of a privacy-preserving payment wallet: it tracks the
//! holder's shielded notes, proves and submits transfers through a relay,
//! and reads the relay's commitment tree.
//!
//! ```text
//!                         ┌──────────────────────┐
//!                         │   CipherPayService   │
//!                         └──────────┬───────────┘
//!                                    │
//!                    ┌───────────────▼────────────────┐
//!                    │    TransactionOrchestrator     │
//!                    └──┬──────┬──────────┬────────┬──┘
//!                       │      │          │        │
//!              ┌────────▼┐ ┌───▼─────┐ ┌──▼─────┐ ┌▼──────────────┐
//!              │NoteStore│ │ Wallet  │ │ Merkle │ │ ProofGateway  │
//!              │         │ │ Session │ │ Query  │ │               │
//!              └─────────┘ └────┬────┘ └───┬────┘ └──────┬────────┘
//!                               │          │             │
//!                    ┌──────────▼──────────▼─────────────▼─────────┐
//!                    │   Backend (chosen once by BackendSelector)  │
//!                    │   WalletProvider · Relay · TransferProver   │
//!                    └─────────────────────────────────────────────┘
//! ```

pub mod address;
pub mod backend;
pub mod error;
pub mod http;
pub mod merkle;
pub mod notes;
pub mod orchestrator;
pub mod proof;
pub mod relay;
pub mod retry;
pub mod service;
pub mod wallet;

pub use backend::{Backend, BackendKind, BackendSelector};
pub use error::{Result, WalletError};
pub use merkle::{CacheStats, MerkleQueryClient};
pub use notes::NoteStore;
pub use orchestrator::{PreparedTransfer, TransactionOrchestrator, TransferStage};
pub use proof::ProofGateway;
pub use service::{CipherPayService, ServiceStatus};
pub use wallet::WalletSession;
