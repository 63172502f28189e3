//! wallet-session: wallet connection state and transaction lifecycle.
//!
//! # Architecture
//!
//! ```text
//! UI / CLI
//!   │  connect · disconnect · send · mint        ▲ watch<SessionSnapshot>
//!   ▼                                            │ broadcast<SessionEvent>
//! SessionHandle ──▶ SessionStore (actor task) ───┘
//!                     ├── Session          (Disconnected | Connecting | Connected | Error)
//!                     ├── TransactionQueues (pending → completed | failed, exactly once)
//!                     └── ProviderAdapter  (signer cache, error mapping, event pump)
//!                           └── dyn WalletProvider  (injected wallet / SimulatedProvider)
//! ```
//!
//! # Guarantees
//!
//! | Property | Where |
//! |----------|-------|
//! | One writer for all session state | [`SessionStore`] inbox |
//! | `account`/`network`/`balance` set iff Connected | [`Session::is_consistent`] |
//! | A hash lives in exactly one queue | [`TransactionQueues`] |
//! | Settling twice is a no-op | [`TransactionQueues::resolve`] |
//! | Concurrent `connect()` calls share one provider request | [`SessionHandle::connect`] |
//! | Pushes from a closed session are ignored | epoch check in the store |
//!
//! # Features
//!
//! - `native` - log subscriber, signal handling and the `wallet-session` binary
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use wallet_session::{start_session, SessionConfig, Shutdown, SimulatedProvider};
//!
//! let shutdown = Shutdown::new();
//! let wallet = Arc::new(SimulatedProvider::new());
//! let session = start_session(wallet, SessionConfig::default(), shutdown.subscribe());
//!
//! session.connect().await?;
//! let tx = session.send("0x00000000000000000000000000000000000000b0", "0.1").await?;
//! let settled = session.settled(&tx.hash).await?;
//! ```

// =============================================================================
// Shared modules
// =============================================================================
pub mod core;
pub mod error;
pub mod provider;
pub mod runtime;
pub mod session;

// =============================================================================
// Native-only modules (CLI, log subscriber)
// =============================================================================
#[cfg(feature = "native")]
pub mod logging;

// =============================================================================
// Re-exports
// =============================================================================
pub use crate::core::{known_networks, network_name, parse_chain_id, Address, Network, TxHash, Wei};
pub use error::{WalletError, WalletResult};
pub use provider::{ProviderAdapter, ProviderEvent, Receipt, SimulatedProvider, TxPayload, WalletProvider};
pub use runtime::Shutdown;
pub use session::{
    start_session, ConnectionStatus, Session, SessionConfig, SessionEvent, SessionHandle, SessionSnapshot, SessionStore,
    Transaction, TransactionQueues, TxKind, TxOutcome, TxStatus,
};

#[cfg(feature = "native")]
pub use runtime::install_signal_handlers;
