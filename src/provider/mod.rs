//! Provider - the wallet boundary
//!
//! [`WalletProvider`] is the contract an injected wallet (browser extension,
//! EIP-1193 bridge, test double) fulfils. [`ProviderAdapter`] is the only code
//! path that talks to it: it caches the signer, maps raw failures onto the
//! wallet error taxonomy and fans pushed events out to subscribers.
//!
//! ```text
//! SessionStore ──calls──▶ ProviderAdapter ──▶ dyn WalletProvider
//!      ▲                        │
//!      └──── typed events ◀─────┘  (accountsChanged / chainChanged pump)
//! ```

mod adapter;
pub mod simulated;

pub use adapter::{
    accounts_handler, chain_handler, AccountsHandler, ChainHandler, Connection, HandlerFuture, PendingTx, ProviderAdapter,
};
pub use simulated::{ReceiptPlan, SimulatedProvider};

use crate::core::{Address, TxHash, Wei};
use crate::error::WalletResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What a submitted transaction does beyond moving value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxPayload {
    Transfer,
    NftMint { token_uri: String },
}

impl TxPayload {
    pub fn is_mint(&self) -> bool { matches!(self, TxPayload::NftMint { .. }) }
}

/// Transaction as handed to the provider for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: Wei,
    pub payload: TxPayload,
    pub gas: Option<u64>,
    pub gas_price: Option<Wei>,
}

/// Inclusion record for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    /// `false` means the transaction was included but reverted.
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<u64>,
}

/// Notifications the wallet pushes on its own initiative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(u64),
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Whether a compatible wallet is injected at all.
    fn is_available(&self) -> bool;

    /// Prompt for account access; first address is the active one.
    async fn request_accounts(&self) -> WalletResult<Vec<String>>;

    /// Accounts already granted, without prompting.
    async fn accounts(&self) -> WalletResult<Vec<String>>;

    async fn chain_id(&self) -> WalletResult<u64>;

    async fn get_balance(&self, address: &Address) -> WalletResult<Wei>;

    async fn gas_price(&self) -> WalletResult<Wei>;

    async fn estimate_gas(&self, request: &TxRequest) -> WalletResult<u64>;

    /// Sign and broadcast. Returns as soon as a hash exists.
    async fn send_transaction(&self, request: &TxRequest) -> WalletResult<TxHash>;

    /// Resolve once `confirmations` blocks include the transaction.
    async fn wait_for_receipt(&self, hash: &TxHash, confirmations: u64) -> WalletResult<Receipt>;

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}
