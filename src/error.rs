//! Wallet error taxonomy
//!
//! Precondition failures (`NotConnected`, `InvalidRecipient`, `InvalidAmount`,
//! `InvalidTokenUri`) are returned synchronously and never create a
//! transaction record. Post-submission failures are converted into a
//! [`TxOutcome::Errored`](crate::session::TxOutcome) by the store and only
//! surface through the failed queue.

use thiserror::Error;

pub type WalletResult<T> = Result<T, WalletError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("No compatible wallet provider detected. Please install a wallet to continue.")]
    ProviderUnavailable,

    #[error("Request rejected by user")]
    UserRejected,

    #[error("No accounts found. Please connect your wallet.")]
    NoAccounts,

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid token URI")]
    InvalidTokenUri,

    #[error("Timed out waiting for {confirmations} confirmation(s) of {hash}")]
    ConfirmationTimeout { hash: String, confirmations: u64 },

    #[error("Read failed: {0}")]
    TransientReadFailure(String),

    #[error("Connect aborted by disconnect")]
    ConnectAborted,

    #[error("Session closed")]
    SessionClosed,

    #[error("Provider error: {0}")]
    Provider(String),
}

impl WalletError {
    /// True for failures caught before a transaction record exists.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            WalletError::NotConnected
                | WalletError::InvalidRecipient(_)
                | WalletError::InvalidAmount(_)
                | WalletError::InvalidTokenUri
        )
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for WalletError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self { WalletError::SessionClosed }
}

impl From<tokio::sync::oneshot::error::RecvError> for WalletError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self { WalletError::SessionClosed }
}
