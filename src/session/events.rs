//! Observable output of the store: transition events and full snapshots

use super::state::{ConnectionStatus, Session};
use super::transactions::{Transaction, TransactionQueues, TxKind, TxOutcome, TxStatus};
use crate::core::{Address, Network, TxHash};
use serde::Serialize;

/// One event per observable transition. Presentation layers (toasts,
/// banners, logs) react to these instead of the store calling into them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ConnectionChanged {
        status: ConnectionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        account: Option<Address>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    AccountChanged { account: Address },
    NetworkChanged { network: Network },
    BalanceChanged { balance: String },
    TransactionSubmitted { hash: TxHash, kind: TxKind },
    TransactionSettled { hash: TxHash, status: TxStatus, outcome: TxOutcome },
}

impl SessionEvent {
    pub fn connection(session: &Session) -> Self {
        SessionEvent::ConnectionChanged {
            status: session.status,
            account: session.account.clone(),
            error: session.last_error.clone(),
        }
    }

    pub fn settled(tx: &Transaction) -> Option<Self> {
        let outcome = tx.result.clone()?;
        Some(SessionEvent::TransactionSettled { hash: tx.hash.clone(), status: tx.status, outcome })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::ConnectionChanged { .. } => "connection_changed",
            SessionEvent::AccountChanged { .. } => "account_changed",
            SessionEvent::NetworkChanged { .. } => "network_changed",
            SessionEvent::BalanceChanged { .. } => "balance_changed",
            SessionEvent::TransactionSubmitted { .. } => "transaction_submitted",
            SessionEvent::TransactionSettled { .. } => "transaction_settled",
        }
    }
}

/// Everything a UI renders: the session plus the three queues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub transactions: TransactionQueues,
}

impl SessionSnapshot {
    pub fn current_transaction(&self) -> Option<&Transaction> { self.transactions.current() }

    pub fn status_of(&self, hash: &TxHash) -> Option<TxStatus> { self.transactions.locate(hash) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let event = SessionEvent::connection(&Session::errored("Request rejected by user"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "connection_changed");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "Request rejected by user");
        assert!(json.get("account").is_none());
        assert_eq!(event.name(), "connection_changed");
    }
}
