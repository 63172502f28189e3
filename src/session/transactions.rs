//! Transaction records and the pending/completed/failed queues
//!
//! Every known hash lives in exactly one queue. Terminal transitions are
//! one-way and idempotent: resolving an already settled hash is a no-op.

use crate::core::{Address, TxHash, Wei};
use crate::provider::{PendingTx, Receipt, TxPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const REVERTED: &str = "Transaction reverted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Transfer,
    NftMint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self { TxStatus::Pending => "pending", TxStatus::Completed => "completed", TxStatus::Failed => "failed" }
    }
    pub fn is_terminal(&self) -> bool { !matches!(self, TxStatus::Pending) }
}

/// How a transaction left Pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TxOutcome {
    /// Included with a success receipt.
    Confirmed { receipt: Receipt },
    /// Included, but execution reverted.
    Reverted { receipt: Receipt },
    /// The wait itself failed (timeout, node error, wallet error).
    Errored { message: String },
}

impl TxOutcome {
    /// Branch on a receipt's success flag.
    pub fn from_receipt(receipt: Receipt) -> Self {
        if receipt.status { TxOutcome::Confirmed { receipt } } else { TxOutcome::Reverted { receipt } }
    }

    pub fn status(&self) -> TxStatus {
        match self { TxOutcome::Confirmed { .. } => TxStatus::Completed, _ => TxStatus::Failed }
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        match self { TxOutcome::Confirmed { receipt } | TxOutcome::Reverted { receipt } => Some(receipt), TxOutcome::Errored { .. } => None }
    }

    /// Failure text for the failed queue; `None` on success.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            TxOutcome::Confirmed { .. } => None,
            TxOutcome::Reverted { .. } => Some(REVERTED),
            TxOutcome::Errored { message } => Some(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub value: Wei,
    pub gas: u64,
    pub gas_price: Wei,
    pub kind: TxKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TxOutcome>,
}

impl Transaction {
    pub fn pending(handle: PendingTx, payload: &TxPayload) -> Self {
        let (kind, token_uri) = match payload {
            TxPayload::Transfer => (TxKind::Transfer, None),
            TxPayload::NftMint { token_uri } => (TxKind::NftMint, Some(token_uri.clone())),
        };
        Self {
            hash: handle.hash,
            from: handle.from,
            to: handle.to,
            value: handle.value,
            gas: handle.gas,
            gas_price: handle.gas_price,
            kind,
            token_uri,
            created_at: Utc::now(),
            status: TxStatus::Pending,
            result: None,
        }
    }

    pub fn token_id(&self) -> Option<u64> { self.result.as_ref().and_then(|r| r.receipt()).and_then(|r| r.token_id) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Applied(Transaction),
    AlreadySettled(TxStatus),
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionQueues {
    pending: Vec<Transaction>,
    completed: Vec<Transaction>,
    failed: Vec<Transaction>,
    current: Option<TxHash>,
}

impl TransactionQueues {
    pub fn new() -> Self { Self::default() }

    pub fn pending(&self) -> &[Transaction] { &self.pending }
    pub fn completed(&self) -> &[Transaction] { &self.completed }
    pub fn failed(&self) -> &[Transaction] { &self.failed }

    pub fn current_hash(&self) -> Option<&TxHash> { self.current.as_ref() }

    /// The pending transaction the UI is tracking, if any.
    pub fn current(&self) -> Option<&Transaction> {
        let hash = self.current.as_ref()?;
        self.pending.iter().find(|tx| &tx.hash == hash)
    }

    pub fn locate(&self, hash: &TxHash) -> Option<TxStatus> {
        if self.pending.iter().any(|tx| &tx.hash == hash) {
            Some(TxStatus::Pending)
        } else if self.completed.iter().any(|tx| &tx.hash == hash) {
            Some(TxStatus::Completed)
        } else if self.failed.iter().any(|tx| &tx.hash == hash) {
            Some(TxStatus::Failed)
        } else {
            None
        }
    }

    pub fn get(&self, hash: &TxHash) -> Option<&Transaction> {
        self.pending.iter().chain(&self.completed).chain(&self.failed).find(|tx| &tx.hash == hash)
    }

    pub fn len(&self) -> usize { self.pending.len() + self.completed.len() + self.failed.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Track a freshly submitted transaction. Returns false if the hash is
    /// already known anywhere.
    pub fn insert_pending(&mut self, tx: Transaction, make_current: bool) -> bool {
        if self.locate(&tx.hash).is_some() {
            return false;
        }
        if make_current {
            self.current = Some(tx.hash.clone());
        }
        self.pending.push(Transaction { status: TxStatus::Pending, result: None, ..tx });
        true
    }

    pub fn resolve(&mut self, hash: &TxHash, outcome: TxOutcome) -> Resolution {
        let Some(index) = self.pending.iter().position(|tx| &tx.hash == hash) else {
            return match self.locate(hash) {
                Some(status) => Resolution::AlreadySettled(status),
                None => Resolution::Unknown,
            };
        };
        let mut tx = self.pending.remove(index);
        tx.status = outcome.status();
        tx.result = Some(outcome);
        if self.current.as_ref() == Some(hash) {
            self.current = None;
        }
        match tx.status {
            TxStatus::Completed => self.completed.push(tx.clone()),
            _ => self.failed.push(tx.clone()),
        }
        Resolution::Applied(tx)
    }

    pub fn clear_current(&mut self) { self.current = None; }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address { Address::parse(&format!("0x{}", hex::encode([n; 20]))).unwrap() }

    fn tx(hash: &str) -> Transaction {
        Transaction::pending(
            PendingTx { hash: TxHash::from(hash), from: addr(1), to: addr(2), value: Wei(1), gas: 25_200, gas_price: Wei::from_gwei(20) },
            &TxPayload::Transfer,
        )
    }

    fn receipt(hash: &str, status: bool) -> Receipt {
        Receipt { transaction_hash: TxHash::from(hash), block_number: 7, gas_used: 21_000, status, token_id: None }
    }

    fn assert_single_home(queues: &TransactionQueues, hash: &str) {
        let hash = TxHash::from(hash);
        let homes = [queues.pending(), queues.completed(), queues.failed()]
            .iter()
            .filter(|q| q.iter().any(|tx| tx.hash == hash))
            .count();
        assert_eq!(homes, 1, "{hash} must live in exactly one queue");
    }

    #[test]
    fn confirmed_moves_to_completed_and_clears_current() {
        let mut q = TransactionQueues::new();
        assert!(q.insert_pending(tx("0xh1"), true));
        assert_eq!(q.current().map(|t| t.hash.as_str()), Some("0xh1"));

        let res = q.resolve(&TxHash::from("0xh1"), TxOutcome::from_receipt(receipt("0xh1", true)));
        assert!(matches!(res, Resolution::Applied(ref t) if t.status == TxStatus::Completed));
        assert!(q.pending().is_empty());
        assert_eq!(q.completed().len(), 1);
        assert!(q.current_hash().is_none());
        assert_single_home(&q, "0xh1");
    }

    #[test]
    fn revert_lands_in_failed_with_indicator() {
        let mut q = TransactionQueues::new();
        q.insert_pending(tx("0xh1"), true);
        q.resolve(&TxHash::from("0xh1"), TxOutcome::from_receipt(receipt("0xh1", false)));
        assert!(q.completed().is_empty());
        let failed = &q.failed()[0];
        assert_eq!(failed.status, TxStatus::Failed);
        assert_eq!(failed.result.as_ref().and_then(|r| r.error_message()), Some(REVERTED));
    }

    #[test]
    fn duplicate_resolution_is_a_noop() {
        let mut once = TransactionQueues::new();
        once.insert_pending(tx("0xh1"), true);
        let outcome = TxOutcome::from_receipt(receipt("0xh1", true));
        once.resolve(&TxHash::from("0xh1"), outcome.clone());

        let mut twice = once.clone();
        let second = twice.resolve(&TxHash::from("0xh1"), outcome);
        assert_eq!(second, Resolution::AlreadySettled(TxStatus::Completed));
        assert_eq!(once, twice);

        // a conflicting late outcome cannot move it either
        let late = twice.resolve(&TxHash::from("0xh1"), TxOutcome::Errored { message: "boom".into() });
        assert_eq!(late, Resolution::AlreadySettled(TxStatus::Completed));
        assert_eq!(once, twice);
        assert_single_home(&twice, "0xh1");
    }

    #[test]
    fn unknown_and_duplicate_hashes() {
        let mut q = TransactionQueues::new();
        assert_eq!(q.resolve(&TxHash::from("0xnope"), TxOutcome::Errored { message: "x".into() }), Resolution::Unknown);
        assert!(q.insert_pending(tx("0xh1"), false));
        assert!(!q.insert_pending(tx("0xh1"), true));
        assert_eq!(q.len(), 1);
        assert!(q.current().is_none());
    }

    #[test]
    fn current_pointer_only_tracks_its_own_hash() {
        let mut q = TransactionQueues::new();
        q.insert_pending(tx("0xh1"), true);
        q.insert_pending(tx("0xh2"), true);
        q.resolve(&TxHash::from("0xh1"), TxOutcome::Errored { message: "timeout".into() });
        assert_eq!(q.current_hash().map(|h| h.as_str()), Some("0xh2"));
        q.clear_current();
        assert_eq!(q.pending().len(), 1);
        assert!(q.current().is_none());
        for hash in ["0xh1", "0xh2"] {
            assert_single_home(&q, hash);
        }
    }
}
