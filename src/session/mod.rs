//! Session - connection state machine and transaction lifecycle
//!
//! | Piece | Role |
//! |-------|------|
//! | [`SessionStore`] | Actor task owning all state |
//! | [`SessionHandle`] | Commands (`connect`, `disconnect`, `send`, `mint`) and observation |
//! | [`TransactionQueues`] | pending / completed / failed, exactly-once settlement |
//! | [`SessionEvent`] | One event per observable transition |

mod config;
mod events;
mod state;
mod store;
mod transactions;

pub use config::{SessionConfig, DEFAULT_NFT_CONTRACT};
pub use events::{SessionEvent, SessionSnapshot};
pub use state::{ConnectionStatus, Session};
pub use store::{start_session, SessionHandle, SessionStore};
pub use transactions::{Resolution, Transaction, TransactionQueues, TxKind, TxOutcome, TxStatus, REVERTED};
