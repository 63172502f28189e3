//! SimulatedProvider - in-process wallet for demos and tests
//!
//! Behaves like an injected wallet on a local chain: accounts, balances and
//! a chain id that can be switched from the outside (which pushes the same
//! notifications a browser wallet would), plus scriptable receipts.

use super::{ProviderEvent, Receipt, TxPayload, TxRequest, WalletProvider};
use crate::core::{Address, TxHash, Wei};
use crate::error::{WalletError, WalletResult};
use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

const DEFAULT_ACCOUNTS: [&str; 2] = [
    "0x1000000000000000000000000000000000000001",
    "0x2000000000000000000000000000000000000002",
];
const TRANSFER_GAS: u64 = 21_000;
const MINT_GAS: u64 = 125_000;

/// How the next submitted transaction resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptPlan {
    Confirm,
    Revert,
    Fail(String),
    /// Never included; only a timeout ends the wait.
    Never,
}

#[derive(Debug, Clone)]
struct Sent {
    plan: ReceiptPlan,
    mint: bool,
    gas: u64,
}

struct SimState {
    installed: bool,
    accounts: Vec<Address>,
    chain_id: u64,
    balances: HashMap<Address, Wei>,
    default_balance: Wei,
    gas_price: Wei,
    nonce: u64,
    block: u64,
    reject_connect: bool,
    reject_next_send: bool,
    failing_reads: bool,
    confirmation_delay: Duration,
    plans: VecDeque<ReceiptPlan>,
    sent: HashMap<TxHash, Sent>,
}

pub struct SimulatedProvider {
    state: Mutex<SimState>,
    events: broadcast::Sender<ProviderEvent>,
    connect_gate: watch::Sender<bool>,
    connect_requests: AtomicUsize,
}

impl Default for SimulatedProvider {
    fn default() -> Self { Self::new() }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        let accounts = DEFAULT_ACCOUNTS.iter().filter_map(|a| Address::parse(a).ok()).collect();
        let (events, _) = broadcast::channel(64);
        let (connect_gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(SimState {
                installed: true,
                accounts,
                chain_id: 1,
                balances: HashMap::new(),
                default_balance: Wei(1_500_000_000_000_000_000),
                gas_price: Wei::from_gwei(20),
                nonce: 0,
                block: 1_000,
                reject_connect: false,
                reject_next_send: false,
                failing_reads: false,
                confirmation_delay: Duration::from_millis(10),
                plans: VecDeque::new(),
                sent: HashMap::new(),
            }),
            events,
            connect_gate,
            connect_requests: AtomicUsize::new(0),
        }
    }

    /// No wallet injected: `is_available` reports false.
    pub fn uninstalled(self) -> Self { self.state().installed = false; self }

    pub fn with_accounts(self, accounts: Vec<Address>) -> Self { self.state().accounts = accounts; self }

    pub fn with_chain_id(self, chain_id: u64) -> Self { self.state().chain_id = chain_id; self }

    pub fn with_balance(self, account: &Address, balance: Wei) -> Self {
        self.state().balances.insert(account.clone(), balance);
        self
    }

    pub fn with_confirmation_delay(self, delay: Duration) -> Self { self.state().confirmation_delay = delay; self }

    pub fn active_account(&self) -> Option<Address> { self.state().accounts.first().cloned() }

    pub fn accounts_snapshot(&self) -> Vec<Address> { self.state().accounts.clone() }

    pub fn set_reject_connect(&self, reject: bool) { self.state().reject_connect = reject; }

    pub fn reject_next_send(&self) { self.state().reject_next_send = true; }

    pub fn set_failing_reads(&self, failing: bool) { self.state().failing_reads = failing; }

    pub fn set_balance(&self, account: &Address, balance: Wei) { self.state().balances.insert(account.clone(), balance); }

    /// Outcome for the next `send_transaction`; unplanned sends confirm.
    pub fn plan_next(&self, plan: ReceiptPlan) { self.state().plans.push_back(plan); }

    /// Hold `request_accounts` open, as if the approval dialog were showing.
    pub fn hold_connect(&self) { self.connect_gate.send_replace(false); }

    pub fn release_connect(&self) { self.connect_gate.send_replace(true); }

    pub fn connect_requests(&self) -> usize { self.connect_requests.load(Ordering::SeqCst) }

    pub fn sent_count(&self) -> usize { self.state().sent.len() }

    /// User picked another account in the wallet UI.
    pub fn switch_account(&self, account: Address) {
        let accounts = {
            let mut state = self.state();
            state.accounts.retain(|a| a != &account);
            state.accounts.insert(0, account);
            state.accounts.clone()
        };
        self.push_accounts(&accounts);
    }

    /// User disconnected the site from inside the wallet.
    pub fn revoke_accounts(&self) {
        self.state().accounts.clear();
        self.push_accounts(&[]);
    }

    pub fn switch_chain(&self, chain_id: u64) {
        self.state().chain_id = chain_id;
        let _ = self.events.send(ProviderEvent::ChainChanged(chain_id));
    }

    /// Push a raw `accountsChanged` without touching wallet state.
    pub fn emit(&self, event: ProviderEvent) { let _ = self.events.send(event); }

    fn push_accounts(&self, accounts: &[Address]) {
        let raw = accounts.iter().map(|a| a.to_string()).collect();
        let _ = self.events.send(ProviderEvent::AccountsChanged(raw));
    }

    fn state(&self) -> MutexGuard<'_, SimState> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    fn check_reads(&self) -> WalletResult<()> {
        if self.state().failing_reads {
            return Err(WalletError::Provider("node unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletProvider for SimulatedProvider {
    fn is_available(&self) -> bool { self.state().installed }

    async fn request_accounts(&self) -> WalletResult<Vec<String>> {
        self.connect_requests.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.connect_gate.subscribe();
        while !*gate.borrow_and_update() {
            gate.changed().await.map_err(|_| WalletError::ProviderUnavailable)?;
        }
        let state = self.state();
        if state.reject_connect {
            return Err(WalletError::UserRejected);
        }
        Ok(state.accounts.iter().map(|a| a.to_string()).collect())
    }

    async fn accounts(&self) -> WalletResult<Vec<String>> {
        self.check_reads()?;
        Ok(self.state().accounts.iter().map(|a| a.to_string()).collect())
    }

    async fn chain_id(&self) -> WalletResult<u64> {
        self.check_reads()?;
        Ok(self.state().chain_id)
    }

    async fn get_balance(&self, address: &Address) -> WalletResult<Wei> {
        self.check_reads()?;
        let state = self.state();
        Ok(state.balances.get(address).copied().unwrap_or(state.default_balance))
    }

    async fn gas_price(&self) -> WalletResult<Wei> { Ok(self.state().gas_price) }

    async fn estimate_gas(&self, request: &TxRequest) -> WalletResult<u64> {
        Ok(if request.payload.is_mint() { MINT_GAS } else { TRANSFER_GAS })
    }

    async fn send_transaction(&self, request: &TxRequest) -> WalletResult<TxHash> {
        let mut state = self.state();
        if std::mem::take(&mut state.reject_next_send) {
            return Err(WalletError::UserRejected);
        }
        state.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(request.from.as_str().as_bytes());
        hasher.update(request.to.as_str().as_bytes());
        hasher.update(request.value.0.to_be_bytes());
        hasher.update(state.nonce.to_be_bytes());
        if let TxPayload::NftMint { token_uri } = &request.payload {
            hasher.update(token_uri.as_bytes());
        }
        let hash = TxHash::new(format!("0x{}", hex::encode(hasher.finalize())));
        let plan = state.plans.pop_front().unwrap_or(ReceiptPlan::Confirm);
        let gas = request.gas.unwrap_or(TRANSFER_GAS);
        state.sent.insert(hash.clone(), Sent { plan, mint: request.payload.is_mint(), gas });
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: &TxHash, confirmations: u64) -> WalletResult<Receipt> {
        let (sent, delay) = {
            let state = self.state();
            let sent = state
                .sent
                .get(hash)
                .cloned()
                .ok_or_else(|| WalletError::Provider(format!("unknown transaction {}", hash)))?;
            (sent, state.confirmation_delay)
        };
        if sent.plan == ReceiptPlan::Never {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(delay * confirmations.max(1) as u32).await;

        let status = match sent.plan {
            ReceiptPlan::Fail(message) => return Err(WalletError::Provider(message)),
            ReceiptPlan::Revert => false,
            _ => true,
        };
        let block_number = {
            let mut state = self.state();
            state.block += 1;
            state.block
        };
        let token_id = (sent.mint && status).then(|| rand::thread_rng().gen_range(1..=10_000));
        Ok(Receipt {
            transaction_hash: hash.clone(),
            block_number,
            gas_used: sent.gas * 5 / 6,
            status,
            token_id,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> { self.events.subscribe() }
}
