//! ProviderAdapter - signer cache, error mapping, event fan-out

use super::{ProviderEvent, Receipt, TxPayload, TxRequest, WalletProvider};
use crate::core::{Address, Network, TxHash, Wei};
use crate::error::{WalletError, WalletResult};
use crate::session::SessionConfig;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type AccountsHandler = Arc<dyn Fn(Vec<Address>) -> HandlerFuture + Send + Sync>;
pub type ChainHandler = Arc<dyn Fn(u64) -> HandlerFuture + Send + Sync>;

pub fn accounts_handler<F, Fut>(f: F) -> AccountsHandler
where
    F: Fn(Vec<Address>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |accounts: Vec<Address>| -> HandlerFuture { Box::pin(f(accounts)) })
}

pub fn chain_handler<F, Fut>(f: F) -> ChainHandler
where
    F: Fn(u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |chain_id: u64| -> HandlerFuture { Box::pin(f(chain_id)) })
}

/// Result of a successful `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub account: Address,
    pub network: Network,
    pub balance: Wei,
}

/// Handle for a submitted, not yet confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx {
    pub hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub value: Wei,
    pub gas: u64,
    pub gas_price: Wei,
}

#[derive(Default)]
struct Listeners {
    accounts: Vec<AccountsHandler>,
    chains: Vec<ChainHandler>,
    pump: Option<JoinHandle<()>>,
    /// Receiver opened before the connect reads; the next pump starts from it.
    primed: Option<broadcast::Receiver<ProviderEvent>>,
}

// Every disconnect bumps the generation; a connect only caches its signer
// if no disconnect happened while it was in flight.
#[derive(Default)]
struct SignerSlot {
    account: Option<Address>,
    generation: u64,
}

pub struct ProviderAdapter {
    provider: Arc<dyn WalletProvider>,
    signer: Mutex<SignerSlot>,
    listeners: Arc<Mutex<Listeners>>,
    confirmation_timeout: Duration,
    gas_buffer_percent: u64,
    mint_gas_limit: u64,
}

impl ProviderAdapter {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self::from_config(provider, &SessionConfig::default())
    }

    pub fn from_config(provider: Arc<dyn WalletProvider>, config: &SessionConfig) -> Self {
        Self {
            provider,
            signer: Mutex::new(SignerSlot::default()),
            listeners: Arc::new(Mutex::new(Listeners::default())),
            confirmation_timeout: config.confirmation_timeout,
            gas_buffer_percent: config.gas_buffer_percent,
            mint_gas_limit: config.mint_gas_limit,
        }
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self { self.confirmation_timeout = timeout; self }

    pub fn is_connected(&self) -> bool { self.signer().is_some() }

    /// Request account access and read the initial network and balance.
    ///
    /// Provider events are captured from before the first read, so a switch
    /// that lands while connecting reaches the first subscriber. Fails with
    /// `ConnectAborted` when [`disconnect`](Self::disconnect) ran meanwhile.
    pub async fn connect(&self) -> WalletResult<Connection> {
        if !self.provider.is_available() {
            return Err(WalletError::ProviderUnavailable);
        }
        let generation = lock(&self.signer).generation;
        let events = self.provider.subscribe();
        let accounts = self.provider.request_accounts().await?;
        let first = accounts.first().ok_or(WalletError::NoAccounts)?;
        let account = Address::parse(first)
            .map_err(|_| WalletError::Provider(format!("malformed account from wallet: {}", first)))?;
        let chain_id = self.provider.chain_id().await?;
        let balance = self.provider.get_balance(&account).await?;

        let mut slot = lock(&self.signer);
        if slot.generation != generation {
            debug!(%account, "connect outlived a disconnect, not caching signer");
            return Err(WalletError::ConnectAborted);
        }
        slot.account = Some(account.clone());
        lock(&*self.listeners).primed = Some(events);
        drop(slot);
        Ok(Connection { account, network: Network::from_chain_id(chain_id), balance })
    }

    /// Drop the cached signer and all listeners. Wallets have no remote
    /// disconnect, so this is purely local.
    pub fn disconnect(&self) {
        {
            let mut slot = lock(&self.signer);
            slot.account = None;
            slot.generation += 1;
        }
        self.unsubscribe_all();
        lock(&*self.listeners).primed = None;
    }

    /// Sign from `account` from now on. No-op while disconnected.
    pub fn adopt_account(&self, account: Address) {
        let mut slot = lock(&self.signer);
        if slot.account.is_some() {
            slot.account = Some(account);
        }
    }

    pub async fn current_account(&self) -> WalletResult<Address> {
        self.require_signer()?;
        let accounts = self.provider.accounts().await.map_err(read_failure)?;
        let first = accounts.first().ok_or(WalletError::NoAccounts)?;
        Address::parse(first).map_err(|_| WalletError::TransientReadFailure(format!("malformed account: {}", first)))
    }

    pub async fn current_network(&self) -> WalletResult<Network> {
        self.require_signer()?;
        let chain_id = self.provider.chain_id().await.map_err(read_failure)?;
        Ok(Network::from_chain_id(chain_id))
    }

    pub async fn balance_of(&self, address: &Address) -> WalletResult<Wei> {
        self.require_signer()?;
        self.provider.get_balance(address).await.map_err(read_failure)
    }

    /// Sign and broadcast. Returns once the wallet hands back a hash;
    /// confirmation is [`await_confirmation`](Self::await_confirmation).
    pub async fn submit_transaction(&self, to: &str, value: Wei, payload: TxPayload) -> WalletResult<PendingTx> {
        let from = self.require_signer()?;
        let to = Address::parse(to)?;
        if value.is_zero() && !payload.is_mint() {
            return Err(WalletError::InvalidAmount(value.to_string()));
        }

        let mut request = TxRequest { from: from.clone(), to: to.clone(), value, payload, gas: None, gas_price: None };
        let gas_price = self.provider.gas_price().await?;
        let gas = if request.payload.is_mint() {
            self.mint_gas_limit
        } else {
            let estimate = self.provider.estimate_gas(&request).await?;
            estimate.saturating_mul(100 + self.gas_buffer_percent) / 100
        };
        request.gas = Some(gas);
        request.gas_price = Some(gas_price);

        let hash = self.provider.send_transaction(&request).await?;
        debug!(%hash, %to, gas, "transaction submitted");
        Ok(PendingTx { hash, from, to, value, gas, gas_price })
    }

    /// Wait for inclusion. A reverted receipt is returned as `Ok` with
    /// `status == false`. Does not need a live signer, so confirmations
    /// of transactions sent before a disconnect still resolve.
    pub async fn await_confirmation(&self, hash: &TxHash, confirmations: u64) -> WalletResult<Receipt> {
        match tokio::time::timeout(self.confirmation_timeout, self.provider.wait_for_receipt(hash, confirmations)).await {
            Ok(result) => result,
            Err(_) => Err(WalletError::ConfirmationTimeout { hash: hash.to_string(), confirmations }),
        }
    }

    pub fn subscribe_account_changes(&self, handler: AccountsHandler) {
        lock(&*self.listeners).accounts.push(handler);
        self.ensure_pump();
    }

    pub fn subscribe_network_changes(&self, handler: ChainHandler) {
        lock(&*self.listeners).chains.push(handler);
        self.ensure_pump();
    }

    /// Register both handlers before the pump starts, so buffered events
    /// of either kind find their handler.
    pub fn subscribe_all(&self, accounts: AccountsHandler, chains: ChainHandler) {
        {
            let mut listeners = lock(&*self.listeners);
            listeners.accounts.push(accounts);
            listeners.chains.push(chains);
        }
        self.ensure_pump();
    }

    pub fn unsubscribe_all(&self) {
        let mut listeners = lock(&*self.listeners);
        listeners.accounts.clear();
        listeners.chains.clear();
        if let Some(pump) = listeners.pump.take() {
            pump.abort();
        }
    }

    pub fn listener_count(&self) -> usize {
        let listeners = lock(&*self.listeners);
        listeners.accounts.len() + listeners.chains.len()
    }

    fn signer(&self) -> Option<Address> { lock(&self.signer).account.clone() }

    fn require_signer(&self) -> WalletResult<Address> { self.signer().ok_or(WalletError::NotConnected) }

    // One pump per subscription period; handlers run in delivery order.
    fn ensure_pump(&self) {
        let mut guard = lock(&*self.listeners);
        if guard.pump.as_ref().map(|p| !p.is_finished()).unwrap_or(false) {
            return;
        }
        let mut rx = guard.primed.take().unwrap_or_else(|| self.provider.subscribe());
        let listeners = self.listeners.clone();
        guard.pump = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ProviderEvent::AccountsChanged(raw)) => {
                        let accounts: Vec<Address> = raw
                            .iter()
                            .filter_map(|a| match Address::parse(a) {
                                Ok(addr) => Some(addr),
                                Err(_) => { warn!(account = %a, "ignoring malformed account from wallet"); None }
                            })
                            .collect();
                        if accounts.is_empty() && !raw.is_empty() {
                            warn!(entries = raw.len(), "dropping accountsChanged with no usable account");
                            continue;
                        }
                        let handlers = lock(&*listeners).accounts.clone();
                        for handler in handlers {
                            handler(accounts.clone()).await;
                        }
                    }
                    Ok(ProviderEvent::ChainChanged(chain_id)) => {
                        let handlers = lock(&*listeners).chains.clone();
                        for handler in handlers {
                            handler(chain_id).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "provider events lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }
}

impl Drop for ProviderAdapter {
    fn drop(&mut self) { self.unsubscribe_all(); }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

fn read_failure(err: WalletError) -> WalletError {
    match err {
        WalletError::Provider(msg) => WalletError::TransientReadFailure(msg),
        other => other,
    }
}
