//! SessionStore - the single owner of session and transaction state
//!
//! The store runs as one tokio task. UI commands, provider pushes and the
//! results of its own provider calls all arrive as [`Message`]s on a single
//! inbox, so every mutation is one step on one task. Provider calls never
//! run on the store task: they are spawned and post their result back.
//!
//! ```text
//! SessionHandle ──command──▶ inbox ──▶ SessionStore ──spawn──▶ ProviderAdapter call
//!       ▲                      ▲            │                        │
//!       │                      ├────────────┼────── result ──────────┘
//!       │                      └── accountsChanged / chainChanged (epoch-tagged)
//!       ├── watch<SessionSnapshot> ◀────────┤
//!       └── broadcast<SessionEvent> ◀───────┘
//! ```
//!
//! Every successful connect and every disconnect bumps the epoch. Provider
//! pushes and refresh results carry the epoch they were issued under and are
//! dropped when it no longer matches.

use super::config::SessionConfig;
use super::events::{SessionEvent, SessionSnapshot};
use super::state::{ConnectionStatus, Session};
use super::transactions::{Resolution, Transaction, TransactionQueues, TxOutcome, TxStatus};
use crate::core::{Address, Network, TxHash, Wei};
use crate::error::{WalletError, WalletResult};
use crate::provider::{accounts_handler, chain_handler, Connection, PendingTx, ProviderAdapter, TxPayload, WalletProvider};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

#[derive(Debug)]
enum Order {
    Transfer { to: String, amount: String },
    Mint { token_uri: String },
}

#[derive(Debug)]
struct Refreshed {
    account: Address,
    /// The account differs from the applied one; all-or-nothing.
    switch: bool,
    network: WalletResult<Network>,
    balance: WalletResult<Wei>,
}

enum Message {
    Connect(oneshot::Sender<WalletResult<Session>>),
    Disconnect(oneshot::Sender<()>),
    Submit { order: Order, reply: oneshot::Sender<WalletResult<Transaction>> },
    Resolve { hash: TxHash, outcome: TxOutcome, reply: Option<oneshot::Sender<bool>> },
    ConnectFinished { attempt: u64, result: WalletResult<Connection> },
    Submitted { epoch: u64, payload: TxPayload, result: WalletResult<PendingTx>, reply: oneshot::Sender<WalletResult<Transaction>> },
    AccountsChanged { epoch: u64, accounts: Vec<Address> },
    ChainChanged { epoch: u64, chain_id: u64 },
    RefreshFinished { epoch: u64, refreshed: Refreshed },
}

// One refresh in flight at a time; pushes that land meanwhile mark it dirty.
#[derive(Debug, Default)]
struct Refresh {
    running: bool,
    dirty: bool,
    target_account: Option<Address>,
    target_chain: Option<u64>,
}

impl Refresh {
    fn settled_at(session: &Session) -> Self {
        Self {
            target_account: session.account.clone(),
            target_chain: session.network.as_ref().map(|n| n.chain_id),
            ..Self::default()
        }
    }
}

/// Cloneable front end to a running store.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<Message>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Connect, or join the attempt already in flight. Returns the session
    /// every joined caller observes.
    pub async fn connect(&self) -> WalletResult<Session> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(Message::Connect(reply)).await?;
        rx.await?
    }

    pub async fn disconnect(&self) -> WalletResult<()> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(Message::Disconnect(reply)).await?;
        Ok(rx.await?)
    }

    /// Send `amount` ether to `to`. Returns once the wallet produced a hash;
    /// the outcome shows up in the queues.
    pub async fn send(&self, to: &str, amount: &str) -> WalletResult<Transaction> {
        self.submit(Order::Transfer { to: to.to_string(), amount: amount.to_string() }).await
    }

    pub async fn mint(&self, token_uri: &str) -> WalletResult<Transaction> {
        self.submit(Order::Mint { token_uri: token_uri.to_string() }).await
    }

    /// Deliver a terminal outcome from outside (e.g. a receipt poller).
    /// Returns false when the hash was unknown or already settled.
    pub async fn resolve(&self, hash: &TxHash, outcome: TxOutcome) -> WalletResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(Message::Resolve { hash: hash.clone(), outcome, reply: Some(reply) }).await?;
        Ok(rx.await?)
    }

    pub fn session(&self) -> Session { self.snapshots.borrow().session.clone() }

    pub fn snapshot(&self) -> SessionSnapshot { self.snapshots.borrow().clone() }

    pub fn current_transaction(&self) -> Option<Transaction> {
        self.snapshots.borrow().current_transaction().cloned()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> { self.snapshots.clone() }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> { self.events.subscribe() }

    /// Resolve with the first snapshot matching `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> WalletResult<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&snapshot) {
                    return Ok(snapshot.clone());
                }
            }
            rx.changed().await.map_err(|_| WalletError::SessionClosed)?;
        }
    }

    /// Wait until `hash` leaves Pending.
    pub async fn settled(&self, hash: &TxHash) -> WalletResult<Transaction> {
        let snapshot = self.wait_for(|s| s.status_of(hash) != Some(TxStatus::Pending)).await?;
        snapshot
            .transactions
            .get(hash)
            .cloned()
            .ok_or_else(|| WalletError::Provider(format!("unknown transaction {}", hash)))
    }

    async fn submit(&self, order: Order) -> WalletResult<Transaction> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(Message::Submit { order, reply }).await?;
        rx.await?
    }
}

pub struct SessionStore {
    actor: Actor,
    sender: mpsc::Sender<Message>,
}

impl SessionStore {
    pub fn new(adapter: Arc<ProviderAdapter>, config: SessionConfig) -> Self {
        let (sender, inbox) = mpsc::channel(config.command_buffer.max(1));
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let actor = Actor {
            adapter,
            config,
            session: Session::disconnected(),
            queues: TransactionQueues::new(),
            epoch: 0,
            attempt: 0,
            waiters: Vec::new(),
            refresh: Refresh::default(),
            inbox,
            outbox: sender.downgrade(),
            snapshots,
            events,
        };
        Self { actor, sender }
    }

    /// Spawn the store task. It stops on `shutdown` or once every handle
    /// and in-flight provider call is gone.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> SessionHandle {
        let handle = SessionHandle {
            sender: self.sender,
            snapshots: self.actor.snapshots.subscribe(),
            events: self.actor.events.clone(),
        };
        tokio::spawn(self.actor.run(shutdown));
        handle
    }
}

/// Build an adapter over `provider` and start a store on it.
pub fn start_session(
    provider: Arc<dyn WalletProvider>,
    config: SessionConfig,
    shutdown: broadcast::Receiver<()>,
) -> SessionHandle {
    let adapter = Arc::new(ProviderAdapter::from_config(provider, &config));
    SessionStore::new(adapter, config).spawn(shutdown)
}

struct Actor {
    adapter: Arc<ProviderAdapter>,
    config: SessionConfig,
    session: Session,
    queues: TransactionQueues,
    epoch: u64,
    attempt: u64,
    waiters: Vec<oneshot::Sender<WalletResult<Session>>>,
    refresh: Refresh,
    inbox: mpsc::Receiver<Message>,
    outbox: mpsc::WeakSender<Message>,
    snapshots: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl Actor {
    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        debug!("session store started");
        // A dropped Shutdown is not a shutdown request.
        let mut detached = false;
        loop {
            tokio::select! {
                signal = shutdown.recv(), if !detached => match signal {
                    Err(RecvError::Closed) => detached = true,
                    _ => {
                        info!("session store shutting down");
                        break;
                    }
                },
                message = self.inbox.recv() => match message {
                    Some(message) => {
                        self.handle(message);
                        self.publish();
                    }
                    None => break,
                },
            }
        }
        self.adapter.unsubscribe_all();
        debug!("session store stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Connect(reply) => self.on_connect(reply),
            Message::Disconnect(reply) => {
                self.disconnect("user request");
                self.publish();
                let _ = reply.send(());
            }
            Message::Submit { order, reply } => self.on_submit(order, reply),
            Message::Resolve { hash, outcome, reply } => {
                let applied = self.on_resolve(&hash, outcome);
                if let Some(reply) = reply {
                    let _ = reply.send(applied);
                }
            }
            Message::ConnectFinished { attempt, result } => self.on_connect_finished(attempt, result),
            Message::Submitted { epoch, payload, result, reply } => self.on_submitted(epoch, payload, result, reply),
            Message::AccountsChanged { epoch, accounts } => self.on_accounts_changed(epoch, accounts),
            Message::ChainChanged { epoch, chain_id } => self.on_chain_changed(epoch, chain_id),
            Message::RefreshFinished { epoch, refreshed } => self.on_refresh_finished(epoch, refreshed),
        }
    }

    // ---------------------------------------------------------------------
    // Connection
    // ---------------------------------------------------------------------

    fn on_connect(&mut self, reply: oneshot::Sender<WalletResult<Session>>) {
        match self.session.status {
            ConnectionStatus::Connected => {
                let _ = reply.send(Ok(self.session.clone()));
            }
            ConnectionStatus::Connecting => {
                debug!(attempt = self.attempt, "connect already in flight, joining it");
                self.waiters.push(reply);
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                self.attempt += 1;
                self.waiters.push(reply);
                self.transition(Session::connecting());

                let adapter = self.adapter.clone();
                let attempt = self.attempt;
                self.spawn_call(async move {
                    let result = adapter.connect().await;
                    Message::ConnectFinished { attempt, result }
                });
            }
        }
    }

    fn on_connect_finished(&mut self, attempt: u64, result: WalletResult<Connection>) {
        if attempt != self.attempt || self.session.status != ConnectionStatus::Connecting {
            debug!(attempt, ok = result.is_ok(), "dropping result of an aborted connect");
            return;
        }

        let waiters = std::mem::take(&mut self.waiters);
        match result {
            Ok(connection) => {
                self.epoch += 1;
                let session = Session::connected(&connection, self.config.balance_precision);
                self.refresh = Refresh::settled_at(&session);
                info!(account = %connection.account, network = %connection.network, "wallet connected");
                self.transition(session);
                self.listen();
                for waiter in waiters {
                    let _ = waiter.send(Ok(self.session.clone()));
                }
            }
            Err(err) => {
                warn!(error = %err, "wallet connect failed");
                self.transition(Session::errored(err.to_string()));
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
    }

    // Route provider pushes for the current epoch into the inbox.
    fn listen(&self) {
        self.adapter.unsubscribe_all();
        let epoch = self.epoch;

        let outbox = self.outbox.clone();
        let accounts = accounts_handler(move |accounts| {
            let outbox = outbox.clone();
            async move {
                if let Some(sender) = outbox.upgrade() {
                    let _ = sender.send(Message::AccountsChanged { epoch, accounts }).await;
                }
            }
        });

        let outbox = self.outbox.clone();
        let chains = chain_handler(move |chain_id| {
            let outbox = outbox.clone();
            async move {
                if let Some(sender) = outbox.upgrade() {
                    let _ = sender.send(Message::ChainChanged { epoch, chain_id }).await;
                }
            }
        });
        self.adapter.subscribe_all(accounts, chains);
    }

    fn disconnect(&mut self, reason: &str) {
        for waiter in std::mem::take(&mut self.waiters) {
            let _ = waiter.send(Err(WalletError::ConnectAborted));
        }
        self.attempt += 1;
        self.epoch += 1;
        self.refresh = Refresh::default();
        self.queues.clear_current();
        self.adapter.disconnect();
        if self.session.status != ConnectionStatus::Disconnected {
            info!(reason, pending = self.queues.pending().len(), "wallet disconnected");
            self.transition(Session::disconnected());
        }
    }

    // ---------------------------------------------------------------------
    // Provider pushes
    // ---------------------------------------------------------------------

    fn on_accounts_changed(&mut self, epoch: u64, accounts: Vec<Address>) {
        if epoch != self.epoch || !self.session.is_connected() {
            warn!(epoch, current = self.epoch, "ignoring accountsChanged from a closed session");
            return;
        }
        let Some(account) = accounts.into_iter().next() else {
            self.disconnect("wallet revoked access");
            return;
        };
        if self.refresh.target_account.as_ref() == Some(&account) {
            debug!(%account, "account unchanged");
            return;
        }
        info!(%account, "wallet switched account");
        self.refresh.target_account = Some(account);
        self.schedule_refresh();
    }

    fn on_chain_changed(&mut self, epoch: u64, chain_id: u64) {
        if epoch != self.epoch || !self.session.is_connected() {
            warn!(epoch, current = self.epoch, "ignoring chainChanged from a closed session");
            return;
        }
        if self.refresh.target_chain == Some(chain_id) {
            debug!(chain_id, "chain unchanged");
            return;
        }
        info!(chain_id, "wallet switched chain");
        self.refresh.target_chain = Some(chain_id);
        self.schedule_refresh();
    }

    fn schedule_refresh(&mut self) {
        if self.refresh.running {
            self.refresh.dirty = true;
            return;
        }
        let Some(account) = self.refresh.target_account.clone().or_else(|| self.session.account.clone()) else {
            return;
        };
        let switch = self.session.account.as_ref() != Some(&account);
        self.refresh.running = true;

        let adapter = self.adapter.clone();
        let epoch = self.epoch;
        self.spawn_call(async move {
            let network = adapter.current_network().await;
            let balance = adapter.balance_of(&account).await;
            Message::RefreshFinished { epoch, refreshed: Refreshed { account, switch, network, balance } }
        });
    }

    fn on_refresh_finished(&mut self, epoch: u64, refreshed: Refreshed) {
        if epoch != self.epoch {
            debug!(epoch, "dropping refresh from a closed session");
            return;
        }
        self.refresh.running = false;

        let Refreshed { account, switch, network, balance } = refreshed;
        if switch {
            match (network, balance) {
                (Ok(network), Ok(balance)) => {
                    self.apply_account(account);
                    self.apply_network(network);
                    self.apply_balance(balance);
                }
                (Err(err), _) | (_, Err(err)) => {
                    warn!(%account, error = %err, "account refresh failed, keeping previous account");
                    // A newer push may already have moved the target on.
                    if self.refresh.target_account.as_ref() == Some(&account) {
                        self.refresh.target_account = self.session.account.clone();
                    }
                }
            }
        } else {
            match network {
                Ok(network) => self.apply_network(network),
                Err(err) => {
                    warn!(error = %err, "network refresh failed, keeping previous network");
                    if !self.refresh.dirty {
                        self.refresh.target_chain = self.session.network.as_ref().map(|n| n.chain_id);
                    }
                }
            }
            match balance {
                Ok(balance) => self.apply_balance(balance),
                Err(err) => warn!(error = %err, "balance refresh failed, keeping previous balance"),
            }
        }

        if std::mem::take(&mut self.refresh.dirty) {
            self.schedule_refresh();
        }
    }

    fn apply_account(&mut self, account: Address) {
        if self.session.account.as_ref() == Some(&account) {
            return;
        }
        self.adapter.adopt_account(account.clone());
        self.session.account = Some(account.clone());
        self.emit(SessionEvent::AccountChanged { account });
    }

    fn apply_network(&mut self, network: Network) {
        if self.session.network.as_ref() == Some(&network) {
            return;
        }
        info!(%network, "network updated");
        self.session.network = Some(network.clone());
        self.emit(SessionEvent::NetworkChanged { network });
    }

    fn apply_balance(&mut self, balance: Wei) {
        if self.session.set_balance(balance, self.config.balance_precision) {
            let balance = self.session.balance.clone().unwrap_or_default();
            self.emit(SessionEvent::BalanceChanged { balance });
        }
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    fn on_submit(&mut self, order: Order, reply: oneshot::Sender<WalletResult<Transaction>>) {
        let (to, value, payload) = match self.validate(order) {
            Ok(checked) => checked,
            Err(err) => {
                debug!(error = %err, "submission rejected");
                let _ = reply.send(Err(err));
                return;
            }
        };
        let adapter = self.adapter.clone();
        let epoch = self.epoch;
        self.spawn_call(async move {
            let result = adapter.submit_transaction(to.as_str(), value, payload.clone()).await;
            Message::Submitted { epoch, payload, result, reply }
        });
    }

    fn validate(&self, order: Order) -> WalletResult<(Address, Wei, TxPayload)> {
        if !self.session.is_connected() {
            return Err(WalletError::NotConnected);
        }
        match order {
            Order::Transfer { to, amount } => {
                let to = Address::parse(&to)?;
                let value = Wei::parse_ether(&amount)?;
                if value.is_zero() {
                    return Err(WalletError::InvalidAmount(amount));
                }
                Ok((to, value, TxPayload::Transfer))
            }
            Order::Mint { token_uri } => {
                let token_uri = token_uri.trim();
                if token_uri.is_empty() {
                    return Err(WalletError::InvalidTokenUri);
                }
                let payload = TxPayload::NftMint { token_uri: token_uri.to_string() };
                Ok((self.config.nft_contract.clone(), Wei::ZERO, payload))
            }
        }
    }

    fn on_submitted(
        &mut self,
        epoch: u64,
        payload: TxPayload,
        result: WalletResult<PendingTx>,
        reply: oneshot::Sender<WalletResult<Transaction>>,
    ) {
        let pending = match result {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "submission failed before a hash existed");
                let _ = reply.send(Err(err));
                return;
            }
        };

        let tx = Transaction::pending(pending, &payload);
        // A hash that comes back after a disconnect is still real; track it
        // without putting it in front of the user.
        let live = epoch == self.epoch && self.session.is_connected();
        if !self.queues.insert_pending(tx.clone(), live) {
            warn!(hash = %tx.hash, "provider returned a hash that is already tracked");
            let _ = reply.send(Ok(tx));
            return;
        }
        info!(hash = %tx.hash.short(), kind = ?tx.kind, value = %tx.value, live, "transaction pending");
        self.emit(SessionEvent::TransactionSubmitted { hash: tx.hash.clone(), kind: tx.kind });
        let _ = reply.send(Ok(tx.clone()));

        let adapter = self.adapter.clone();
        let confirmations = self.config.confirmations;
        let hash = tx.hash;
        self.spawn_call(async move {
            let outcome = match adapter.await_confirmation(&hash, confirmations).await {
                Ok(receipt) => TxOutcome::from_receipt(receipt),
                Err(err) => TxOutcome::Errored { message: err.to_string() },
            };
            Message::Resolve { hash, outcome, reply: None }
        });
    }

    fn on_resolve(&mut self, hash: &TxHash, outcome: TxOutcome) -> bool {
        match self.queues.resolve(hash, outcome) {
            Resolution::Applied(tx) => {
                match tx.result.as_ref().and_then(|r| r.error_message()) {
                    Some(error) => warn!(hash = %tx.hash.short(), error, "transaction failed"),
                    None => info!(hash = %tx.hash.short(), token_id = ?tx.token_id(), "transaction confirmed"),
                }
                if let Some(event) = SessionEvent::settled(&tx) {
                    self.emit(event);
                }
                if self.session.is_connected() {
                    self.schedule_refresh();
                }
                true
            }
            Resolution::AlreadySettled(status) => {
                debug!(%hash, status = status.as_str(), "duplicate outcome ignored");
                false
            }
            Resolution::Unknown => {
                warn!(%hash, "outcome for an unknown transaction");
                false
            }
        }
    }

    // ---------------------------------------------------------------------
    // Plumbing
    // ---------------------------------------------------------------------

    fn transition(&mut self, session: Session) {
        debug!(from = %self.session.status, to = %session.status, "connection transition");
        self.session = session;
        self.emit(SessionEvent::connection(&self.session));
    }

    // Snapshot first so subscribers reading it on an event see the new state.
    fn emit(&self, event: SessionEvent) {
        self.publish();
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        debug_assert!(self.session.is_consistent(), "inconsistent session: {:?}", self.session);
        let next = SessionSnapshot { session: self.session.clone(), transactions: self.queues.clone() };
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = Message> + Send + 'static,
    {
        let Some(outbox) = self.outbox.upgrade() else {
            debug!("no live handles, skipping provider call");
            return;
        };
        tokio::spawn(async move {
            let message = call.await;
            let _ = outbox.send(message).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedProvider;
    use crate::runtime::Shutdown;

    fn start(sim: &Arc<SimulatedProvider>, shutdown: &Shutdown) -> SessionHandle {
        start_session(sim.clone(), SessionConfig::fast_test(), shutdown.subscribe())
    }

    #[tokio::test]
    async fn connect_when_connected_issues_no_request() {
        let sim = Arc::new(SimulatedProvider::new());
        let shutdown = Shutdown::new();
        let handle = start(&sim, &shutdown);
        handle.connect().await.unwrap();
        let again = handle.connect().await.unwrap();
        assert!(again.is_connected());
        assert_eq!(sim.connect_requests(), 1);
    }

    #[tokio::test]
    async fn redundant_chain_push_is_a_noop() {
        let sim = Arc::new(SimulatedProvider::new());
        let shutdown = Shutdown::new();
        let handle = start(&sim, &shutdown);
        handle.connect().await.unwrap();
        let mut events = handle.subscribe();

        sim.switch_chain(137);
        sim.switch_chain(137);
        sim.switch_chain(137);
        handle.wait_for(|s| s.session.network.as_ref().map(|n| n.chain_id) == Some(137)).await.unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(first, SessionEvent::NetworkChanged { ref network } if network.name == "Polygon Mainnet"));
        // a later marker proves nothing else was queued in between
        sim.switch_chain(1);
        let next = events.recv().await.unwrap();
        assert!(matches!(next, SessionEvent::NetworkChanged { ref network } if network.chain_id == 1));
    }

    #[tokio::test]
    async fn shutdown_stops_the_store() {
        let sim = Arc::new(SimulatedProvider::new());
        let shutdown = Shutdown::new();
        let handle = start(&sim, &shutdown);
        handle.connect().await.unwrap();
        shutdown.trigger().await;
        let mut watch = handle.watch();
        // the store drops its watch sender on exit
        while watch.changed().await.is_ok() {}
        assert_eq!(handle.connect().await, Err(WalletError::SessionClosed));
    }
}
