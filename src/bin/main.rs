//! wallet-session CLI
//!
//! Drives a session against the in-process simulated wallet:
//!   wallet-session networks              → known chain ids and names
//!   wallet-session network <id>          → resolve one chain id (hex or decimal)
//!   wallet-session demo                  → scripted session, prints final snapshot
//!   wallet-session watch                 → random wallet activity, streams events
//!
//! Session options:
//!   --confirmations <n>   Blocks to wait per transaction (env: WALLET_SESSION_CONFIRMATIONS)
//!   --timeout-secs <n>    Confirmation budget (env: WALLET_SESSION_TIMEOUT_SECS)
//!   --limit <n>           Stop `watch` after n events
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use anyhow::{anyhow, Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use wallet_session::logging::init_logging;
use wallet_session::provider::{ReceiptPlan, SimulatedProvider};
use wallet_session::{
    install_signal_handlers, known_networks, parse_chain_id, start_session, Network, SessionConfig, SessionHandle,
    SessionSnapshot, Shutdown, Transaction,
};

const DEMO_NFT_URI: &str = "ipfs://QmDemoToken/metadata.json";

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("wallet-session {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("networks") => cmd_networks(),
        Some("network") => cmd_network(&opts),
        Some("demo") => cmd_demo(&opts),
        Some("watch") => cmd_watch(&opts),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    match result {
        Ok(Value::Null) => {}
        Ok(output) => println!("{}", render(&output, opts.pretty_output())),
        Err(e) => {
            let err = json!({"error": format!("{:#}", e)});
            eprintln!("{}", render(&err, opts.pretty_output()));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    target: Option<String>,
    confirmations: Option<u64>,
    timeout_secs: Option<u64>,
    limit: Option<usize>,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--confirmations" | "-c" => {
                    if i + 1 < args.len() {
                        opts.confirmations = args[i + 1].parse().ok();
                        i += 1;
                    }
                }
                "--timeout-secs" | "-t" => {
                    if i + 1 < args.len() {
                        opts.timeout_secs = args[i + 1].parse().ok();
                        i += 1;
                    }
                }
                "--limit" | "-l" => {
                    if i + 1 < args.len() {
                        opts.limit = args[i + 1].parse().ok();
                        i += 1;
                    }
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        if !positional.is_empty() {
            opts.target = Some(positional.remove(0));
        }

        // Environment (lower priority than CLI args)
        if opts.confirmations.is_none() {
            opts.confirmations = env::var("WALLET_SESSION_CONFIRMATIONS").ok().and_then(|s| s.parse().ok());
        }
        if opts.timeout_secs.is_none() {
            opts.timeout_secs = env::var("WALLET_SESSION_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok());
        }

        opts
    }

    fn pretty_output(&self) -> bool { !self.json && (self.pretty || std::io::stdout().is_terminal()) }

    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default();
        if let Some(n) = self.confirmations {
            config = config.with_confirmations(n);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_confirmation_timeout(Duration::from_secs(secs));
        }
        config
    }
}

fn print_usage() {
    println!(
        r#"wallet-session - Wallet session & transaction lifecycle manager

USAGE:
    wallet-session <command> [args] [options]

COMMANDS:
    networks                List known networks
    network <chain-id>      Resolve a chain id (e.g. 137 or 0x89)
    demo                    Run a scripted session against the simulated wallet
    watch                   Simulate wallet activity and stream session events

SESSION OPTIONS:
    --confirmations, -c <n> Confirmations per transaction (default: 1)
    --timeout-secs, -t <n>  Confirmation timeout in seconds (default: 120)
    --limit, -l <n>         Stop watch after n events

OUTPUT OPTIONS:
    --json                  Raw JSON output
    --pretty                Pretty-print JSON

ENVIRONMENT:
    RUST_LOG                       Log filter (default: info)
    WALLET_SESSION_LOG_JSON=1      JSON logs on stderr
    WALLET_SESSION_CONFIRMATIONS   Same as --confirmations
    WALLET_SESSION_TIMEOUT_SECS    Same as --timeout-secs
"#
    );
}

fn cmd_networks() -> Result<Value> {
    Ok(serde_json::to_value(known_networks())?)
}

fn cmd_network(opts: &ParsedArgs) -> Result<Value> {
    let raw = opts.target.as_deref().context("Usage: wallet-session network <chain-id>")?;
    let chain_id = parse_chain_id(raw).ok_or_else(|| anyhow!("Invalid chain id: {}", raw))?;
    let network = Network::from_chain_id(chain_id);
    Ok(json!({"chain_id": network.chain_id, "name": network.name, "known": network.is_known()}))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create runtime")
}

fn cmd_demo(opts: &ParsedArgs) -> Result<Value> {
    let config = opts.session_config();
    runtime()?.block_on(async move {
        let shutdown = Shutdown::new();
        let sim = Arc::new(SimulatedProvider::new());
        let handle = start_session(sim.clone(), config, shutdown.subscribe());

        let session = handle.connect().await?;
        info!(account = ?session.account, network = ?session.network, "demo connected");
        let recipient = sim
            .accounts_snapshot()
            .get(1)
            .cloned()
            .context("simulated wallet has no second account")?;

        let transfer = handle.send(recipient.as_str(), "0.1").await?;
        sim.plan_next(ReceiptPlan::Revert);
        let reverted = handle.send(recipient.as_str(), "0.25").await?;
        let minted = handle.mint(DEMO_NFT_URI).await?;

        for tx in [&transfer, &reverted, &minted] {
            let settled = handle.settled(&tx.hash).await?;
            debug!(hash = %settled.hash.short(), status = settled.status.as_str(), "demo transaction settled");
        }

        sim.switch_chain(137);
        let snapshot = handle
            .wait_for(|s| s.session.network.as_ref().map(|n| n.chain_id) == Some(137))
            .await?;

        shutdown.trigger().await;
        Ok::<Value, anyhow::Error>(report(&snapshot))
    })
}

fn report(snapshot: &SessionSnapshot) -> Value {
    let history = |txs: &[Transaction]| -> Vec<Value> {
        txs.iter()
            .map(|tx| {
                json!({
                    "hash": tx.hash.short(),
                    "kind": tx.kind,
                    "to": tx.to.short(),
                    "value": tx.value.to_ether_string(),
                    "gas": tx.gas,
                    "gas_price_gwei": tx.gas_price.to_gwei_string(),
                    "token_id": tx.token_id(),
                    "error": tx.result.as_ref().and_then(|r| r.error_message()),
                })
            })
            .collect()
    };
    let queues = &snapshot.transactions;
    json!({
        "session": snapshot.session,
        "counts": {
            "pending": queues.pending().len(),
            "completed": queues.completed().len(),
            "failed": queues.failed().len(),
        },
        "pending": history(queues.pending()),
        "completed": history(queues.completed()),
        "failed": history(queues.failed()),
    })
}

fn cmd_watch(opts: &ParsedArgs) -> Result<Value> {
    let config = opts.session_config();
    let limit = opts.limit;
    let pretty = opts.pretty_output();
    runtime()?.block_on(async move {
        let shutdown = install_signal_handlers();
        let sim = Arc::new(SimulatedProvider::new().with_confirmation_delay(Duration::from_millis(800)));
        let handle = start_session(sim.clone(), config, shutdown.subscribe());

        let mut events = handle.subscribe();
        handle.connect().await?;
        info!("watching simulated wallet; Ctrl-C to stop");
        tokio::spawn(wallet_activity(sim, handle.clone(), shutdown.clone()));

        let mut stop = shutdown.subscribe();
        let mut seen = 0usize;
        loop {
            tokio::select! {
                _ = stop.recv() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        println!("{}", render(&serde_json::to_value(&event)?, pretty));
                        seen += 1;
                        if limit.map(|n| seen >= n).unwrap_or(false) {
                            shutdown.trigger().await;
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        Ok::<Value, anyhow::Error>(Value::Null)
    })
}

enum Activity {
    Chain(u64),
    Account(wallet_session::Address),
    Send { to: wallet_session::Address, amount: String, revert: bool },
    Mint,
}

// Stand-in for a human poking at the wallet extension.
async fn wallet_activity(sim: Arc<SimulatedProvider>, handle: SessionHandle, shutdown: Shutdown) {
    let chains: Vec<u64> = known_networks().iter().map(|n| n.chain_id).chain([31337]).collect();
    let mut stop = shutdown.subscribe();
    loop {
        let pause = Duration::from_millis(rand::thread_rng().gen_range(500..2_000));
        tokio::select! {
            _ = stop.recv() => break,
            _ = tokio::time::sleep(pause) => {}
        }

        let accounts = sim.accounts_snapshot();
        let activity = {
            let mut rng = rand::thread_rng();
            match rng.gen_range(0..10) {
                0..=2 => chains.choose(&mut rng).copied().map(Activity::Chain),
                3..=4 => accounts.choose(&mut rng).cloned().map(Activity::Account),
                5..=8 => accounts.last().cloned().map(|to| Activity::Send {
                    to,
                    amount: format!("0.0{}", rng.gen_range(1..10)),
                    revert: rng.gen_bool(0.2),
                }),
                _ => Some(Activity::Mint),
            }
        };

        match activity {
            Some(Activity::Chain(chain_id)) => sim.switch_chain(chain_id),
            Some(Activity::Account(account)) => sim.switch_account(account),
            Some(Activity::Send { to, amount, revert }) => {
                if revert {
                    sim.plan_next(ReceiptPlan::Revert);
                }
                if let Err(err) = handle.send(to.as_str(), &amount).await {
                    debug!(error = %err, "simulated send refused");
                }
            }
            Some(Activity::Mint) => {
                if let Err(err) = handle.mint(DEMO_NFT_URI).await {
                    debug!(error = %err, "simulated mint refused");
                }
            }
            None => {}
        }
    }
}
