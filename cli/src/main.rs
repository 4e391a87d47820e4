//! chaintxindex CLI — follow a CometBFT chain and query the transaction index.
//!
//! # Commands
//! ```text
//! chaintxindex run    --rpc-url http://localhost:26657 --store ./txindex.db
//! chaintxindex lookup --store ./txindex.db <TX_HASH>
//! chaintxindex status --store ./txindex.db
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};

use chaintxindex_cometbft::{CometClient, CometClientConfig};
use chaintxindex_core::{IndexerBuilder, TxIndexStore, TxLookup, SERVICE_NAME};
use chaintxindex_storage::sqlite::SqliteTxIndex;
use chaintxindex_storage::InMemoryTxIndex;

mod logging;

use logging::{init_tracing, parse_component, LogConfig};

#[derive(Parser)]
#[command(
    name = "chaintxindex",
    about = "Chain-following transaction indexer for CometBFT nodes",
    long_about = "
ChainTxIndex waits for a CometBFT node to finish state sync, subscribes to new
block headers and indexes every transaction of every block after its cursor.

ENVIRONMENT VARIABLES:
  CHAINTXINDEX_RPC_URL   Node HTTP JSON-RPC endpoint
  CHAINTXINDEX_WS_URL    Node WebSocket endpoint (default: derived from RPC URL)
  CHAINTXINDEX_STORE     \"memory\" or a SQLite database path
  CHAINTXINDEX_LOG       Default log level
  RUST_LOG               Full tracing filter (overrides --log-level)
",
    version
)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LogArgs {
    /// Default log level
    #[arg(long, global = true, env = "CHAINTXINDEX_LOG", default_value = "info")]
    log_level: String,
    /// Per-component level override, e.g. `chaintxindex_core=debug`
    #[arg(long = "log-component", global = true, value_parser = parse_component)]
    log_components: Vec<(String, String)>,
    /// Emit JSON logs
    #[arg(long, global = true, env = "CHAINTXINDEX_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the chain and index transactions until interrupted
    Run(RunArgs),

    /// Resolve a transaction hash (or the Ethereum hash of an EVM tx)
    /// against a SQLite index
    Lookup {
        /// SQLite database path
        #[arg(long, env = "CHAINTXINDEX_STORE")]
        store: String,
        /// Transaction hash (hex, optional 0x prefix)
        tx_hash: String,
    },

    /// Show what a SQLite index holds
    Status {
        /// SQLite database path
        #[arg(long, env = "CHAINTXINDEX_STORE")]
        store: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Node HTTP JSON-RPC endpoint
    #[arg(long, env = "CHAINTXINDEX_RPC_URL", default_value = "http://localhost:26657")]
    rpc_url: String,
    /// Node WebSocket endpoint
    #[arg(long, env = "CHAINTXINDEX_WS_URL")]
    ws_url: Option<String>,
    /// "memory" or a SQLite database path
    #[arg(long, env = "CHAINTXINDEX_STORE", default_value = "memory")]
    store: String,
    /// Subscriber name presented to the node
    #[arg(long, default_value = SERVICE_NAME)]
    subscriber: String,
    /// Per-request HTTP timeout
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    request_timeout: Duration,
    /// Longest idle wait between checks for new blocks
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    new_block_wait_timeout: Duration,
    /// Cap on a single readiness retry delay
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    readiness_max_interval: Duration,
    /// Random spread of each readiness retry delay, as a fraction of it
    #[arg(long, default_value_t = 0.5)]
    readiness_jitter: f64,
    /// Give up waiting for the node after this long
    #[arg(long, value_parser = humantime::parse_duration, default_value = "48h")]
    readiness_max_elapsed: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&LogConfig {
        level: cli.log.log_level,
        components: cli.log.log_components.into_iter().collect(),
        json: cli.log.log_json,
    });

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Lookup { store, tx_hash } => cmd_lookup(&store, &tx_hash).await,
        Commands::Status { store } => cmd_status(&store).await,
    }
}

async fn open_store(location: &str) -> Result<Arc<dyn TxIndexStore>> {
    if location == "memory" {
        return Ok(Arc::new(InMemoryTxIndex::new()));
    }
    let store = SqliteTxIndex::open(location)
        .await
        .with_context(|| format!("failed to open SQLite index at {location}"))?;
    Ok(Arc::new(store))
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let client = CometClient::new(CometClientConfig {
        rpc_url: args.rpc_url,
        ws_url: args.ws_url,
        request_timeout: args.request_timeout,
    })
    .context("failed to create node client")?;
    tracing::info!(rpc = client.rpc_url(), ws = client.ws_url(), store = %args.store, "starting");

    let store = open_store(&args.store).await?;

    let service = IndexerBuilder::new()
        .subscriber(args.subscriber)
        .new_block_wait_timeout(args.new_block_wait_timeout)
        .readiness_max_interval(args.readiness_max_interval)
        .readiness_jitter(args.readiness_jitter)
        .readiness_max_elapsed(args.readiness_max_elapsed)
        .build(Arc::new(client), store)
        .context("invalid indexer configuration")?;
    let service = Arc::new(service);

    let signals = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => tracing::info!("shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signals"),
            }
            service.shutdown();
        })
    };

    let result = service.run().await;
    signals.abort();
    result.context("indexer service failed")
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

async fn cmd_lookup(store: &str, tx_hash: &str) -> Result<()> {
    let index = SqliteTxIndex::open(store)
        .await
        .with_context(|| format!("failed to open SQLite index at {store}"))?;

    let found = match index.tx_by_hash(tx_hash).await? {
        Some(tx) => Some(tx),
        None => index.tx_by_eth_hash(tx_hash).await?,
    };
    match found {
        Some(tx) => {
            println!("{}", serde_json::to_string_pretty(&tx)?);
            Ok(())
        }
        None => Err(anyhow!("transaction {tx_hash} not found")),
    }
}

async fn cmd_status(store: &str) -> Result<()> {
    let index = SqliteTxIndex::open(store)
        .await
        .with_context(|| format!("failed to open SQLite index at {store}"))?;

    let status = index.status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
