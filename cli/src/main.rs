//! MinedIndex CLI: host process for the blocks-mined indexer.
//!
//! # Commands
//! ```text
//! minedindex run     [--rpc-url <url>] [--rpc-user <u>] [--rpc-password <p>] [--db <path>]
//! minedindex status  [--db <path>] [--json]
//! minedindex top     [--db <path>] [--limit <N>] [--json]
//! minedindex subsidy --height <N>
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use minedindex_core::{
    subsidy_at, AddressStatsStore, BlockProcessor, CheckpointManager, Indexer, NodeClient, COIN,
};
use minedindex_rpc::HttpNodeClient;
use minedindex_storage::SqliteStorage;

mod config;
mod logging;

use config::AppConfig;

#[derive(Parser)]
#[command(
    name = "minedindex",
    about = "Count blocks mined per payout address",
    long_about = "
MinedIndex follows a bitcoind-family node, attributes every block to the
address its coinbase pays, and keeps a per-address count in SQLite.

ENVIRONMENT VARIABLES:
  MINEDINDEX_RPC_URL        Node JSON-RPC endpoint
  MINEDINDEX_RPC_USER       RPC basic-auth user
  MINEDINDEX_RPC_PASSWORD   RPC basic-auth password
  MINEDINDEX_DB             SQLite database path
  RUST_LOG                  Log filter (overrides --log-level)
",
    version
)]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true, env = "MINEDINDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Default log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    json_logs: bool,

    /// SQLite database path (overrides the config file)
    #[arg(long, global = true, env = "MINEDINDEX_DB")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Catch up with the node, then follow new tips until Ctrl-C
    Run {
        #[arg(long, env = "MINEDINDEX_RPC_URL")]
        rpc_url: Option<String>,
        #[arg(long, env = "MINEDINDEX_RPC_USER")]
        rpc_user: Option<String>,
        #[arg(long, env = "MINEDINDEX_RPC_PASSWORD", hide_env_values = true)]
        rpc_password: Option<String>,
        /// Create the checkpoint at this height when absent
        #[arg(long)]
        initial_checkpoint: Option<u64>,
    },

    /// Show stored checkpoints
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the addresses with the most blocks mined
    Top {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the expected block subsidy at a height
    Subsidy {
        #[arg(long)]
        height: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    if cli.json_logs {
        config.log.json = true;
    }
    if let Some(db) = cli.db {
        config.database = db;
    }
    logging::init_tracing(&config.log);

    match cli.command {
        Commands::Run {
            rpc_url,
            rpc_user,
            rpc_password,
            initial_checkpoint,
        } => {
            if let Some(url) = rpc_url {
                config.node.rpc_url = url;
            }
            if rpc_user.is_some() {
                config.node.rpc_user = rpc_user;
            }
            if rpc_password.is_some() {
                config.node.rpc_password = rpc_password;
            }
            if let Some(height) = initial_checkpoint {
                config.indexer.initial_checkpoint = height;
            }
            cmd_run(config).await
        }
        Commands::Status { json } => cmd_status(&config, json).await,
        Commands::Top { limit, json } => cmd_top(&config, limit, json).await,
        Commands::Subsidy { height } => cmd_subsidy(height),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn open_storage(config: &AppConfig) -> Result<Arc<SqliteStorage>> {
    let storage = SqliteStorage::open(&config.database)
        .await
        .with_context(|| format!("cannot open database '{}'", config.database))?;
    Ok(Arc::new(storage))
}

async fn cmd_run(config: AppConfig) -> Result<()> {
    let storage = open_storage(&config).await?;
    let node: Arc<dyn NodeClient> =
        Arc::new(HttpNodeClient::new(&config.node).context("invalid node configuration")?);

    let checkpoint = CheckpointManager::new(storage.clone(), config.indexer.job_type.clone());
    let processor = BlockProcessor::from_config(&config.indexer, node, storage, checkpoint)?;

    info!(
        rpc_url = %config.node.rpc_url,
        database = %config.database,
        job_type = %config.indexer.job_type,
        "starting indexer"
    );
    let handle = Indexer::new(config.indexer, processor)
        .start()
        .await
        .context("indexer startup failed")?;

    let mut status = handle.subscribe();
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("cannot listen for Ctrl-C")?;
                info!("interrupt received, shutting down");
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let s = *status.borrow_and_update();
                info!(state = %s.state, last_checked = s.last_checked, tip = s.observed_tip, "status");
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn cmd_status(config: &AppConfig, as_json: bool) -> Result<()> {
    let storage = open_storage(config).await?;
    let checkpoints = storage.checkpoints().await?;
    let addresses = storage.address_count().await?;

    if as_json {
        let out = serde_json::json!({
            "checkpoints": checkpoints,
            "addresses": addresses,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        if checkpoints.is_empty() {
            println!("No checkpoints stored in '{}'", config.database);
        }
        for cp in &checkpoints {
            println!("{:<16} last block {:>10}  (updated {})", cp.job_type, cp.last_block_number, cp.updated_at);
        }
        println!("Addresses with mined blocks: {addresses}");
    }
    Ok(())
}

async fn cmd_top(config: &AppConfig, limit: usize, as_json: bool) -> Result<()> {
    let storage = open_storage(config).await?;
    let records = storage.top_miners(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("{:>4}  {:<40} {:>10} {:>12}", "#", "address", "blocks", "last block");
    for (rank, r) in records.iter().enumerate() {
        println!(
            "{:>4}  {:<40} {:>10} {:>12}",
            rank + 1,
            r.address,
            r.blocks_mined,
            r.last_block_number
        );
    }
    Ok(())
}

fn cmd_subsidy(height: u64) -> Result<()> {
    let subsidy = subsidy_at(height);
    println!(
        "height {height}: {subsidy} coins ({} units), payee threshold above {} units",
        subsidy.saturating_mul(COIN),
        subsidy * 6 / 10
    );
    Ok(())
}
