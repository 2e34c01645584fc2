//! Configuration for the snapshot indexer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use snapshot_core::{database_name, DEFAULT_CACHE_TTL};

/// Balance-interval snapshot indexer.
///
/// Consumes token transfer events, resolves authoritative post-block
/// balances over batched RPC, and maintains non-overlapping balance
/// intervals per (token, owner[, tokenId]).
#[derive(Parser, Debug)]
#[command(name = "snapshot-indexer")]
#[command(about = "Maintain historical balance intervals for token holders", long_about = None)]
pub struct Config {
    /// Chain id selecting the blockchain mapping.
    #[arg(long, env = "CHAINID")]
    pub chain_id: String,

    /// EVM JSON-RPC endpoint for the selected chain.
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: String,

    /// Database path. The file name is prefixed with the uppercased
    /// blockchain name off Ethereum.
    #[arg(long, env = "DATABASE_PATH", default_value = "./balance-snapshots.db")]
    pub database_path: PathBuf,

    /// Consumer group id; suffixed with the blockchain name off Ethereum.
    #[arg(long, env = "CONSUMER_GROUPID", default_value = "balance-snapshot")]
    pub consumer_group_id: String,

    /// Records before this offset are skipped by the source.
    #[arg(long, env = "CONSUMERGROUP_START_OFFSET", default_value = "0")]
    pub start_offset: i64,

    /// Messages with block_number at or below this bound are skipped.
    #[arg(long, env = "BACKFILL_TILL_BLOCK_NUMBER")]
    pub backfill_till_block_number: Option<u64>,

    /// Token cache TTL in seconds; the default applies when unset or
    /// unparsable.
    #[arg(long, env = "CACHE_TTL")]
    pub cache_ttl: Option<String>,

    /// JSON-lines event file; stdin when omitted.
    #[arg(long, env = "EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// File receiving raw records that failed non-retryably.
    #[arg(long, env = "DLQ_PATH")]
    pub dlq_path: Option<PathBuf>,

    /// Maximum messages handled concurrently.
    #[arg(long, default_value = "8")]
    pub max_concurrency: usize,
}

impl Config {
    /// TTL for cached tokens, falling back to the default on unset or
    /// invalid values.
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
            .as_deref()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL)
    }

    /// Database path with the chain-derived file name applied.
    pub fn database_file(&self) -> anyhow::Result<PathBuf> {
        let base = self
            .database_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("balance-snapshots.db");
        let name = database_name(&self.chain_id, base)?;
        Ok(self
            .database_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(name))
    }
}
