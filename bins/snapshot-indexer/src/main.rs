//! Snapshot indexer entry point: assemble the engine, drive it from the
//! event source, shut down cleanly on ctrl-c.

mod config;
mod source;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use snapshot_core::{
    consumer_group_id, AlloyBatchExecutor, EngineConfig, InMemoryTokenCache, IntervalStore,
    KeyedLock, LocalKeyedLock, SnapshotService, TokenCache, TokenStore, OPERATION_TIMEOUT,
};
use snapshot_store_sqlite::SqliteStore;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::source::EventSource;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let engine_config = EngineConfig::new(&config.chain_id)
        .context("CHAINID does not map to a known blockchain")?
        .with_cache_ttl(config.cache_ttl())
        .with_backfill_end(config.backfill_till_block_number);

    let group_id = consumer_group_id(&config.chain_id, &config.consumer_group_id)?;
    let database_file = config.database_file()?;
    tracing::info!(
        chain_id = %engine_config.chain_id,
        blockchain = %engine_config.blockchain,
        consumer_group = %group_id,
        db = %database_file.display(),
        backfill_end = ?engine_config.backfill_end,
        "starting snapshot indexer"
    );

    let store = Arc::new(
        SqliteStore::open(&database_file.to_string_lossy())
            .context("failed to open snapshot database")?,
    );
    let cache: Arc<dyn TokenCache> = Arc::new(InMemoryTokenCache::new());
    let lock: Arc<dyn KeyedLock> = Arc::new(LocalKeyedLock::new(OPERATION_TIMEOUT));
    let rpc_url = config
        .rpc_url
        .parse()
        .with_context(|| format!("invalid RPC_URL {}", config.rpc_url))?;
    let executor = Arc::new(AlloyBatchExecutor::new(rpc_url));

    let service = Arc::new(SnapshotService::new(
        engine_config,
        cache,
        store.clone() as Arc<dyn TokenStore>,
        store.clone() as Arc<dyn IntervalStore>,
        lock,
        executor,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down gracefully");
            let _ = shutdown_tx.send(true);
        }
    });

    let events = EventSource::new(
        config.events_file.clone(),
        config.dlq_path.clone(),
        config.start_offset,
        config.max_concurrency,
    );
    let stats = events.run(service, shutdown_rx).await?;

    tracing::info!(
        delivered = stats.delivered,
        committed = stats.committed,
        retryable_failures = stats.retryable_failures,
        dead_lettered = stats.dead_lettered,
        "source drained, exiting"
    );
    Ok(())
}
