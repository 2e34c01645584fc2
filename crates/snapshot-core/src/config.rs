//! Engine configuration, passed explicitly through constructors.

use std::time::Duration;

use crate::chain::blockchain_from_chain_id;
use crate::error::SnapshotError;

/// Bound on every store and RPC operation.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(20);

/// Token cache TTL applied when none is configured.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Configuration consumed by the engine and its collaborators.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chain_id: String,
    pub blockchain: String,
    pub cache_ttl: Duration,
    pub op_timeout: Duration,
    /// Messages with `block_number <= backfill_end` are skipped.
    pub backfill_end: Option<u64>,
}

impl EngineConfig {
    /// Build a configuration for a chain, with defaults for everything else.
    pub fn new(chain_id: &str) -> Result<Self, SnapshotError> {
        let blockchain = blockchain_from_chain_id(chain_id)?;
        Ok(Self {
            chain_id: chain_id.to_string(),
            blockchain: blockchain.to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            op_timeout: OPERATION_TIMEOUT,
            backfill_end: None,
        })
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_backfill_end(mut self, backfill_end: Option<u64>) -> Self {
        self.backfill_end = backfill_end;
        self
    }
}
