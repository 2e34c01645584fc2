//! Persistence contracts consumed by the engine.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{SnapshotError, StoreError};
use crate::snapshot::{BalanceSnapshot, SnapshotKey};
use crate::token::Token;

/// Fields the engine mutates on an existing snapshot when a newer insert
/// closes it. `updated_at` is stamped by the store.
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    pub end_block_number: i64,
    pub end_block_timestamp: DateTime<Utc>,
}

/// One operation of an ordered bulk write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    UpdateEnd { id: String, update: SnapshotUpdate },
    Insert(BalanceSnapshot),
}

/// Store of balance intervals.
///
/// `bulk_write` must apply its operations in order and atomically: either
/// every operation lands or none does. The engine relies on this to keep the
/// non-overlap invariant across the split's update+insert pair.
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// The unique snapshot with `start_block <= block < end_block`, if any.
    async fn find_covering(
        &self,
        key: &SnapshotKey,
        block: i64,
    ) -> Result<Option<BalanceSnapshot>, StoreError>;

    /// The snapshot with the smallest `start_block > block`, if any.
    async fn find_nearest_higher(
        &self,
        key: &SnapshotKey,
        block: i64,
    ) -> Result<Option<BalanceSnapshot>, StoreError>;

    async fn insert(&self, snapshot: &BalanceSnapshot) -> Result<(), StoreError>;

    async fn bulk_write(&self, ops: &[WriteOp]) -> Result<(), StoreError>;

    /// Apply an update to one snapshot by id, returning the number of
    /// modified rows. `updated_at` is stamped automatically.
    async fn update_by_id(&self, id: &str, update: &SnapshotUpdate) -> Result<u64, StoreError>;
}

/// Store of token records, written by the upstream token service and read
/// here.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Look up a token by its canonical id. Empty ids are rejected.
    async fn get_token(&self, id: &str) -> Result<Option<Token>, StoreError>;

    async fn create_token(&self, token: &Token) -> Result<(), StoreError>;
}

/// Bound a store operation by the engine's operation timeout.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, StoreError>> + Send,
) -> Result<T, SnapshotError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(SnapshotError::from),
        Err(_) => Err(SnapshotError::Timeout(timeout)),
    }
}
