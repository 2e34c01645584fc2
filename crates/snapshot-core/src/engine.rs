//! The splice algorithm: folding one resolved balance into the interval
//! chain under per-key mutual exclusion.
//!
//! The on-chain balance at block `b` is authoritative for the half-open
//! interval starting at `b` and running to the next known checkpoint, so a
//! transfer creates exactly one new boundary and never invalidates recorded
//! history. The split's update+insert pair goes through the store as one
//! ordered atomic bulk; partial application would break non-overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::balances::BalanceOutput;
use crate::error::SnapshotError;
use crate::lock::KeyedLock;
use crate::snapshot::{
    mutex_name, open_end_timestamp, BalanceSnapshot, SnapshotKey, OPEN_END_BLOCK,
};
use crate::store::{bounded, IntervalStore, SnapshotUpdate, WriteOp};
use crate::token::TokenType;
use crate::transfer::Transfer;

/// Advertised maximum hold of the per-key mutex.
pub const LOCK_HOLD_BOUND: Duration = Duration::from_secs(5);

/// What a splice did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceOutcome {
    /// A fresh interval filled a gap or opened the tail.
    Inserted,
    /// An existing interval was closed at the transfer block and a successor
    /// inserted.
    Split,
    /// Duplicate delivery for an already-recorded block; nothing changed.
    Duplicate,
}

pub struct SnapshotEngine {
    store: Arc<dyn IntervalStore>,
    lock: Arc<dyn KeyedLock>,
    op_timeout: Duration,
}

impl SnapshotEngine {
    pub fn new(
        store: Arc<dyn IntervalStore>,
        lock: Arc<dyn KeyedLock>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            store,
            lock,
            op_timeout,
        }
    }

    /// Splice one balance into its interval chain.
    pub async fn splice(
        &self,
        transfer: &Transfer,
        balance: &BalanceOutput,
    ) -> Result<SpliceOutcome, SnapshotError> {
        let name = mutex_name(
            &balance.account_address,
            &balance.contract_address,
            balance.token_type,
            balance.token_id.as_deref(),
        );
        let _lease = self.lock.acquire(&name, LOCK_HOLD_BOUND).await?;

        // Fungible chains are keyed without a token id.
        let token_id = if balance.token_type != TokenType::Erc20 {
            balance.token_id.clone()
        } else {
            None
        };
        let key = SnapshotKey {
            chain_id: transfer.chain_id.clone(),
            token_address: balance.contract_address.clone(),
            owner: balance.account_address.clone(),
            token_id,
        };

        let covering = bounded(
            self.op_timeout,
            self.store.find_covering(&key, transfer.block_number),
        )
        .await?;

        let outcome = match covering {
            None => self.insert_fresh(&key, transfer, balance).await?,
            Some(existing) if existing.start_block_number == transfer.block_number => {
                SpliceOutcome::Duplicate
            }
            Some(existing) => self.split(&key, existing, transfer, balance).await?,
        };

        #[cfg(debug_assertions)]
        if outcome != SpliceOutcome::Duplicate {
            self.assert_boundary(&key, transfer.block_number).await;
        }

        tracing::debug!(
            target: "snapshot_core::engine",
            owner = %key.owner,
            token = %key.token_address,
            block = transfer.block_number,
            ?outcome,
            "spliced balance"
        );
        Ok(outcome)
    }

    /// No covering interval: the new interval fills the gap to the left of
    /// the nearest higher neighbour, or opens the tail.
    async fn insert_fresh(
        &self,
        key: &SnapshotKey,
        transfer: &Transfer,
        balance: &BalanceOutput,
    ) -> Result<SpliceOutcome, SnapshotError> {
        let next = bounded(
            self.op_timeout,
            self.store.find_nearest_higher(key, transfer.block_number),
        )
        .await?;
        let (end_block, end_timestamp) = match &next {
            Some(neighbour) => (
                neighbour.start_block_number,
                neighbour.start_block_timestamp,
            ),
            None => (OPEN_END_BLOCK, open_end_timestamp()),
        };

        let snapshot = self.snapshot_from(key, transfer, balance, end_block, end_timestamp);
        bounded(self.op_timeout, self.store.insert(&snapshot)).await?;
        Ok(SpliceOutcome::Inserted)
    }

    /// A covering interval with an earlier start: close it at the transfer
    /// block and insert the successor carrying the original end boundary.
    async fn split(
        &self,
        key: &SnapshotKey,
        existing: BalanceSnapshot,
        transfer: &Transfer,
        balance: &BalanceOutput,
    ) -> Result<SpliceOutcome, SnapshotError> {
        let successor = self.snapshot_from(
            key,
            transfer,
            balance,
            existing.end_block_number,
            existing.end_block_timestamp,
        );
        let ops = [
            WriteOp::UpdateEnd {
                id: existing.id,
                update: SnapshotUpdate {
                    end_block_number: transfer.block_number,
                    end_block_timestamp: transfer.block_timestamp,
                },
            },
            WriteOp::Insert(successor),
        ];
        bounded(self.op_timeout, self.store.bulk_write(&ops)).await?;
        Ok(SpliceOutcome::Split)
    }

    fn snapshot_from(
        &self,
        key: &SnapshotKey,
        transfer: &Transfer,
        balance: &BalanceOutput,
        end_block: i64,
        end_timestamp: chrono::DateTime<Utc>,
    ) -> BalanceSnapshot {
        let now = Utc::now();
        BalanceSnapshot {
            id: Uuid::new_v4().to_string(),
            owner: key.owner.clone(),
            blockchain: transfer.blockchain.clone(),
            chain_id: key.chain_id.clone(),
            token_address: key.token_address.clone(),
            token_id: key.token_id.clone(),
            token_type: balance.token_type,
            start_block_number: transfer.block_number,
            end_block_number: end_block,
            start_block_timestamp: transfer.block_timestamp,
            end_block_timestamp: end_timestamp,
            amount: balance.balance.clone(),
            formatted_amount: balance.formatted_balance,
            created_at: now,
            updated_at: now,
        }
    }

    /// Post-write check: the transfer block must now sit exactly on an
    /// interval boundary.
    #[cfg(debug_assertions)]
    async fn assert_boundary(&self, key: &SnapshotKey, block: i64) {
        if let Ok(Some(covering)) = self.store.find_covering(key, block).await {
            debug_assert_eq!(
                covering.start_block_number, block,
                "splice left {key:?} covered by an interval not starting at {block}"
            );
        }
    }
}

/// Backfill window control: when a backfill bound is configured, transfers at
/// or below it are already covered and are skipped. An unset bound processes
/// everything.
pub fn should_process(backfill_end: Option<u64>, block_number: u64) -> bool {
    match backfill_end {
        Some(end) => block_number > end,
        None => true,
    }
}
