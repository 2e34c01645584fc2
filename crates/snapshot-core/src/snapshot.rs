//! Balance snapshot records: the engine's primary persisted entity.
//!
//! For every (chain, token, owner[, tokenId]) key the store holds a chain of
//! non-overlapping half-open block intervals `[start_block, end_block)`, each
//! carrying the balance valid throughout the interval. The open tail is
//! marked with `i64::MAX` and the matching timestamp sentinel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::token::TokenType;

/// Sentinel end block of the open tail.
pub const OPEN_END_BLOCK: i64 = i64::MAX;

/// Timestamp sentinel mirroring [`OPEN_END_BLOCK`]: 9999-12-31T23:59:59Z.
pub const MAX_SNAPSHOT_TIME: i64 = 253_402_300_799;

/// The end timestamp used for open-tail snapshots.
pub fn open_end_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(MAX_SNAPSHOT_TIME, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Identity of one interval chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub chain_id: String,
    pub token_address: String,
    pub owner: String,
    /// Present iff the token is not ERC-20.
    pub token_id: Option<String>,
}

/// One balance interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub id: String,
    pub owner: String,
    pub blockchain: String,
    pub chain_id: String,
    pub token_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    pub token_type: TokenType,
    /// Inclusive.
    pub start_block_number: i64,
    /// Exclusive; [`OPEN_END_BLOCK`] marks the open tail.
    pub end_block_number: i64,
    pub start_block_timestamp: DateTime<Utc>,
    pub end_block_timestamp: DateTime<Utc>,
    /// Decimal string, arbitrary precision.
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BalanceSnapshot {
    /// Whether this snapshot is the chain's open tail.
    pub fn is_open_tail(&self) -> bool {
        self.end_block_number == OPEN_END_BLOCK
    }

    /// The key of the interval chain this snapshot belongs to.
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey {
            chain_id: self.chain_id.clone(),
            token_address: self.token_address.clone(),
            owner: self.owner.clone(),
            token_id: self.token_id.clone(),
        }
    }
}

/// Name of the cluster-wide mutex serializing writers of one interval chain.
pub fn mutex_name(
    owner: &str,
    contract: &str,
    token_type: TokenType,
    token_id: Option<&str>,
) -> String {
    format!(
        "mutex-snap-{owner}-{contract}-{token_type}-{}",
        token_id.unwrap_or_default()
    )
}
