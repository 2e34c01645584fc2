//! Normalized transfer records and transfer kind classification.
//!
//! The stream delivers two wire variants (single and batch); both fold into
//! one [`Transfer`] used by the rest of the pipeline. Addresses and token ids
//! stay in their wire string form here; parsing into chain types happens at
//! the RPC boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::blockchain_from_chain_id;
use crate::error::SnapshotError;
use crate::token::TokenType;

/// Addresses treated as mint/burn sinks. Transfers crossing them classify as
/// MINT or BURN rather than TRANSFER. All entries are lowercased hex, as
/// delivered by the stream decoder.
pub const BURN_ADDRESSES: [&str; 25] = [
    "0x000000000000000000000000000000000000dead",
    "0x0000000000000000000000000000000000000000",
    "0x0000000000000000000000000000000000000001",
    "0x0000000000000000000000000000000000000002",
    "0x0000000000000000000000000000000000000003",
    "0x0000000000000000000000000000000000000004",
    "0x0000000000000000000000000000000000000005",
    "0x0000000000000000000000000000000000000006",
    "0x0000000000000000000000000000000000000007",
    "0x0000000000000000000000000000000000000008",
    "0x0000000000000000000000000000000000000009",
    "0x00000000000000000000045261d4ee77acdb3286",
    "0x0123456789012345678901234567890123456789",
    "0x1111111111111111111111111111111111111111",
    "0x1234567890123456789012345678901234567890",
    "0x2222222222222222222222222222222222222222",
    "0x3333333333333333333333333333333333333333",
    "0x4444444444444444444444444444444444444444",
    "0x6666666666666666666666666666666666666666",
    "0x8888888888888888888888888888888888888888",
    "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
    "0xdead000000000000000042069420694206942069",
    "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
    "0xffffffffffffffffffffffffffffffffffffffff",
    "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
];

/// The conventional zero address.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Direction of a transfer relative to the burn/sink set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    #[serde(rename = "MINT")]
    Mint,
    #[serde(rename = "BURN")]
    Burn,
    #[serde(rename = "TRANSFER")]
    Transfer,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Mint => "MINT",
            TransferKind::Burn => "BURN",
            TransferKind::Transfer => "TRANSFER",
            TransferKind::Unknown => "UNKNOWN",
        }
    }
}

fn is_burn_address(address: &str) -> bool {
    BURN_ADDRESSES.contains(&address)
}

/// Classify a transfer against the burn/sink set.
pub fn classify(from: &str, to: &str) -> TransferKind {
    match (is_burn_address(from), is_burn_address(to)) {
        (true, false) => TransferKind::Mint,
        (false, true) => TransferKind::Burn,
        (false, false) => TransferKind::Transfer,
        (true, true) => TransferKind::Unknown,
    }
}

/// Single-transfer wire schema (`TOKEN_TRANSFERRED`, `TOKEN_TRANSFER_1155_SINGLE`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SingleTransferMessage {
    pub transaction_hash: String,
    #[serde(default)]
    pub log_index: u32,
    #[serde(default)]
    pub call_index: u32,
    #[serde(default)]
    pub call_depth: u32,
    #[serde(default)]
    pub source: String,
    pub chain_id: String,
    #[serde(default)]
    pub operator: String,
    pub token_address: String,
    #[serde(default)]
    pub token_id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub token_type: TokenType,
    pub block_number: u64,
    pub block_timestamp: u64,
}

/// Batch-transfer wire schema (`TOKEN_TRANSFER_BATCH`), with parallel
/// `token_ids`/`amounts` arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchTransferMessage {
    pub transaction_hash: String,
    #[serde(default)]
    pub log_index: u32,
    #[serde(default)]
    pub source: String,
    pub chain_id: String,
    #[serde(default)]
    pub operator: String,
    pub token_address: String,
    #[serde(default)]
    pub token_ids: Vec<String>,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub token_type: TokenType,
    pub block_number: u64,
    pub block_timestamp: u64,
}

/// Uniform transfer record built from either wire variant.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub chain_id: String,
    pub blockchain: String,
    pub from: String,
    pub to: String,
    pub kind: TransferKind,
    pub token_address: String,
    pub operator: String,
    pub amount: String,
    pub amounts: Vec<String>,
    pub token_id: Option<String>,
    pub token_ids: Vec<String>,
    pub token_type: TokenType,
    pub transaction_hash: String,
    pub block_timestamp: DateTime<Utc>,
    pub block_number: i64,
    pub log_index: i64,
    pub call_index: i64,
    pub call_depth: i64,
    pub source: String,
}

fn timestamp_from_secs(secs: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs as i64, 0).unwrap_or_default()
}

/// Build a [`Transfer`] from the single-transfer wire schema.
///
/// Fails with `InvalidChain` when the chain id has no blockchain mapping.
pub fn transfer_from_single(msg: &SingleTransferMessage) -> Result<Transfer, SnapshotError> {
    let blockchain = blockchain_from_chain_id(&msg.chain_id)?;
    Ok(Transfer {
        chain_id: msg.chain_id.clone(),
        blockchain: blockchain.to_string(),
        from: msg.from.clone(),
        to: msg.to.clone(),
        kind: classify(&msg.from, &msg.to),
        token_address: msg.token_address.clone(),
        operator: msg.operator.clone(),
        amount: msg.amount.clone(),
        amounts: Vec::new(),
        token_id: (!msg.token_id.is_empty()).then(|| msg.token_id.clone()),
        token_ids: Vec::new(),
        token_type: msg.token_type,
        transaction_hash: msg.transaction_hash.clone(),
        block_timestamp: timestamp_from_secs(msg.block_timestamp),
        block_number: msg.block_number as i64,
        log_index: msg.log_index as i64,
        call_index: msg.call_index as i64,
        call_depth: msg.call_depth as i64,
        source: msg.source.clone(),
    })
}

/// Build a [`Transfer`] from the batch-transfer wire schema.
pub fn transfer_from_batch(msg: &BatchTransferMessage) -> Result<Transfer, SnapshotError> {
    let blockchain = blockchain_from_chain_id(&msg.chain_id)?;
    Ok(Transfer {
        chain_id: msg.chain_id.clone(),
        blockchain: blockchain.to_string(),
        from: msg.from.clone(),
        to: msg.to.clone(),
        kind: classify(&msg.from, &msg.to),
        token_address: msg.token_address.clone(),
        operator: msg.operator.clone(),
        amount: String::new(),
        amounts: msg.amounts.clone(),
        token_id: None,
        token_ids: msg.token_ids.clone(),
        token_type: msg.token_type,
        transaction_hash: msg.transaction_hash.clone(),
        block_timestamp: timestamp_from_secs(msg.block_timestamp),
        block_number: msg.block_number as i64,
        log_index: msg.log_index as i64,
        call_index: 0,
        call_depth: 0,
        source: msg.source.clone(),
    })
}
