//! Core engine maintaining a historical balance-interval index for token
//! holders on EVM chains.
//!
//! For every (chain, token, owner[, tokenId]) key the engine keeps a chain of
//! non-overlapping half-open block ranges `[start_block, end_block)`, each
//! carrying the balance valid throughout the range. Out-of-order transfer
//! events are folded in by resolving authoritative post-block balances over
//! batched RPC and splicing them under per-key mutual exclusion.

pub mod balances;
pub mod cache;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod format;
pub mod lock;
pub mod resolver;
pub mod rpc;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod token;
pub mod transfer;

pub use balances::{extract_balances, BalanceOutput};
pub use cache::{token_cache_key, InMemoryTokenCache, TokenCache};
pub use chain::{blockchain_from_chain_id, consumer_group_id, database_name, CHAIN_ID_ETHEREUM};
pub use config::{EngineConfig, DEFAULT_CACHE_TTL, OPERATION_TIMEOUT};
pub use engine::{should_process, SnapshotEngine, SpliceOutcome, LOCK_HOLD_BOUND};
pub use error::{SnapshotError, StoreError};
pub use event::{Ack, EventPayload, StreamMessage};
pub use format::format_amount;
pub use lock::{KeyedLock, LocalKeyedLock, LockLease};
pub use resolver::TokenResolver;
pub use rpc::{AlloyBatchExecutor, CallExecutor, RpcBatcher};
pub use service::SnapshotService;
pub use snapshot::{
    mutex_name, open_end_timestamp, BalanceSnapshot, SnapshotKey, MAX_SNAPSHOT_TIME,
    OPEN_END_BLOCK,
};
pub use store::{IntervalStore, SnapshotUpdate, TokenStore, WriteOp};
pub use token::{Token, TokenType};
pub use transfer::{
    classify, transfer_from_batch, transfer_from_single, BatchTransferMessage,
    SingleTransferMessage, Transfer, TransferKind, BURN_ADDRESSES, ZERO_ADDRESS,
};
