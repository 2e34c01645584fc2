//! RPC batching and per-transfer book-keeping.

pub mod abi;
pub mod batcher;
pub mod calls;
pub mod client;

pub use abi::{
    ERC1155_INTERFACE_ID, ERC165_INTERFACE_ID, ERC721_INTERFACE_ID, INVALID_INTERFACE_ID,
};
pub use batcher::{CallCategory, RpcBatcher};
pub use calls::{call_id, CallData, CallId, CallMethod, CallResult};
pub use client::{AlloyBatchExecutor, CallExecutor};
