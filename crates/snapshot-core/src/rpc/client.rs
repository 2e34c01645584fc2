//! Batch execution of prepared calls.
//!
//! [`CallExecutor`] is the seam between the batcher and the wire: the alloy
//! implementation sends every prepared call in a single JSON-RPC batch.
//! Individual call failures (reverts, missing methods on probe targets) are
//! expected and leave the result empty; only transport-level failures fail
//! the batch.

use alloy::eips::BlockId;
use alloy::primitives::Bytes;
use alloy::rpc::client::{ClientBuilder, RpcClient};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;

use crate::error::SnapshotError;
use crate::rpc::calls::{decode_result, encode_call, CallData};

/// Executes a set of prepared calls in one round-trip, writing typed results
/// back into the call records.
#[async_trait]
pub trait CallExecutor: Send + Sync {
    async fn execute(&self, calls: &mut [CallData]) -> Result<(), SnapshotError>;
}

/// JSON-RPC batch executor over HTTP.
pub struct AlloyBatchExecutor {
    client: RpcClient,
}

impl AlloyBatchExecutor {
    pub fn new(url: Url) -> Self {
        Self {
            client: ClientBuilder::default().http(url),
        }
    }
}

#[async_trait]
impl CallExecutor for AlloyBatchExecutor {
    async fn execute(&self, calls: &mut [CallData]) -> Result<(), SnapshotError> {
        if calls.is_empty() {
            return Ok(());
        }

        let mut batch = self.client.new_batch();
        let mut waiters = Vec::with_capacity(calls.len());
        for call in calls.iter() {
            let (target, data) = encode_call(call)?;
            let request = TransactionRequest::default()
                .to(target)
                .input(TransactionInput::new(data.into()));
            let block = call
                .block
                .map(BlockId::number)
                .unwrap_or_else(BlockId::latest);
            let waiter = batch
                .add_call::<_, Bytes>("eth_call", &(request, block))
                .map_err(|e| SnapshotError::RpcFailed(e.to_string()))?;
            waiters.push(waiter);
        }

        batch
            .send()
            .await
            .map_err(|e| SnapshotError::RpcFailed(e.to_string()))?;

        for (call, waiter) in calls.iter_mut().zip(waiters) {
            match waiter.await {
                Ok(raw) => match decode_result(&call.method, &raw) {
                    Ok(result) => call.result = Some(result),
                    Err(e) => {
                        tracing::debug!(
                            target: "snapshot_core::rpc",
                            id = %call.id,
                            target_contract = %call.target,
                            error = %e,
                            "undecodable call return, leaving result empty"
                        );
                    }
                },
                Err(e) => {
                    tracing::debug!(
                        target: "snapshot_core::rpc",
                        id = %call.id,
                        target_contract = %call.target,
                        error = %e,
                        "call failed, leaving result empty"
                    );
                }
            }
        }

        tracing::debug!(
            target: "snapshot_core::rpc",
            count = calls.len(),
            resolved = calls.iter().filter(|c| c.result.is_some()).count(),
            "executed call batch"
        );
        Ok(())
    }
}
