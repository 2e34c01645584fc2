//! Message handling: the pipeline from a delivered stream message to spliced
//! snapshots and exactly one ack.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::Instrument;

use crate::balances::extract_balances;
use crate::cache::TokenCache;
use crate::config::EngineConfig;
use crate::engine::{should_process, SnapshotEngine, SpliceOutcome};
use crate::error::SnapshotError;
use crate::event::{Ack, EventPayload, StreamMessage};
use crate::lock::KeyedLock;
use crate::resolver::TokenResolver;
use crate::rpc::batcher::RpcBatcher;
use crate::rpc::client::CallExecutor;
use crate::store::{IntervalStore, TokenStore};
use crate::token::{Token, TokenType};
use crate::transfer::{transfer_from_batch, transfer_from_single, Transfer};

/// Orchestrates one transfer end to end: normalize, resolve the token, fetch
/// balances in one batch, splice each balance under its key lock.
pub struct SnapshotService {
    config: EngineConfig,
    executor: Arc<dyn CallExecutor>,
    resolver: TokenResolver,
    engine: SnapshotEngine,
}

impl SnapshotService {
    pub fn new(
        config: EngineConfig,
        cache: Arc<dyn TokenCache>,
        tokens: Arc<dyn TokenStore>,
        intervals: Arc<dyn IntervalStore>,
        lock: Arc<dyn KeyedLock>,
        executor: Arc<dyn CallExecutor>,
    ) -> Self {
        let resolver = TokenResolver::new(&config, cache, tokens, executor.clone());
        let engine = SnapshotEngine::new(intervals, lock, config.op_timeout);
        Self {
            config,
            executor,
            resolver,
            engine,
        }
    }

    /// Handle one delivered message, emitting exactly one ack.
    pub async fn handle_message(&self, message: StreamMessage, ack_tx: &mpsc::Sender<Ack>) {
        let result = match &message.payload {
            EventPayload::TokenTransferred(msg) | EventPayload::TokenTransfer1155Single(msg) => {
                match transfer_from_single(msg) {
                    Ok(transfer) => self.process_transfer(transfer).await,
                    Err(e) => Err(e),
                }
            }
            EventPayload::TokenTransferBatch(msg) => match transfer_from_batch(msg) {
                Ok(transfer) => self.process_transfer(transfer).await,
                Err(e) => Err(e),
            },
            EventPayload::Unsupported { event_name } => {
                Err(SnapshotError::UnsupportedEvent(event_name.clone()))
            }
        };

        if let Err(error) = &result {
            tracing::error!(
                target: "snapshot_core::service",
                batch_id = message.batch_id,
                batch_index = message.batch_index,
                retryable = error.is_retryable(),
                %error,
                "transfer processing failed"
            );
        }

        let ack = Ack {
            batch_id: message.batch_id,
            batch_index: message.batch_index,
            error: result.err(),
        };
        if ack_tx.send(ack).await.is_err() {
            tracing::warn!(
                target: "snapshot_core::service",
                "response channel closed, dropping ack"
            );
        }
    }

    async fn process_transfer(&self, mut transfer: Transfer) -> Result<(), SnapshotError> {
        if !should_process(self.config.backfill_end, transfer.block_number as u64) {
            tracing::debug!(
                target: "snapshot_core::service",
                block = transfer.block_number,
                "transfer below backfill bound, skipped"
            );
            return Ok(());
        }

        let span = tracing::info_span!(
            "process_transfer",
            tx = %transfer.transaction_hash,
            block = transfer.block_number,
            token = %transfer.token_address,
        );
        async {
            let (token, is_new) = self.resolver.resolve(&transfer).await?;
            if is_new {
                tracing::info!(
                    target: "snapshot_core::service",
                    token = %token.address,
                    token_type = %token.token_type,
                    "first sighting of token"
                );
            }
            if token.token_type == TokenType::Unknown {
                return Err(SnapshotError::UnknownToken(token.address.clone()));
            }
            transfer.token_type = token.token_type;

            let balances = self.token_balances(&mut transfer, &token).await?;
            for balance in &balances {
                let outcome = self.engine.splice(&transfer, balance).await?;
                if outcome == SpliceOutcome::Duplicate {
                    tracing::debug!(
                        target: "snapshot_core::service",
                        owner = %balance.account_address,
                        block = transfer.block_number,
                        "duplicate snapshot delivery"
                    );
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Prepare, execute, and extract the balance batch for one transfer.
    async fn token_balances(
        &self,
        transfer: &mut Transfer,
        token: &Token,
    ) -> Result<Vec<crate::balances::BalanceOutput>, SnapshotError> {
        let mut batcher = RpcBatcher::new();
        batcher.prepare_token_balance_calls(transfer, token.token_type);
        if let Err(error) = batcher
            .execute(self.executor.as_ref(), self.config.op_timeout)
            .await
        {
            // Extraction decides whether anything usable came back; a wholly
            // failed batch surfaces there as missing data.
            tracing::error!(
                target: "snapshot_core::service",
                tx = %transfer.transaction_hash,
                %error,
                "balance batch execution failed"
            );
        }
        extract_balances(&batcher, transfer, token)
    }
}
