//! Token resolution: shared cache, persistent store, then on-chain probing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cache::{token_cache_key, TokenCache};
use crate::config::EngineConfig;
use crate::error::SnapshotError;
use crate::rpc::abi::{
    ERC1155_INTERFACE_ID, ERC165_INTERFACE_ID, ERC721_INTERFACE_ID, INVALID_INTERFACE_ID,
};
use crate::rpc::batcher::RpcBatcher;
use crate::rpc::client::CallExecutor;
use crate::store::{bounded, TokenStore};
use crate::token::{Token, TokenType};
use crate::transfer::Transfer;

/// Resolves the canonical token record for a transfer.
pub struct TokenResolver {
    cache: Arc<dyn TokenCache>,
    tokens: Arc<dyn TokenStore>,
    executor: Arc<dyn CallExecutor>,
    cache_ttl: Duration,
    op_timeout: Duration,
}

impl TokenResolver {
    pub fn new(
        config: &EngineConfig,
        cache: Arc<dyn TokenCache>,
        tokens: Arc<dyn TokenStore>,
        executor: Arc<dyn CallExecutor>,
    ) -> Self {
        Self {
            cache,
            tokens,
            executor,
            cache_ttl: config.cache_ttl,
            op_timeout: config.op_timeout,
        }
    }

    /// Produce the token record for a transfer, probing the chain when the
    /// token has never been seen. Returns the token and whether it is new.
    pub async fn resolve(&self, transfer: &Transfer) -> Result<(Token, bool), SnapshotError> {
        let cache_key = token_cache_key(&transfer.token_address, &transfer.blockchain);
        if let Some(token) = self.cache.get(&cache_key).await {
            return Ok((token, false));
        }

        let id = Token::id_for(&transfer.chain_id, &transfer.token_address);
        let stored = match bounded(self.op_timeout, self.tokens.get_token(&id)).await {
            Ok(token) => token,
            Err(e) => {
                // Treated as a miss: a probe can still classify the token.
                tracing::warn!(
                    target: "snapshot_core::resolver",
                    token = %transfer.token_address,
                    error = %e,
                    "token store lookup failed"
                );
                None
            }
        };

        let (mut token, is_new) = match stored {
            Some(token) => (token, false),
            None => (
                Token {
                    id,
                    blockchain: transfer.blockchain.clone(),
                    chain_id: transfer.chain_id.clone(),
                    address: transfer.token_address.clone(),
                    token_type: transfer.token_type,
                    created_at: Some(Utc::now()),
                    ..Default::default()
                },
                true,
            ),
        };

        if is_new {
            self.probe(transfer, &mut token).await?;
            token.last_transfer_block = Some(transfer.block_number as u64);
            token.last_transfer_hash = Some(transfer.transaction_hash.clone());
            token.last_transfer_timestamp = Some(transfer.block_timestamp);
            self.cache.set(&cache_key, &token, self.cache_ttl).await;
        }

        Ok((token, is_new))
    }

    /// Classify a never-seen token over RPC and collect its metadata.
    ///
    /// Detection order: a sane ERC-165 responder is trusted for the 721/1155
    /// interfaces; otherwise a non-empty `tokenURI` marks ERC-721 and a
    /// readable `decimals` marks ERC-20.
    async fn probe(&self, transfer: &Transfer, token: &mut Token) -> Result<(), SnapshotError> {
        let mut batcher = RpcBatcher::new();
        batcher.prepare_new_token_calls(transfer);
        batcher
            .execute(self.executor.as_ref(), self.op_timeout)
            .await
            .map_err(|e| match e {
                SnapshotError::Timeout(d) => SnapshotError::Timeout(d),
                other => SnapshotError::RpcFailed(other.to_string()),
            })?;

        let (detected, decimals) = detect_token_type(&batcher, transfer);
        if transfer.token_type == TokenType::Unknown {
            token.token_type = detected;
        }
        token.decimals = decimals.or(token.decimals);
        token.name = batcher.token_name(transfer);
        token.symbol = batcher.token_symbol(transfer);
        token.total_supply = batcher.token_total_supply(transfer).map(|v| v.to_string());
        token.contract_metadata_uri = batcher.token_contract_uri(transfer);
        token.base_uri = batcher.token_base_uri(transfer);

        tracing::debug!(
            target: "snapshot_core::resolver",
            token = %token.address,
            token_type = %token.token_type,
            "probed new token"
        );
        Ok(())
    }
}

fn detect_token_type(batcher: &RpcBatcher, transfer: &Transfer) -> (TokenType, Option<u8>) {
    let erc165 = batcher
        .supports_interface(transfer, ERC165_INTERFACE_ID)
        .unwrap_or(false);
    let ercffff = batcher
        .supports_interface(transfer, INVALID_INTERFACE_ID)
        .unwrap_or(false);

    if erc165 && !ercffff {
        if batcher
            .supports_interface(transfer, ERC721_INTERFACE_ID)
            .unwrap_or(false)
        {
            return (TokenType::Erc721, None);
        }
        if batcher
            .supports_interface(transfer, ERC1155_INTERFACE_ID)
            .unwrap_or(false)
        {
            return (TokenType::Erc1155, None);
        }
    }

    if batcher
        .token_uri(transfer)
        .is_some_and(|uri| !uri.is_empty())
    {
        return (TokenType::Erc721, None);
    }

    if let Some(decimals) = batcher.token_decimals(transfer) {
        return (TokenType::Erc20, Some(decimals));
    }

    (TokenType::Unknown, None)
}
