//! Per-transfer RPC book-keeping.
//!
//! A batcher is an arena owned by exactly one transfer: calls are allocated
//! during the prepare phase, resolved in a single bulk round-trip, queried
//! during extraction, and dropped with the transfer. Nothing here touches the
//! chain until [`RpcBatcher::execute`].

use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::{Address, U256};

use crate::error::SnapshotError;
use crate::rpc::abi::{
    ERC1155_INTERFACE_ID, ERC165_INTERFACE_ID, ERC721_INTERFACE_ID, INVALID_INTERFACE_ID,
};
use crate::rpc::calls::{call_id, CallData, CallId, CallMethod, CallResult};
use crate::rpc::client::CallExecutor;
use crate::token::TokenType;
use crate::transfer::{Transfer, ZERO_ADDRESS};

/// Book-keeping category of a prepared call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallCategory {
    /// Metadata and type probes.
    Token,
    /// Latest balances (no block tag).
    Balance,
    /// Balances at the transfer's block.
    BalanceSnapshot,
    /// Latest NFT ownership.
    Owner,
    /// NFT ownership at the transfer's block.
    OwnerBalanceSnapshot,
}

/// Per-transfer call arena with category-keyed lookup maps.
#[derive(Default)]
pub struct RpcBatcher {
    calls: Vec<CallData>,
    index: HashMap<(CallCategory, CallId), usize>,
}

impl RpcBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of prepared calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn push(&mut self, category: CallCategory, call: CallData) {
        self.index.insert((category, call.id), self.calls.len());
        self.calls.push(call);
    }

    fn lookup(&self, category: CallCategory, id: CallId) -> Option<&CallResult> {
        self.index
            .get(&(category, id))
            .and_then(|ix| self.calls.get(*ix))
            .and_then(|call| call.result.as_ref())
    }

    /// Prepare the balance calls one transfer needs, by token type.
    ///
    /// ERC-1155 prepares `balanceOf(owner, id)` per token id for both
    /// endpoints, skipping the zero address. ERC-721 prepares a single
    /// `ownerOf` probe. ERC-20 prepares `balanceOf(owner)` for both
    /// endpoints. An unknown type prepares both the ERC-20 and ERC-721
    /// variants and leaves the decision to extraction.
    pub fn prepare_token_balance_calls(&mut self, transfer: &Transfer, token_type: TokenType) {
        match token_type {
            TokenType::Erc1155 => {
                if !transfer.token_ids.is_empty() {
                    for token_id in &transfer.token_ids {
                        if transfer.to != ZERO_ADDRESS {
                            self.prepare_erc1155_balance(transfer, &transfer.to, token_id);
                        }
                        if transfer.from != ZERO_ADDRESS {
                            self.prepare_erc1155_balance(transfer, &transfer.from, token_id);
                        }
                    }
                } else {
                    let token_id = transfer.token_id.clone().unwrap_or_default();
                    if transfer.to != ZERO_ADDRESS {
                        self.prepare_erc1155_balance(transfer, &transfer.to, &token_id);
                    }
                    if transfer.from != ZERO_ADDRESS {
                        self.prepare_erc1155_balance(transfer, &transfer.from, &token_id);
                    }
                }
            }
            TokenType::Erc721 => {
                let token_id = transfer.token_id.clone().unwrap_or_default();
                self.prepare_erc721_owner(transfer, &token_id);
            }
            TokenType::Erc20 => {
                self.prepare_erc20_balance(transfer, &transfer.to);
                self.prepare_erc20_balance(transfer, &transfer.from);
            }
            TokenType::Unknown => {
                let token_id = transfer.token_id.clone().unwrap_or_default();
                self.prepare_erc20_balance(transfer, &transfer.to);
                self.prepare_erc20_balance(transfer, &transfer.from);
                self.prepare_erc721_owner(transfer, &token_id);
            }
        }
    }

    fn prepare_erc20_balance(&mut self, transfer: &Transfer, owner: &str) {
        let call = CallData::new(
            &transfer.chain_id,
            &transfer.token_address,
            CallMethod::BalanceOf {
                owner: owner.to_string(),
            },
            Some(transfer.block_number as u64),
        );
        self.push(CallCategory::BalanceSnapshot, call);
    }

    fn prepare_erc721_owner(&mut self, transfer: &Transfer, token_id: &str) {
        let call = CallData::new(
            &transfer.chain_id,
            &transfer.token_address,
            CallMethod::OwnerOf {
                token_id: token_id.to_string(),
            },
            Some(transfer.block_number as u64),
        );
        self.push(CallCategory::BalanceSnapshot, call);
    }

    fn prepare_erc1155_balance(&mut self, transfer: &Transfer, owner: &str, token_id: &str) {
        let call = CallData::new(
            &transfer.chain_id,
            &transfer.token_address,
            CallMethod::Erc1155BalanceOf {
                owner: owner.to_string(),
                token_id: token_id.to_string(),
            },
            Some(transfer.block_number as u64),
        );
        self.push(CallCategory::BalanceSnapshot, call);
    }

    /// Prepare the probe and metadata calls for a token not yet in the store:
    /// the four `supportsInterface` probes, `name`, `symbol`, `decimals`,
    /// `totalSupply`, `contractURI`, `baseURI`, and the `tokenURI` fallback
    /// probe.
    pub fn prepare_new_token_calls(&mut self, transfer: &Transfer) {
        for interface_id in [
            ERC165_INTERFACE_ID,
            ERC721_INTERFACE_ID,
            ERC1155_INTERFACE_ID,
            INVALID_INTERFACE_ID,
        ] {
            self.prepare_token_call(transfer, CallMethod::SupportsInterface { interface_id });
        }
        self.prepare_token_call(transfer, CallMethod::Name);
        self.prepare_token_call(transfer, CallMethod::Symbol);
        self.prepare_token_call(transfer, CallMethod::Decimals);
        self.prepare_token_call(transfer, CallMethod::TotalSupply);
        self.prepare_token_call(transfer, CallMethod::ContractUri);
        self.prepare_token_call(transfer, CallMethod::BaseUri);
        self.prepare_token_call(
            transfer,
            CallMethod::TokenUri {
                token_id: probe_token_id(transfer),
            },
        );
    }

    fn prepare_token_call(&mut self, transfer: &Transfer, method: CallMethod) {
        let call = CallData::new(&transfer.chain_id, &transfer.token_address, method, None);
        self.push(CallCategory::Token, call);
    }

    /// One bulk round-trip resolving every prepared call. Individual call
    /// failures leave the result empty; a transport failure fails the batch.
    pub async fn execute(
        &mut self,
        executor: &dyn CallExecutor,
        timeout: Duration,
    ) -> Result<(), SnapshotError> {
        if self.calls.is_empty() {
            return Ok(());
        }
        match tokio::time::timeout(timeout, executor.execute(&mut self.calls)).await {
            Ok(result) => result,
            Err(_) => Err(SnapshotError::Timeout(timeout)),
        }
    }

    // Extraction lookups. Each recomputes the identifier from the transfer,
    // exactly as preparation did.

    pub fn supports_interface(&self, transfer: &Transfer, interface_id: [u8; 4]) -> Option<bool> {
        let id = call_id(
            &transfer.chain_id,
            &transfer.token_address,
            &CallMethod::SupportsInterface { interface_id },
            None,
        );
        match self.lookup(CallCategory::Token, id) {
            Some(CallResult::Supports(value)) => Some(*value),
            _ => None,
        }
    }

    fn token_text(&self, transfer: &Transfer, method: CallMethod) -> Option<String> {
        let id = call_id(&transfer.chain_id, &transfer.token_address, &method, None);
        match self.lookup(CallCategory::Token, id) {
            Some(CallResult::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn token_name(&self, transfer: &Transfer) -> Option<String> {
        self.token_text(transfer, CallMethod::Name)
    }

    pub fn token_symbol(&self, transfer: &Transfer) -> Option<String> {
        self.token_text(transfer, CallMethod::Symbol)
    }

    pub fn token_decimals(&self, transfer: &Transfer) -> Option<u8> {
        let id = call_id(
            &transfer.chain_id,
            &transfer.token_address,
            &CallMethod::Decimals,
            None,
        );
        match self.lookup(CallCategory::Token, id) {
            Some(CallResult::Decimals(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn token_total_supply(&self, transfer: &Transfer) -> Option<U256> {
        let id = call_id(
            &transfer.chain_id,
            &transfer.token_address,
            &CallMethod::TotalSupply,
            None,
        );
        match self.lookup(CallCategory::Token, id) {
            Some(CallResult::Amount(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn token_contract_uri(&self, transfer: &Transfer) -> Option<String> {
        self.token_text(transfer, CallMethod::ContractUri)
    }

    pub fn token_base_uri(&self, transfer: &Transfer) -> Option<String> {
        self.token_text(transfer, CallMethod::BaseUri)
    }

    pub fn token_uri(&self, transfer: &Transfer) -> Option<String> {
        self.token_text(
            transfer,
            CallMethod::TokenUri {
                token_id: probe_token_id(transfer),
            },
        )
    }

    /// `balanceOf(owner)` at the transfer's block.
    pub fn erc20_block_balance(&self, transfer: &Transfer, owner: &str) -> Option<U256> {
        let id = call_id(
            &transfer.chain_id,
            &transfer.token_address,
            &CallMethod::BalanceOf {
                owner: owner.to_string(),
            },
            Some(transfer.block_number as u64),
        );
        match self.lookup(CallCategory::BalanceSnapshot, id) {
            Some(CallResult::Amount(value)) => Some(*value),
            _ => None,
        }
    }

    /// `ownerOf(tokenId)` at the transfer's block.
    pub fn erc721_block_owner(&self, transfer: &Transfer, token_id: &str) -> Option<Address> {
        let id = call_id(
            &transfer.chain_id,
            &transfer.token_address,
            &CallMethod::OwnerOf {
                token_id: token_id.to_string(),
            },
            Some(transfer.block_number as u64),
        );
        match self.lookup(CallCategory::BalanceSnapshot, id) {
            Some(CallResult::Owner(value)) => Some(*value),
            _ => None,
        }
    }

    /// `balanceOf(owner, id)` at the transfer's block.
    pub fn erc1155_block_balance(
        &self,
        transfer: &Transfer,
        owner: &str,
        token_id: &str,
    ) -> Option<U256> {
        let id = call_id(
            &transfer.chain_id,
            &transfer.token_address,
            &CallMethod::Erc1155BalanceOf {
                owner: owner.to_string(),
                token_id: token_id.to_string(),
            },
            Some(transfer.block_number as u64),
        );
        match self.lookup(CallCategory::BalanceSnapshot, id) {
            Some(CallResult::Amount(value)) => Some(*value),
            _ => None,
        }
    }

    #[cfg(test)]
    fn calls_mut(&mut self) -> &mut [CallData] {
        &mut self.calls
    }
}

/// Token id used for the `tokenURI` probe: the transfer's token id, falling
/// back to the raw amount field when absent (some decoders swap the two for
/// NFT mints).
fn probe_token_id(transfer: &Transfer) -> String {
    match &transfer.token_id {
        Some(token_id) if !token_id.is_empty() => token_id.clone(),
        _ => transfer.amount.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{transfer_from_batch, BatchTransferMessage};

    fn erc1155_batch_transfer(from: &str, to: &str) -> Transfer {
        transfer_from_batch(&BatchTransferMessage {
            transaction_hash: "0xhash".into(),
            chain_id: "1".into(),
            token_address: "0xc36cf0cfcb5d905b8b513860db0cfe63f6cf9f5c".into(),
            token_ids: vec!["1".into(), "2".into()],
            from: from.into(),
            to: to.into(),
            amounts: vec!["1".into(), "1".into()],
            token_type: TokenType::Erc1155,
            block_number: 200,
            block_timestamp: 1686537529,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_prepare_erc1155_batch_pairs() {
        let transfer = erc1155_batch_transfer(
            "0xef10f49704afd226d6af7cfafb9bc7f2f4fc5762",
            "0x9f452b7cc24e6e6fa690fe77cf5dd2ba3dbf1ed9",
        );
        let mut batcher = RpcBatcher::new();
        batcher.prepare_token_balance_calls(&transfer, TokenType::Erc1155);
        // Two ids, two endpoints.
        assert_eq!(batcher.len(), 4);
    }

    #[test]
    fn test_prepare_erc1155_skips_zero_address() {
        let transfer = erc1155_batch_transfer(
            ZERO_ADDRESS,
            "0x9f452b7cc24e6e6fa690fe77cf5dd2ba3dbf1ed9",
        );
        let mut batcher = RpcBatcher::new();
        batcher.prepare_token_balance_calls(&transfer, TokenType::Erc1155);
        assert_eq!(batcher.len(), 2);
    }

    #[test]
    fn test_prepare_unknown_prepares_both_variants() {
        let mut transfer = erc1155_batch_transfer(
            "0xef10f49704afd226d6af7cfafb9bc7f2f4fc5762",
            "0x9f452b7cc24e6e6fa690fe77cf5dd2ba3dbf1ed9",
        );
        transfer.token_ids.clear();
        transfer.token_id = Some("7".into());
        let mut batcher = RpcBatcher::new();
        batcher.prepare_token_balance_calls(&transfer, TokenType::Unknown);
        // Two balanceOf calls plus one ownerOf probe.
        assert_eq!(batcher.len(), 3);
    }

    #[test]
    fn test_new_token_call_set() {
        let transfer = erc1155_batch_transfer(
            "0xef10f49704afd226d6af7cfafb9bc7f2f4fc5762",
            "0x9f452b7cc24e6e6fa690fe77cf5dd2ba3dbf1ed9",
        );
        let mut batcher = RpcBatcher::new();
        batcher.prepare_new_token_calls(&transfer);
        // 4 interface probes + 6 metadata reads + the tokenURI probe.
        assert_eq!(batcher.len(), 11);
    }

    #[test]
    fn test_lookup_by_recomputed_id() {
        let transfer = erc1155_batch_transfer(
            "0xef10f49704afd226d6af7cfafb9bc7f2f4fc5762",
            "0x9f452b7cc24e6e6fa690fe77cf5dd2ba3dbf1ed9",
        );
        let mut batcher = RpcBatcher::new();
        batcher.prepare_token_balance_calls(&transfer, TokenType::Erc1155);
        for call in batcher.calls_mut() {
            call.result = Some(CallResult::Amount(U256::from(3u64)));
        }
        assert_eq!(
            batcher.erc1155_block_balance(
                &transfer,
                "0xef10f49704afd226d6af7cfafb9bc7f2f4fc5762",
                "1"
            ),
            Some(U256::from(3u64))
        );
        // Unprepared combination misses.
        assert_eq!(
            batcher.erc1155_block_balance(
                &transfer,
                "0xef10f49704afd226d6af7cfafb9bc7f2f4fc5762",
                "9"
            ),
            None
        );
    }
}
