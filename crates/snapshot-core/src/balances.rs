//! Extraction of post-block balances from a completed call batch.

use alloy::primitives::Address;

use crate::error::SnapshotError;
use crate::format::format_amount;
use crate::rpc::batcher::RpcBatcher;
use crate::token::{Token, TokenType};
use crate::transfer::{Transfer, ZERO_ADDRESS};

/// The balance of one endpoint of a transfer, ready for splicing.
#[derive(Debug, Clone)]
pub struct BalanceOutput {
    pub token_type: TokenType,
    pub contract_address: String,
    pub account_address: String,
    pub token_id: Option<String>,
    /// Decimal string.
    pub balance: String,
    pub formatted_balance: Option<f64>,
}

/// Extract balances for both transfer endpoints from the completed batch.
///
/// ERC-1155 batch transfers yield one (from, to) pair per token id; every
/// other type yields exactly one pair. A prepared call whose result is
/// missing surfaces as `RpcFailed` so the message can be redelivered.
pub fn extract_balances(
    batcher: &RpcBatcher,
    transfer: &mut Transfer,
    token: &Token,
) -> Result<Vec<BalanceOutput>, SnapshotError> {
    let base = |account: &str| BalanceOutput {
        token_type: token.token_type,
        contract_address: token.address.clone(),
        account_address: account.to_string(),
        token_id: transfer.token_id.clone(),
        balance: String::new(),
        formatted_balance: None,
    };
    let mut from = base(&transfer.from);
    let mut to = base(&transfer.to);

    match token.token_type {
        TokenType::Erc1155 => {
            if !transfer.token_ids.is_empty() {
                let mut outputs = Vec::with_capacity(transfer.token_ids.len() * 2);
                for token_id in &transfer.token_ids {
                    let mut pair_from = from.clone();
                    pair_from.token_id = Some(token_id.clone());
                    fill_erc1155(batcher, transfer, &mut pair_from, token_id)?;

                    let mut pair_to = to.clone();
                    pair_to.token_id = Some(token_id.clone());
                    fill_erc1155(batcher, transfer, &mut pair_to, token_id)?;

                    outputs.push(pair_from);
                    outputs.push(pair_to);
                }
                return Ok(outputs);
            }
            let token_id = transfer.token_id.clone().ok_or_else(|| {
                SnapshotError::MalformedEvent("erc1155 transfer without token id".into())
            })?;
            fill_erc1155(batcher, transfer, &mut from, &token_id)?;
            fill_erc1155(batcher, transfer, &mut to, &token_id)?;
        }
        TokenType::Erc721 => {
            let token_id = transfer.token_id.clone().ok_or_else(|| {
                SnapshotError::MalformedEvent("erc721 transfer without token id".into())
            })?;
            let owner = batcher
                .erc721_block_owner(transfer, &token_id)
                .ok_or_else(|| no_rpc_data(transfer, "ownerOf"))?;
            fill_erc721(&mut from, owner, &transfer.from)?;
            fill_erc721(&mut to, owner, &transfer.to)?;
        }
        TokenType::Erc20 => {
            from.balance = batcher
                .erc20_block_balance(transfer, &transfer.from)
                .ok_or_else(|| no_rpc_data(transfer, "balanceOf"))?
                .to_string();
            to.balance = batcher
                .erc20_block_balance(transfer, &transfer.to)
                .ok_or_else(|| no_rpc_data(transfer, "balanceOf"))?
                .to_string();
            if let Some(decimals) = token.decimals {
                from.formatted_balance = Some(format_amount(&from.balance, decimals)?);
                to.formatted_balance = Some(format_amount(&to.balance, decimals)?);
            }
            // A fungible transfer carries no token id; drop a stray one.
            transfer.token_id = None;
        }
        TokenType::Unknown => {
            return Err(SnapshotError::UnknownToken(token.address.clone()));
        }
    }

    Ok(vec![from, to])
}

fn fill_erc1155(
    batcher: &RpcBatcher,
    transfer: &Transfer,
    output: &mut BalanceOutput,
    token_id: &str,
) -> Result<(), SnapshotError> {
    // The zero-address endpoint of a mint or burn holds nothing and is never
    // queried.
    output.balance = if output.account_address == ZERO_ADDRESS {
        "0".to_string()
    } else {
        batcher
            .erc1155_block_balance(transfer, &output.account_address, token_id)
            .ok_or_else(|| no_rpc_data(transfer, "balanceOf(owner,id)"))?
            .to_string()
    };
    output.formatted_balance = output.balance.parse::<f64>().ok();
    Ok(())
}

fn fill_erc721(
    output: &mut BalanceOutput,
    owner_at_block: Address,
    endpoint: &str,
) -> Result<(), SnapshotError> {
    let endpoint_address = endpoint
        .parse::<Address>()
        .map_err(|_| SnapshotError::InvalidAddress(endpoint.to_string()))?;
    output.balance = if owner_at_block == endpoint_address {
        "1".to_string()
    } else {
        "0".to_string()
    };
    output.formatted_balance = output.balance.parse::<f64>().ok();
    Ok(())
}

fn no_rpc_data(transfer: &Transfer, method: &str) -> SnapshotError {
    SnapshotError::RpcFailed(format!(
        "no rpc data for {method} on {} at block {}",
        transfer.token_address, transfer.block_number
    ))
}
