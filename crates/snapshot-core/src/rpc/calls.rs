//! Call records with deterministic identifiers, calldata encoding, and typed
//! result decoding.
//!
//! An identifier is a function of (chain, target, method, args, block tag)
//! only, so the extraction phase can recompute it from the transfer without
//! holding a reference to the prepared call.

use alloy::primitives::{Address, FixedBytes, U256};
use alloy::sol_types::SolCall;

use crate::error::SnapshotError;
use crate::rpc::abi::{IContractMetadata, IERC1155, IERC165, IERC20Metadata, IERC721};

/// Deterministic identifier of one contract call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(pub u64);

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The read methods the batcher knows how to prepare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallMethod {
    SupportsInterface { interface_id: [u8; 4] },
    Name,
    Symbol,
    Decimals,
    TotalSupply,
    ContractUri,
    BaseUri,
    TokenUri { token_id: String },
    OwnerOf { token_id: String },
    BalanceOf { owner: String },
    Erc1155BalanceOf { owner: String, token_id: String },
}

impl CallMethod {
    fn signature(&self) -> &'static str {
        match self {
            CallMethod::SupportsInterface { .. } => "supportsInterface(bytes4)",
            CallMethod::Name => "name()",
            CallMethod::Symbol => "symbol()",
            CallMethod::Decimals => "decimals()",
            CallMethod::TotalSupply => "totalSupply()",
            CallMethod::ContractUri => "contractURI()",
            CallMethod::BaseUri => "baseURI()",
            CallMethod::TokenUri { .. } => "tokenURI(uint256)",
            CallMethod::OwnerOf { .. } => "ownerOf(uint256)",
            CallMethod::BalanceOf { .. } => "balanceOf(address)",
            CallMethod::Erc1155BalanceOf { .. } => "balanceOf(address,uint256)",
        }
    }

    fn args_key(&self) -> String {
        match self {
            CallMethod::SupportsInterface { interface_id } => {
                format!("0x{:02x}{:02x}{:02x}{:02x}", interface_id[0], interface_id[1], interface_id[2], interface_id[3])
            }
            CallMethod::Name
            | CallMethod::Symbol
            | CallMethod::Decimals
            | CallMethod::TotalSupply
            | CallMethod::ContractUri
            | CallMethod::BaseUri => String::new(),
            CallMethod::TokenUri { token_id } | CallMethod::OwnerOf { token_id } => {
                token_id.clone()
            }
            CallMethod::BalanceOf { owner } => owner.clone(),
            CallMethod::Erc1155BalanceOf { owner, token_id } => format!("{owner}:{token_id}"),
        }
    }
}

/// FNV-1a over the composed call key. Stable across processes, cheap enough
/// to recompute at extraction time.
fn fnv1a(parts: &[&str]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x00000100000001B3;

    let mut hash = OFFSET;
    for part in parts {
        for byte in part.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(PRIME);
        }
        // Separator guards against ambiguous concatenations.
        hash ^= 0x1f;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Compute the identifier for a call.
pub fn call_id(chain_id: &str, target: &str, method: &CallMethod, block: Option<u64>) -> CallId {
    let block_tag = block.map(|b| b.to_string()).unwrap_or_default();
    CallId(fnv1a(&[
        chain_id,
        target,
        method.signature(),
        &method.args_key(),
        &block_tag,
    ]))
}

/// Typed result of a completed call, keyed by the method that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Supports(bool),
    Text(String),
    Decimals(u8),
    Amount(U256),
    Owner(Address),
}

/// One prepared contract call. `result` stays empty until execution, and
/// stays empty if the individual call fails.
#[derive(Debug, Clone)]
pub struct CallData {
    pub id: CallId,
    pub chain_id: String,
    pub target: String,
    pub method: CallMethod,
    pub block: Option<u64>,
    pub result: Option<CallResult>,
}

impl CallData {
    pub fn new(chain_id: &str, target: &str, method: CallMethod, block: Option<u64>) -> Self {
        let id = call_id(chain_id, target, &method, block);
        Self {
            id,
            chain_id: chain_id.to_string(),
            target: target.to_string(),
            method,
            block,
            result: None,
        }
    }
}

fn parse_address(value: &str) -> Result<Address, SnapshotError> {
    value
        .parse::<Address>()
        .map_err(|_| SnapshotError::InvalidAddress(value.to_string()))
}

fn parse_u256(value: &str) -> Result<U256, SnapshotError> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|_| SnapshotError::InvalidAmount(value.to_string()))
}

/// Encode a call into its target address and calldata.
pub fn encode_call(call: &CallData) -> Result<(Address, Vec<u8>), SnapshotError> {
    let target = parse_address(&call.target)?;
    let data = match &call.method {
        CallMethod::SupportsInterface { interface_id } => IERC165::supportsInterfaceCall {
            interfaceId: FixedBytes::from(*interface_id),
        }
        .abi_encode(),
        CallMethod::Name => IERC20Metadata::nameCall {}.abi_encode(),
        CallMethod::Symbol => IERC20Metadata::symbolCall {}.abi_encode(),
        CallMethod::Decimals => IERC20Metadata::decimalsCall {}.abi_encode(),
        CallMethod::TotalSupply => IERC20Metadata::totalSupplyCall {}.abi_encode(),
        CallMethod::ContractUri => IContractMetadata::contractURICall {}.abi_encode(),
        CallMethod::BaseUri => IERC721::baseURICall {}.abi_encode(),
        CallMethod::TokenUri { token_id } => IERC721::tokenURICall {
            tokenId: parse_u256(token_id)?,
        }
        .abi_encode(),
        CallMethod::OwnerOf { token_id } => IERC721::ownerOfCall {
            tokenId: parse_u256(token_id)?,
        }
        .abi_encode(),
        CallMethod::BalanceOf { owner } => IERC20Metadata::balanceOfCall {
            owner: parse_address(owner)?,
        }
        .abi_encode(),
        CallMethod::Erc1155BalanceOf { owner, token_id } => IERC1155::balanceOfCall {
            account: parse_address(owner)?,
            id: parse_u256(token_id)?,
        }
        .abi_encode(),
    };
    Ok((target, data))
}

/// Decode a raw return into the method's typed result.
pub fn decode_result(method: &CallMethod, raw: &[u8]) -> Result<CallResult, SnapshotError> {
    let decode_err = |e: alloy::sol_types::Error| SnapshotError::RpcFailed(e.to_string());
    let result = match method {
        CallMethod::SupportsInterface { .. } => CallResult::Supports(
            IERC165::supportsInterfaceCall::abi_decode_returns(raw).map_err(decode_err)?,
        ),
        CallMethod::Name => {
            CallResult::Text(IERC20Metadata::nameCall::abi_decode_returns(raw).map_err(decode_err)?)
        }
        CallMethod::Symbol => CallResult::Text(
            IERC20Metadata::symbolCall::abi_decode_returns(raw).map_err(decode_err)?,
        ),
        CallMethod::Decimals => CallResult::Decimals(
            IERC20Metadata::decimalsCall::abi_decode_returns(raw).map_err(decode_err)?,
        ),
        CallMethod::TotalSupply => CallResult::Amount(
            IERC20Metadata::totalSupplyCall::abi_decode_returns(raw).map_err(decode_err)?,
        ),
        CallMethod::ContractUri => CallResult::Text(
            IContractMetadata::contractURICall::abi_decode_returns(raw).map_err(decode_err)?,
        ),
        CallMethod::BaseUri => {
            CallResult::Text(IERC721::baseURICall::abi_decode_returns(raw).map_err(decode_err)?)
        }
        CallMethod::TokenUri { .. } => {
            CallResult::Text(IERC721::tokenURICall::abi_decode_returns(raw).map_err(decode_err)?)
        }
        CallMethod::OwnerOf { .. } => {
            CallResult::Owner(IERC721::ownerOfCall::abi_decode_returns(raw).map_err(decode_err)?)
        }
        CallMethod::BalanceOf { .. } => CallResult::Amount(
            IERC20Metadata::balanceOfCall::abi_decode_returns(raw).map_err(decode_err)?,
        ),
        CallMethod::Erc1155BalanceOf { .. } => {
            CallResult::Amount(IERC1155::balanceOfCall::abi_decode_returns(raw).map_err(decode_err)?)
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::abi::ERC721_INTERFACE_ID;

    const TOKEN: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    const OWNER: &str = "0xea639dfb59d652ab056a2194ff3d9d7ad9744d07";

    #[test]
    fn test_call_id_deterministic() {
        let method = CallMethod::BalanceOf { owner: OWNER.into() };
        assert_eq!(
            call_id("1", TOKEN, &method, Some(100)),
            call_id("1", TOKEN, &method, Some(100))
        );
    }

    #[test]
    fn test_call_id_varies_by_block_and_args() {
        let method = CallMethod::BalanceOf { owner: OWNER.into() };
        assert_ne!(
            call_id("1", TOKEN, &method, Some(100)),
            call_id("1", TOKEN, &method, Some(101))
        );
        assert_ne!(
            call_id("1", TOKEN, &method, None),
            call_id("1", TOKEN, &method, Some(100))
        );
        assert_ne!(
            call_id("1", TOKEN, &CallMethod::Name, None),
            call_id("1", TOKEN, &CallMethod::Symbol, None)
        );
    }

    #[test]
    fn test_encode_balance_of_selector() {
        let call = CallData::new(
            "1",
            TOKEN,
            CallMethod::BalanceOf { owner: OWNER.into() },
            Some(100),
        );
        let (target, data) = encode_call(&call).unwrap();
        assert_eq!(format!("{target:#x}"), TOKEN);
        // keccak256("balanceOf(address)")[..4]
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(data.len(), 4 + 32);
    }

    #[test]
    fn test_encode_supports_interface_selector() {
        let call = CallData::new(
            "1",
            TOKEN,
            CallMethod::SupportsInterface {
                interface_id: ERC721_INTERFACE_ID,
            },
            None,
        );
        let (_, data) = encode_call(&call).unwrap();
        // keccak256("supportsInterface(bytes4)")[..4]
        assert_eq!(&data[..4], &[0x01, 0xff, 0xc9, 0xa7]);
    }

    #[test]
    fn test_encode_rejects_bad_address() {
        let call = CallData::new(
            "1",
            "not-an-address",
            CallMethod::Name,
            None,
        );
        assert!(matches!(
            encode_call(&call),
            Err(SnapshotError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_parse_u256_decimal_and_hex() {
        assert_eq!(parse_u256("42").unwrap(), U256::from(42u64));
        assert_eq!(parse_u256("0x2a").unwrap(), U256::from(42u64));
        assert!(parse_u256("").is_err());
        assert!(parse_u256("12abc").is_err());
    }

    #[test]
    fn test_decode_round_trip() {
        let method = CallMethod::Decimals;
        let encoded = alloy::sol_types::SolValue::abi_encode(&U256::from(18u8));
        let decoded = decode_result(&method, &encoded).unwrap();
        assert_eq!(decoded, CallResult::Decimals(18));

        let method = CallMethod::BalanceOf { owner: OWNER.into() };
        let encoded = alloy::sol_types::SolValue::abi_encode(&U256::from(500u64));
        assert_eq!(
            decode_result(&method, &encoded).unwrap(),
            CallResult::Amount(U256::from(500u64))
        );
    }
}
