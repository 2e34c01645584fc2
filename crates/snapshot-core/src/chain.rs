//! Chain-id to blockchain mapping and chain-derived naming rules.
//!
//! The mapping is explicit configuration input; nothing in this module reads
//! the environment.

use crate::error::SnapshotError;

/// Chain id of Ethereum mainnet, the chain that keeps bare names.
pub const CHAIN_ID_ETHEREUM: &str = "1";

const CHAINS: &[(&str, &str)] = &[
    ("1", "ethereum"),
    ("10", "optimism"),
    ("56", "bsc"),
    ("137", "polygon"),
    ("250", "fantom"),
    ("8453", "base"),
    ("42161", "arbitrum"),
];

/// Resolve the blockchain name for a chain id.
pub fn blockchain_from_chain_id(chain_id: &str) -> Result<&'static str, SnapshotError> {
    CHAINS
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, name)| *name)
        .ok_or_else(|| SnapshotError::InvalidChain(chain_id.to_string()))
}

/// Derive the database name for a chain.
///
/// Ethereum uses the bare base name; every other chain prefixes it with the
/// uppercased blockchain name.
pub fn database_name(chain_id: &str, base: &str) -> Result<String, SnapshotError> {
    if chain_id == CHAIN_ID_ETHEREUM {
        return Ok(base.to_string());
    }
    let blockchain = blockchain_from_chain_id(chain_id)?;
    Ok(format!("{}_{}", blockchain.to_uppercase(), base))
}

/// Derive the consumer group id for a chain.
///
/// Off Ethereum the group id is suffixed with the blockchain name so every
/// chain deployment forms its own group.
pub fn consumer_group_id(chain_id: &str, group_id: &str) -> Result<String, SnapshotError> {
    if chain_id == CHAIN_ID_ETHEREUM {
        return Ok(group_id.to_string());
    }
    let blockchain = blockchain_from_chain_id(chain_id)?;
    Ok(format!("{group_id}-{blockchain}"))
}
