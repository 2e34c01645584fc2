//! Token records and the token type classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// ERC standard of a token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TokenType {
    Erc20,
    Erc721,
    Erc1155,
    #[default]
    Unknown,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Erc20 => "ERC20",
            TokenType::Erc721 => "ERC721",
            TokenType::Erc1155 => "ERC1155",
            TokenType::Unknown => "UNKNOWN",
        }
    }

    /// Parse the persisted representation, falling back to [`TokenType::Unknown`].
    pub fn parse(value: &str) -> Self {
        match value {
            "ERC20" => TokenType::Erc20,
            "ERC721" => TokenType::Erc721,
            "ERC1155" => TokenType::Erc1155,
            _ => TokenType::Unknown,
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TokenType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// The wire is lenient: any unrecognized or empty type string is UNKNOWN.
impl<'de> Deserialize<'de> for TokenType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(TokenType::parse(&value))
    }
}

/// A token contract as persisted in the token store and the shared cache.
///
/// Created lazily on first sighting and immutable afterwards, except for the
/// last-seen transfer triple which is refreshed together with the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    pub blockchain: String,
    pub chain_id: String,
    pub address: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_metadata_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transfer_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transfer_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transfer_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Canonical store identity for a token contract.
    pub fn id_for(chain_id: &str, address: &str) -> String {
        format!("{chain_id}{address}")
    }
}
