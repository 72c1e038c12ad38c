use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 0x-prefixed hex string (e.g. "0xabc...").
pub type Hex = String;

/// Profile identifier as issued by the protocol (e.g. "0x01").
pub type ProfileId = String;

/// Publication identifier, `{profileId}-{pubId}` (e.g. "0x01-0x01").
pub type PublicationId = String;

/// Marbel client SDK error types.
#[derive(Debug, Error)]
pub enum MarbelError {
    #[error("Please connect your wallet")]
    WalletNotConnected,

    #[error("wrong network: action requires chain {expected}, wallet is on chain {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    #[error("publication has no content and no attachments")]
    EmptyPublication,

    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("content upload failed: {0}")]
    Upload(String),

    #[error("indexer request failed: {0}")]
    Indexer(String),

    #[error("indexer returned errors: {0}")]
    Api(String),

    #[error("relayer declined: {0}")]
    RelayRejected(String),

    #[error("signature request rejected by user")]
    UserRejected,

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("a {0} action is already in flight")]
    ActionInFlight(&'static str),

    #[error("session storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, MarbelError>;

/// Bearer tokens issued by the indexer's authenticate mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Parse a hex string (with or without 0x prefix) into bytes.
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| MarbelError::InvalidHex(e.to_string()))
}

/// Convert bytes to a 0x-prefixed hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> Hex {
    format!("0x{}", hex::encode(bytes))
}
