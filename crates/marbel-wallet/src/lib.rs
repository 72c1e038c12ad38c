//! Wallet adapter trait and the hub calls it can submit.
//!
//! The wallet itself lives outside this SDK (browser extension bridge,
//! hardware wallet, test double); this crate defines the seam. Provides a
//! `FixedWallet` for testing.

use async_trait::async_trait;

use alloy_primitives::Address;
use marbel_signing::{CommentWithSigData, MirrorWithSigData, PostWithSigData, TypedData};
use marbel_types::{Hex, MarbelError, Result};

pub mod fixed;

pub use fixed::FixedWallet;

/// A hub contract call carrying a signed action payload, submitted directly
/// when relayed broadcast is rejected or disabled.
#[derive(Debug, Clone)]
pub enum HubCall {
    CommentWithSig(CommentWithSigData),
    PostWithSig(PostWithSigData),
    MirrorWithSig(MirrorWithSigData),
}

impl HubCall {
    /// Hub method name for ABI dispatch.
    pub fn method(&self) -> &'static str {
        match self {
            Self::CommentWithSig(_) => "commentWithSig",
            Self::PostWithSig(_) => "postWithSig",
            Self::MirrorWithSig(_) => "mirrorWithSig",
        }
    }

    /// The call's input struct as JSON, the shape an ABI encoder consumes.
    pub fn args(&self) -> Result<serde_json::Value> {
        let encoded = match self {
            Self::CommentWithSig(data) => serde_json::to_value(data),
            Self::PostWithSig(data) => serde_json::to_value(data),
            Self::MirrorWithSig(data) => serde_json::to_value(data),
        };
        encoded.map_err(|e| MarbelError::Wallet(format!("failed to encode call args: {}", e)))
    }
}

/// The wallet capabilities the action engine relies on.
///
/// Address and chain are reads of externally owned state; this SDK never
/// mutates them.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// Connected account, None when no wallet session exists.
    fn address(&self) -> Option<Address>;

    /// The chain the wallet is currently on.
    fn chain_id(&self) -> u64;

    /// EIP-712 signature over sanitized typed data.
    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Hex>;

    /// Plain message signature, used for the login challenge.
    async fn sign_message(&self, message: &str) -> Result<Hex>;

    /// Submit a hub call as a direct transaction, returning its hash.
    async fn write(&self, hub: Address, call: &HubCall) -> Result<Hex>;
}
