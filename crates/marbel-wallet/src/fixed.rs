//! Deterministic wallet for testing.

use std::sync::Mutex;

use async_trait::async_trait;

use alloy_primitives::Address;
use marbel_signing::TypedData;
use marbel_types::{Hex, MarbelError, Result};

use crate::{HubCall, WalletAdapter};

/// Wallet returning canned signatures and recording every call.
pub struct FixedWallet {
    address: Option<Address>,
    chain_id: u64,
    reject_signing: bool,
    signed_typed_data: Mutex<Vec<TypedData>>,
    signed_messages: Mutex<Vec<String>>,
    writes: Mutex<Vec<(Address, HubCall)>>,
}

impl FixedWallet {
    /// Signature every signing call returns: r of 0x11 bytes, s of 0x22
    /// bytes, recovery byte 27.
    pub const SIGNATURE: &'static str = "0x111111111111111111111111111111111111111111111111111111111111111122222222222222222222222222222222222222222222222222222222222222221b";

    /// Hash every direct write returns.
    pub const TX_HASH: &'static str =
        "0x7777777777777777777777777777777777777777777777777777777777777777";

    pub const ADDRESS: Address = Address::repeat_byte(0x42);

    /// Connected wallet on the given chain.
    pub fn new(chain_id: u64) -> Self {
        Self {
            address: Some(Self::ADDRESS),
            chain_id,
            reject_signing: false,
            signed_typed_data: Mutex::new(Vec::new()),
            signed_messages: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Wallet with no connected account.
    pub fn disconnected() -> Self {
        Self {
            address: None,
            ..Self::new(0)
        }
    }

    /// Connected wallet whose user rejects every signing prompt.
    pub fn rejecting(chain_id: u64) -> Self {
        Self {
            reject_signing: true,
            ..Self::new(chain_id)
        }
    }

    /// Typed-data payloads passed to signing so far.
    pub fn signed_typed_data(&self) -> Vec<TypedData> {
        self.signed_typed_data.lock().unwrap().clone()
    }

    /// Messages passed to plain signing so far.
    pub fn signed_messages(&self) -> Vec<String> {
        self.signed_messages.lock().unwrap().clone()
    }

    /// Direct hub writes issued so far.
    pub fn writes(&self) -> Vec<(Address, HubCall)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletAdapter for FixedWallet {
    fn address(&self) -> Option<Address> {
        self.address
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn sign_typed_data(&self, typed_data: &TypedData) -> Result<Hex> {
        if self.reject_signing {
            return Err(MarbelError::UserRejected);
        }
        self.signed_typed_data
            .lock()
            .unwrap()
            .push(typed_data.clone());
        Ok(Self::SIGNATURE.to_string())
    }

    async fn sign_message(&self, message: &str) -> Result<Hex> {
        if self.reject_signing {
            return Err(MarbelError::UserRejected);
        }
        self.signed_messages
            .lock()
            .unwrap()
            .push(message.to_string());
        Ok(Self::SIGNATURE.to_string())
    }

    async fn write(&self, hub: Address, call: &HubCall) -> Result<Hex> {
        self.writes.lock().unwrap().push((hub, call.clone()));
        Ok(Self::TX_HASH.to_string())
    }
}
