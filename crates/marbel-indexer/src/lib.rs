//! Indexer GraphQL API: typed-data generation, relayed broadcast,
//! authentication, and profile/feed read queries.
//!
//! - `IndexerApi`: the mutation and auth surface the action engine drives
//! - `model`: read models decoded from query responses
//! - `client`: reqwest-backed implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use marbel_signing::TypedDataEnvelope;
use marbel_types::{AuthTokens, Hex, MarbelError, ProfileId, PublicationId, Result};

pub mod client;
pub mod model;

pub use client::IndexerClient;
pub use model::FeedType;

/// Rejection reason meaning the relayer declined this submission and the
/// caller should fall back to a direct on-chain write.
pub const RELAY_NOT_ALLOWED: &str = "NOT_ALLOWED";

/// Fee schedule for a paid collect module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleFeeAmount {
    pub currency: Hex,
    pub value: String,
}

/// Collect module selection sent with comment/post typed-data requests.
///
/// Serializes externally tagged (`{"freeCollectModule": {...}}`), the shape
/// the API expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectModuleParams {
    #[serde(rename_all = "camelCase")]
    FreeCollectModule { follower_only: bool },
    #[serde(rename_all = "camelCase")]
    FeeCollectModule {
        amount: ModuleFeeAmount,
        recipient: Hex,
        referral_fee: f64,
        follower_only: bool,
    },
}

impl Default for CollectModuleParams {
    fn default() -> Self {
        Self::FreeCollectModule {
            follower_only: false,
        }
    }
}

/// Reference module selection; only the follower-only toggle exists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceModuleParams {
    #[serde(rename = "followerOnlyReferenceModule")]
    pub follower_only_reference_module: bool,
}

/// createCommentTypedData request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub profile_id: ProfileId,
    pub publication_id: PublicationId,
    #[serde(rename = "contentURI")]
    pub content_uri: String,
    pub collect_module: CollectModuleParams,
    pub reference_module: ReferenceModuleParams,
}

/// createPostTypedData request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub profile_id: ProfileId,
    #[serde(rename = "contentURI")]
    pub content_uri: String,
    pub collect_module: CollectModuleParams,
    pub reference_module: ReferenceModuleParams,
}

/// createMirrorTypedData request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMirrorRequest {
    pub profile_id: ProfileId,
    pub publication_id: PublicationId,
    pub reference_module: ReferenceModuleParams,
}

/// createProfile request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    pub handle: String,
    pub profile_picture_uri: String,
}

/// Relayer mutation result on the wire, the RelayerResult | RelayError
/// union flattened to two optional fields.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayResult {
    #[serde(rename = "txHash")]
    pub tx_hash: Option<Hex>,
    pub reason: Option<String>,
}

impl RelayResult {
    pub fn into_outcome(self) -> Result<BroadcastOutcome> {
        if let Some(tx_hash) = self.tx_hash {
            return Ok(BroadcastOutcome::Success { tx_hash });
        }
        match self.reason {
            Some(reason) => Ok(BroadcastOutcome::Rejected { reason }),
            None => Err(MarbelError::Api(
                "relayer result carried neither txHash nor reason".into(),
            )),
        }
    }
}

/// What a relayer mutation came back with. A rejection is a routing signal
/// for the caller, not an error by itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Success { tx_hash: Hex },
    Rejected { reason: String },
}

impl BroadcastOutcome {
    /// Whether this rejection means "retry as a direct write".
    pub fn is_not_allowed(&self) -> bool {
        matches!(self, Self::Rejected { reason } if reason == RELAY_NOT_ALLOWED)
    }
}

/// The indexer mutations and auth calls the action engine drives.
///
/// All methods are async; implementations are expected to be stateless
/// between calls apart from the installed access token.
#[async_trait]
pub trait IndexerApi: Send + Sync {
    async fn create_comment_typed_data(
        &self,
        request: &CreateCommentRequest,
    ) -> Result<TypedDataEnvelope>;

    async fn create_post_typed_data(
        &self,
        request: &CreatePostRequest,
    ) -> Result<TypedDataEnvelope>;

    async fn create_mirror_typed_data(
        &self,
        request: &CreateMirrorRequest,
    ) -> Result<TypedDataEnvelope>;

    /// Submit { envelope id, raw signature } for relayed submission.
    async fn broadcast(&self, id: &str, signature: &str) -> Result<BroadcastOutcome>;

    /// Ask the relayer to create a profile; no signature leg exists here.
    async fn create_profile(&self, request: &CreateProfileRequest) -> Result<BroadcastOutcome>;

    /// Fetch the login challenge text for a wallet address.
    async fn challenge(&self, address: &str) -> Result<String>;

    /// Exchange a signed challenge for access/refresh tokens.
    async fn authenticate(&self, address: &str, signature: &str) -> Result<AuthTokens>;

    /// List the profiles owned by a wallet address.
    async fn profiles_owned_by(&self, address: &str) -> Result<Vec<model::Profile>>;

    /// Install the token sent as `x-access-token` on subsequent calls.
    fn set_access_token(&self, _token: Option<String>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_request_wire_shape() {
        let request = CreateCommentRequest {
            profile_id: "0x01".into(),
            publication_id: "0x01-0x01".into(),
            content_uri: "https://ipfs.infura.io/ipfs/Qm123".into(),
            collect_module: CollectModuleParams::default(),
            reference_module: ReferenceModuleParams::default(),
        };
        let rendered = serde_json::to_value(&request).unwrap();
        assert_eq!(rendered["profileId"], "0x01");
        assert_eq!(rendered["publicationId"], "0x01-0x01");
        assert_eq!(rendered["contentURI"], "https://ipfs.infura.io/ipfs/Qm123");
        assert_eq!(
            rendered["collectModule"]["freeCollectModule"]["followerOnly"],
            false
        );
        assert_eq!(
            rendered["referenceModule"]["followerOnlyReferenceModule"],
            false
        );
    }

    #[test]
    fn test_fee_collect_module_wire_shape() {
        let module = CollectModuleParams::FeeCollectModule {
            amount: ModuleFeeAmount {
                currency: "0x9c3c9283d3e44854697cd22d3faa240cfb032889".into(),
                value: "0.01".into(),
            },
            recipient: "0xd1a8".into(),
            referral_fee: 10.5,
            follower_only: true,
        };
        let rendered = serde_json::to_value(&module).unwrap();
        let fee = &rendered["feeCollectModule"];
        assert_eq!(fee["amount"]["value"], "0.01");
        assert_eq!(fee["recipient"], "0xd1a8");
        assert_eq!(fee["referralFee"], 10.5);
        assert_eq!(fee["followerOnly"], true);
    }

    #[test]
    fn test_relay_result_routing() {
        let success = RelayResult {
            tx_hash: Some("0xabc".into()),
            reason: None,
        };
        assert_eq!(
            success.into_outcome().unwrap(),
            BroadcastOutcome::Success {
                tx_hash: "0xabc".into()
            }
        );

        let rejected = RelayResult {
            tx_hash: None,
            reason: Some(RELAY_NOT_ALLOWED.into()),
        };
        let outcome = rejected.into_outcome().unwrap();
        assert!(outcome.is_not_allowed());

        let other = RelayResult {
            tx_hash: None,
            reason: Some("HANDLE_TAKEN".into()),
        };
        assert!(!other.into_outcome().unwrap().is_not_allowed());

        let empty = RelayResult {
            tx_hash: None,
            reason: None,
        };
        assert!(empty.into_outcome().is_err());
    }
}
