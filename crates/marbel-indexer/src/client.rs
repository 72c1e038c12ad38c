//! GraphQL-over-HTTP client for the protocol indexer.
//!
//! One POST endpoint; every operation is a { query, variables } body. The
//! access token obtained at login travels as the `x-access-token` header.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use async_trait::async_trait;
use marbel_signing::TypedDataEnvelope;
use marbel_types::{AuthTokens, MarbelError, Result};

use crate::model::{FeedItem, FeedType, HasMirroredResult, NftItem, Paginated, Profile, TxIndexedResult};
use crate::{
    BroadcastOutcome, CreateCommentRequest, CreateMirrorRequest, CreatePostRequest,
    CreateProfileRequest, IndexerApi, RelayResult,
};

const CREATE_COMMENT_TYPED_DATA_MUTATION: &str = r#"
  mutation CreateCommentTypedData($request: CreatePublicCommentRequest!) {
    createCommentTypedData(request: $request) {
      id
      expiresAt
      typedData {
        types {
          CommentWithSig {
            name
            type
          }
        }
        domain {
          name
          chainId
          version
          verifyingContract
        }
        value {
          nonce
          deadline
          profileId
          profileIdPointed
          pubIdPointed
          contentURI
          collectModule
          collectModuleInitData
          referenceModule
          referenceModuleData
          referenceModuleInitData
        }
      }
    }
  }
"#;

const CREATE_POST_TYPED_DATA_MUTATION: &str = r#"
  mutation CreatePostTypedData($request: CreatePublicPostRequest!) {
    createPostTypedData(request: $request) {
      id
      expiresAt
      typedData {
        types {
          PostWithSig {
            name
            type
          }
        }
        domain {
          name
          chainId
          version
          verifyingContract
        }
        value {
          nonce
          deadline
          profileId
          contentURI
          collectModule
          collectModuleInitData
          referenceModule
          referenceModuleInitData
        }
      }
    }
  }
"#;

const CREATE_MIRROR_TYPED_DATA_MUTATION: &str = r#"
  mutation CreateMirrorTypedData($request: CreateMirrorRequest!) {
    createMirrorTypedData(request: $request) {
      id
      expiresAt
      typedData {
        types {
          MirrorWithSig {
            name
            type
          }
        }
        domain {
          name
          chainId
          version
          verifyingContract
        }
        value {
          nonce
          deadline
          profileId
          profileIdPointed
          pubIdPointed
          referenceModule
          referenceModuleData
          referenceModuleInitData
        }
      }
    }
  }
"#;

const BROADCAST_MUTATION: &str = r#"
  mutation Broadcast($request: BroadcastRequest!) {
    broadcast(request: $request) {
      ... on RelayerResult {
        txHash
      }
      ... on RelayError {
        reason
      }
    }
  }
"#;

const CREATE_PROFILE_MUTATION: &str = r#"
  mutation CreateProfile($request: CreateProfileRequest!) {
    createProfile(request: $request) {
      ... on RelayerResult {
        txHash
      }
      ... on RelayError {
        reason
      }
    }
  }
"#;

const CHALLENGE_QUERY: &str = r#"
  query Challenge($request: ChallengeRequest!) {
    challenge(request: $request) {
      text
    }
  }
"#;

const AUTHENTICATE_MUTATION: &str = r#"
  mutation Authenticate($request: SignedAuthChallenge!) {
    authenticate(request: $request) {
      accessToken
      refreshToken
    }
  }
"#;

const CURRENT_USER_QUERY: &str = r#"
  query CurrentUser($ownedBy: [EthereumAddress!]) {
    profiles(request: { ownedBy: $ownedBy }) {
      items {
        id
        handle
        ownedBy
      }
    }
  }
"#;

const PROFILE_QUERY: &str = r#"
  query Profile($request: ProfileQueryRequest!) {
    profiles(request: $request) {
      items {
        id
        handle
        ownedBy
        name
        attributes {
          key
          value
        }
        bio
        stats {
          totalFollowers
          totalFollowing
          totalPosts
          totalComments
          totalMirrors
        }
        picture {
          ... on MediaSet {
            original {
              url
            }
          }
          ... on NftImage {
            uri
          }
        }
        coverPicture {
          ... on MediaSet {
            original {
              url
            }
          }
        }
        followModule {
          __typename
        }
      }
    }
  }
"#;

const PROFILE_FEED_QUERY: &str = r#"
  query ProfileFeed($request: PublicationsQueryRequest!) {
    publications(request: $request) {
      items {
        __typename
        ... on Post {
          id
          profile {
            id
            handle
          }
          metadata {
            name
            content
          }
          stats {
            totalAmountOfMirrors
            totalAmountOfComments
            totalAmountOfCollects
          }
          createdAt
        }
        ... on Comment {
          id
          profile {
            id
            handle
          }
          metadata {
            name
            content
          }
          stats {
            totalAmountOfMirrors
            totalAmountOfComments
            totalAmountOfCollects
          }
          createdAt
        }
        ... on Mirror {
          id
          profile {
            id
            handle
          }
          metadata {
            name
            content
          }
          stats {
            totalAmountOfMirrors
            totalAmountOfComments
            totalAmountOfCollects
          }
          createdAt
        }
      }
      pageInfo {
        next
        totalCount
      }
    }
  }
"#;

const NFT_FEED_QUERY: &str = r#"
  query ProfileNFTFeed($request: NFTsRequest!) {
    nfts(request: $request) {
      items {
        name
        collectionName
        contractAddress
        tokenId
        chainId
        originalContent {
          uri
          animatedUrl
        }
      }
      pageInfo {
        next
        totalCount
      }
    }
  }
"#;

const HAS_MIRRORED_QUERY: &str = r#"
  query HasMirrored($profileId: ProfileId!, $publicationIds: [InternalPublicationId!]!) {
    hasMirrored(
      request: { profilesRequest: [{ profileId: $profileId, publicationIds: $publicationIds }] }
    ) {
      profileId
      results {
        mirrored
        publicationId
      }
    }
  }
"#;

const HAS_TX_HASH_BEEN_INDEXED_QUERY: &str = r#"
  query HasTxHashBeenIndexed($request: HasTxHashBeenIndexedRequest!) {
    hasTxHashBeenIndexed(request: $request) {
      ... on TransactionIndexedResult {
        indexed
      }
      ... on TransactionError {
        reason
      }
    }
  }
"#;

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<serde_json::Value>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ItemsEnvelope<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ChallengeText {
    text: String,
}

fn decode_field<T: DeserializeOwned>(mut data: serde_json::Value, field: &str) -> Result<T> {
    let value = data
        .get_mut(field)
        .map(serde_json::Value::take)
        .ok_or_else(|| MarbelError::Api(format!("indexer response missing {}", field)))?;
    serde_json::from_value(value)
        .map_err(|e| MarbelError::Api(format!("failed to decode {}: {}", field, e)))
}

/// Indexer API client.
pub struct IndexerClient {
    api_url: String,
    client: reqwest::Client,
    timeout: Duration,
    access_token: Mutex<Option<String>>,
}

impl IndexerClient {
    pub fn new(api_url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(30_000);
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
            access_token: Mutex::new(None),
        }
    }

    async fn execute(&self, query: &str, variables: serde_json::Value) -> Result<serde_json::Value> {
        let mut request = self
            .client
            .post(&self.api_url)
            .json(&serde_json::json!({ "query": query, "variables": variables }))
            .timeout(self.timeout);

        let token = self.access_token.lock().unwrap().clone();
        if let Some(token) = token {
            request = request.header("x-access-token", token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| MarbelError::Api(format!("indexer request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MarbelError::Api(format!(
                "indexer returned status {}: {}",
                status, body
            )));
        }

        let body: GraphqlResponse = resp
            .json()
            .await
            .map_err(|e| MarbelError::Api(format!("failed to parse indexer response: {}", e)))?;

        if let Some(errors) = body.errors {
            if let Some(first) = errors.into_iter().next() {
                return Err(MarbelError::Api(first.message));
            }
        }

        body.data
            .ok_or_else(|| MarbelError::Api("indexer response carried no data".into()))
    }

    /// Look up a profile by handle; None when the handle is unknown.
    pub async fn profile_by_handle(&self, handle: &str) -> Result<Option<Profile>> {
        let variables = serde_json::json!({ "request": { "handles": [handle] } });
        let data = self.execute(PROFILE_QUERY, variables).await?;
        let profiles: ItemsEnvelope<Profile> = decode_field(data, "profiles")?;
        Ok(profiles.items.into_iter().next())
    }

    /// One page of a profile's publications, filtered by feed tab.
    pub async fn publications(
        &self,
        profile_id: &str,
        feed: FeedType,
        limit: u64,
        cursor: Option<&str>,
    ) -> Result<Paginated<FeedItem>> {
        let mut request = serde_json::json!({
            "profileId": profile_id,
            "limit": limit,
        });
        if let Some(kind) = feed.publication_type() {
            request["publicationTypes"] = serde_json::json!([kind]);
        }
        if let Some(cursor) = cursor {
            request["cursor"] = serde_json::json!(cursor);
        }

        let data = self
            .execute(PROFILE_FEED_QUERY, serde_json::json!({ "request": request }))
            .await?;
        decode_field(data, "publications")
    }

    /// One page of NFTs owned by an address, for the NFT feed tab.
    pub async fn nfts(
        &self,
        owner: &str,
        chain_id: u64,
        limit: u64,
        cursor: Option<&str>,
    ) -> Result<Paginated<NftItem>> {
        let mut request = serde_json::json!({
            "ownerAddress": owner,
            "chainIds": [chain_id],
            "limit": limit,
        });
        if let Some(cursor) = cursor {
            request["cursor"] = serde_json::json!(cursor);
        }

        let data = self
            .execute(NFT_FEED_QUERY, serde_json::json!({ "request": request }))
            .await?;
        decode_field(data, "nfts")
    }

    /// Mirror status of a set of publications for one profile.
    pub async fn has_mirrored(
        &self,
        profile_id: &str,
        publication_ids: &[String],
    ) -> Result<Vec<HasMirroredResult>> {
        let variables = serde_json::json!({
            "profileId": profile_id,
            "publicationIds": publication_ids,
        });
        let data = self.execute(HAS_MIRRORED_QUERY, variables).await?;
        decode_field(data, "hasMirrored")
    }

    /// Indexing status of a submitted transaction.
    pub async fn tx_indexed(&self, tx_hash: &str) -> Result<TxIndexedResult> {
        let variables = serde_json::json!({ "request": { "txHash": tx_hash } });
        let data = self.execute(HAS_TX_HASH_BEEN_INDEXED_QUERY, variables).await?;
        decode_field(data, "hasTxHashBeenIndexed")
    }

    /// Poll until the indexer has picked up a transaction, waiting between
    /// attempts. A reported transaction error ends the poll early.
    pub async fn wait_until_indexed(
        &self,
        tx_hash: &str,
        max_attempts: u32,
        poll_interval_ms: u64,
    ) -> Result<()> {
        for attempt in 0..max_attempts {
            let status = self.tx_indexed(tx_hash).await?;
            if let Some(reason) = status.reason {
                return Err(MarbelError::Indexer(format!(
                    "transaction failed: {}",
                    reason
                )));
            }
            if status.indexed == Some(true) {
                debug!(tx_hash = %tx_hash, "transaction indexed");
                return Ok(());
            }
            if attempt + 1 < max_attempts {
                tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
            }
        }
        Err(MarbelError::Indexer(format!(
            "tx {} not indexed after {} attempts",
            tx_hash, max_attempts
        )))
    }
}

#[async_trait]
impl IndexerApi for IndexerClient {
    async fn create_comment_typed_data(
        &self,
        request: &CreateCommentRequest,
    ) -> Result<TypedDataEnvelope> {
        let variables = serde_json::json!({ "request": request });
        let data = self
            .execute(CREATE_COMMENT_TYPED_DATA_MUTATION, variables)
            .await?;
        decode_field(data, "createCommentTypedData")
    }

    async fn create_post_typed_data(
        &self,
        request: &CreatePostRequest,
    ) -> Result<TypedDataEnvelope> {
        let variables = serde_json::json!({ "request": request });
        let data = self
            .execute(CREATE_POST_TYPED_DATA_MUTATION, variables)
            .await?;
        decode_field(data, "createPostTypedData")
    }

    async fn create_mirror_typed_data(
        &self,
        request: &CreateMirrorRequest,
    ) -> Result<TypedDataEnvelope> {
        let variables = serde_json::json!({ "request": request });
        let data = self
            .execute(CREATE_MIRROR_TYPED_DATA_MUTATION, variables)
            .await?;
        decode_field(data, "createMirrorTypedData")
    }

    async fn broadcast(&self, id: &str, signature: &str) -> Result<BroadcastOutcome> {
        let variables = serde_json::json!({ "request": { "id": id, "signature": signature } });
        let data = self.execute(BROADCAST_MUTATION, variables).await?;
        let result: RelayResult = decode_field(data, "broadcast")?;
        let outcome = result.into_outcome()?;
        debug!(envelope_id = %id, rejected = matches!(outcome, BroadcastOutcome::Rejected { .. }), "broadcast returned");
        Ok(outcome)
    }

    async fn create_profile(&self, request: &CreateProfileRequest) -> Result<BroadcastOutcome> {
        let variables = serde_json::json!({ "request": request });
        let data = self.execute(CREATE_PROFILE_MUTATION, variables).await?;
        let result: RelayResult = decode_field(data, "createProfile")?;
        result.into_outcome()
    }

    async fn challenge(&self, address: &str) -> Result<String> {
        let variables = serde_json::json!({ "request": { "address": address } });
        let data = self.execute(CHALLENGE_QUERY, variables).await?;
        let challenge: ChallengeText = decode_field(data, "challenge")?;
        Ok(challenge.text)
    }

    async fn authenticate(&self, address: &str, signature: &str) -> Result<AuthTokens> {
        let variables =
            serde_json::json!({ "request": { "address": address, "signature": signature } });
        let data = self.execute(AUTHENTICATE_MUTATION, variables).await?;
        decode_field(data, "authenticate")
    }

    async fn profiles_owned_by(&self, address: &str) -> Result<Vec<Profile>> {
        let variables = serde_json::json!({ "ownedBy": [address] });
        let data = self.execute(CURRENT_USER_QUERY, variables).await?;
        let profiles: ItemsEnvelope<Profile> = decode_field(data, "profiles")?;
        Ok(profiles.items)
    }

    fn set_access_token(&self, token: Option<String>) {
        *self.access_token.lock().unwrap() = token;
    }
}
