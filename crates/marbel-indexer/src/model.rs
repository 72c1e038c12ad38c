//! Read models decoded from indexer query responses.

use serde::Deserialize;

use marbel_types::{Hex, ProfileId, PublicationId};

/// A profile as selected by the profile page query. The owned-profiles
/// query selects a subset, so everything past the ids is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: ProfileId,
    pub handle: String,
    pub owned_by: Hex,
    pub name: Option<String>,
    pub bio: Option<String>,
    #[serde(default)]
    pub attributes: Vec<ProfileAttribute>,
    pub stats: Option<ProfileStats>,
    pub picture: Option<ProfileMedia>,
    pub cover_picture: Option<ProfileMedia>,
    pub follow_module: Option<FollowModuleRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub total_followers: u64,
    pub total_following: u64,
    pub total_posts: u64,
    pub total_comments: u64,
    pub total_mirrors: u64,
}

/// Profile picture union: a media set for uploaded images, a bare URI for
/// NFT avatars.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProfileMedia {
    MediaSet { original: MediaFields },
    NftImage { uri: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaFields {
    pub url: String,
}

impl ProfileMedia {
    pub fn url(&self) -> &str {
        match self {
            Self::MediaSet { original } => &original.url,
            Self::NftImage { uri } => uri,
        }
    }
}

/// Follow module indicator; only the GraphQL type tag is selected.
#[derive(Debug, Clone, Deserialize)]
pub struct FollowModuleRef {
    #[serde(rename = "__typename")]
    pub kind: String,
}

/// Cursor-based page boundary returned alongside feed items.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub next: Option<String>,
    pub total_count: Option<u64>,
}

/// One page of a feed query.
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    #[serde(rename = "pageInfo")]
    pub page_info: PageInfo,
}

/// A publication in a profile feed; posts, comments and mirrors share the
/// selected fields, the GraphQL type tag tells them apart.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(rename = "__typename")]
    pub kind: String,
    pub id: PublicationId,
    pub profile: Option<ProfileRef>,
    pub metadata: Option<PublicationSummary>,
    pub stats: Option<PublicationStats>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRef {
    pub id: ProfileId,
    pub handle: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicationSummary {
    pub name: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationStats {
    pub total_amount_of_mirrors: u64,
    pub total_amount_of_comments: u64,
    pub total_amount_of_collects: u64,
}

/// An NFT owned by the profile's wallet, for the NFT feed tab.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftItem {
    pub contract_address: Hex,
    pub token_id: String,
    pub chain_id: Option<u64>,
    pub name: Option<String>,
    pub collection_name: Option<String>,
    pub original_content: Option<NftContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftContent {
    pub uri: Option<String>,
    pub animated_url: Option<String>,
}

/// Mirror status rows for one queried profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HasMirroredResult {
    pub profile_id: Option<ProfileId>,
    #[serde(default)]
    pub results: Vec<MirrorStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorStatus {
    pub publication_id: PublicationId,
    pub mirrored: bool,
}

impl HasMirroredResult {
    /// Whether the queried profile has mirrored the given publication.
    pub fn mirrored_for(&self, publication_id: &str) -> bool {
        self.results
            .iter()
            .find(|s| s.publication_id == publication_id)
            .map(|s| s.mirrored)
            .unwrap_or(false)
    }
}

/// hasTxHashBeenIndexed union flattened: an indexed flag on the happy path,
/// a reason when the transaction reverted.
#[derive(Debug, Clone, Deserialize)]
pub struct TxIndexedResult {
    pub indexed: Option<bool>,
    pub reason: Option<String>,
}

/// Profile feed tab. Parsed from a query-string value; anything
/// unrecognized falls back to the default tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedType {
    Post,
    Comment,
    Mirror,
    Nft,
}

impl Default for FeedType {
    fn default() -> Self {
        Self::Comment
    }
}

impl FeedType {
    pub fn from_query(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "post" => Self::Post,
            "comment" => Self::Comment,
            "mirror" => Self::Mirror,
            "nft" => Self::Nft,
            _ => Self::Comment,
        }
    }

    /// Publication-type filter for the publications query; the NFT tab is
    /// served by a different query entirely.
    pub fn publication_type(&self) -> Option<&'static str> {
        match self {
            Self::Post => Some("POST"),
            Self::Comment => Some("COMMENT"),
            Self::Mirror => Some("MIRROR"),
            Self::Nft => None,
        }
    }
}
