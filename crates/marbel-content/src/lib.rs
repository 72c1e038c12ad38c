//! Content store abstraction and URI helpers.
//!
//! Publications do not go on chain directly. Their metadata is uploaded to a
//! content-addressed store first and the resulting path is embedded in the
//! on-chain payload as a gateway URI.

use async_trait::async_trait;

use marbel_metadata::PublicationMetadata;
use marbel_types::Result;

pub mod ipfs_client;

pub use ipfs_client::IpfsClient;

/// A content-addressed store that accepts metadata blobs.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Upload publication metadata, returning its content path.
    async fn upload(&self, metadata: &PublicationMetadata) -> Result<String>;
}

/// Build the retrieval URI for a content path.
pub fn gateway_uri(gateway: &str, path: &str) -> String {
    format!("{}/ipfs/{}", gateway.trim_end_matches('/'), path)
}

/// Rewrite an `ipfs://` reference to a gateway URL; anything else passes
/// through untouched.
pub fn gateway_link(gateway: &str, uri: &str) -> String {
    match uri.strip_prefix("ipfs://") {
        Some(path) => gateway_uri(gateway, path),
        None => uri.to_string(),
    }
}
