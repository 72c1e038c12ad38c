//! HTTP client for an IPFS node's add endpoint.
//!
//! Endpoints:
//! - POST /api/v0/add (multipart, returns {Name, Hash, Size})

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use async_trait::async_trait;
use marbel_metadata::PublicationMetadata;
use marbel_types::{MarbelError, Result};

use crate::ContentStore;

/// Response of the add endpoint; only the hash is used.
#[derive(Debug, Clone, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// IPFS client for uploading publication metadata.
pub struct IpfsClient {
    api_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl IpfsClient {
    pub fn new(api_url: &str, timeout_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms.unwrap_or(30_000);
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Add a blob to the store.
    ///
    /// POST /api/v0/add
    pub async fn add(&self, bytes: Vec<u8>) -> Result<String> {
        let url = format!("{}/api/v0/add", self.api_url);

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes));

        let resp = self.client
            .post(&url)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MarbelError::Upload(format!("ipfs request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MarbelError::Upload(format!(
                "ipfs returned status {}: {}",
                status, body
            )));
        }

        let body: AddResponse = resp
            .json()
            .await
            .map_err(|e| MarbelError::Upload(format!("failed to parse ipfs response: {}", e)))?;

        debug!(path = %body.hash, "content uploaded");
        Ok(body.hash)
    }
}

#[async_trait]
impl ContentStore for IpfsClient {
    async fn upload(&self, metadata: &PublicationMetadata) -> Result<String> {
        let bytes = serde_json::to_vec(metadata)
            .map_err(|e| MarbelError::Upload(format!("failed to encode metadata: {}", e)))?;
        self.add(bytes).await
    }
}
