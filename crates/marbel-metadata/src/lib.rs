//! Publication metadata construction and input validation.
//!
//! - Metadata: the JSON blob uploaded to the content store before a comment
//!   or post (wire keys are a historical mix of snake and camel case; they
//!   must not be regularized, indexers match on them)
//! - Validation: the precondition predicates that gate an action before any
//!   network call is made

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use marbel_types::{MarbelError, Result};

pub mod page;

/// Metadata schema version understood by the protocol indexer.
pub const METADATA_VERSION: &str = "1.0.0";

/// Handle length bounds (inclusive) enforced at profile creation.
pub const HANDLE_MIN_LEN: usize = 2;
pub const HANDLE_MAX_LEN: usize = 31;

/// An attached media reference: content URI plus optional mime type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub item: String,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
}

/// A trait-style metadata attribute; publications carry one tagging the
/// action type ("comment" / "post").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    #[serde(rename = "traitType")]
    pub trait_type: String,
    pub key: String,
    pub value: String,
}

/// The content-store upload body for a publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationMetadata {
    pub version: String,
    pub metadata_id: String,
    pub description: String,
    pub content: String,
    pub external_url: Option<String>,
    pub image: Option<String>,
    #[serde(rename = "imageMimeType")]
    pub image_mime_type: Option<String>,
    pub name: String,
    pub attributes: Vec<MetadataAttribute>,
    pub media: Vec<MediaItem>,
    #[serde(rename = "appId")]
    pub app_id: String,
}

/// Build comment metadata: fresh metadata id, first attachment doubles as
/// the preview image.
pub fn comment_metadata(
    content: &str,
    attachments: &[MediaItem],
    author_handle: &str,
    app_id: &str,
) -> PublicationMetadata {
    publication_metadata(
        content,
        attachments,
        format!("Comment by @{author_handle}"),
        "comment",
        app_id,
    )
}

/// Build post metadata.
pub fn post_metadata(
    content: &str,
    attachments: &[MediaItem],
    author_handle: &str,
    app_id: &str,
) -> PublicationMetadata {
    publication_metadata(
        content,
        attachments,
        format!("Post by @{author_handle}"),
        "post",
        app_id,
    )
}

fn publication_metadata(
    content: &str,
    attachments: &[MediaItem],
    name: String,
    type_tag: &str,
    app_id: &str,
) -> PublicationMetadata {
    let first = attachments.first();
    PublicationMetadata {
        version: METADATA_VERSION.into(),
        metadata_id: Uuid::new_v4().to_string(),
        description: content.into(),
        content: content.into(),
        external_url: None,
        image: first.map(|a| a.item.clone()),
        image_mime_type: first.and_then(|a| a.mime_type.clone()),
        name,
        attributes: vec![MetadataAttribute {
            trait_type: "string".into(),
            key: "type".into(),
            value: type_tag.into(),
        }],
        media: attachments.to_vec(),
        app_id: app_id.into(),
    }
}

/// A publication needs content or at least one attachment.
pub fn validate_publication(content: &str, attachments: &[MediaItem]) -> Result<()> {
    if content.is_empty() && attachments.is_empty() {
        return Err(MarbelError::EmptyPublication);
    }
    Ok(())
}

/// Lowercase a requested handle before validation and submission.
pub fn normalize_handle(handle: &str) -> String {
    handle.to_lowercase()
}

/// Handle rules: 2..=31 chars, lowercase alphanumeric only.
pub fn validate_handle(handle: &str) -> Result<()> {
    if handle.len() < HANDLE_MIN_LEN {
        return Err(MarbelError::InvalidHandle(
            "Handle should be atleast 2 characters".into(),
        ));
    }
    if handle.len() > HANDLE_MAX_LEN {
        return Err(MarbelError::InvalidHandle(
            "Handle should be less than 32 characters".into(),
        ));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(MarbelError::InvalidHandle(
            "Handle should only contain alphanumeric characters".into(),
        ));
    }
    Ok(())
}
