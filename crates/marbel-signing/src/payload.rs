//! `*WithSig` call payloads for the social hub contract.
//!
//! Each struct mirrors the input struct of the matching hub method
//! (`commentWithSig`, `mirrorWithSig`, `postWithSig`): every field except the
//! signature is copied verbatim from the typed-data envelope's value, so the
//! direct write submits exactly what was signed.

use serde::{Deserialize, Serialize};

use marbel_types::{Hex, Result};

use crate::envelope::TypedDataEnvelope;
use crate::signature::Eip712Signature;

/// Input struct for `commentWithSig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithSigData {
    pub profile_id: Hex,
    pub profile_id_pointed: Hex,
    pub pub_id_pointed: Hex,
    #[serde(rename = "contentURI")]
    pub content_uri: String,
    pub collect_module: Hex,
    pub collect_module_init_data: Hex,
    pub reference_module: Hex,
    pub reference_module_data: Hex,
    pub reference_module_init_data: Hex,
    pub sig: Eip712Signature,
}

impl CommentWithSigData {
    pub fn from_envelope(envelope: &TypedDataEnvelope, sig: Eip712Signature) -> Result<Self> {
        Ok(Self {
            profile_id: envelope.value_str("profileId")?,
            profile_id_pointed: envelope.value_str("profileIdPointed")?,
            pub_id_pointed: envelope.value_str("pubIdPointed")?,
            content_uri: envelope.value_str("contentURI")?,
            collect_module: envelope.value_str("collectModule")?,
            collect_module_init_data: envelope.value_str("collectModuleInitData")?,
            reference_module: envelope.value_str("referenceModule")?,
            reference_module_data: envelope.value_str("referenceModuleData")?,
            reference_module_init_data: envelope.value_str("referenceModuleInitData")?,
            sig,
        })
    }
}

/// Input struct for `mirrorWithSig` (no content or collect fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorWithSigData {
    pub profile_id: Hex,
    pub profile_id_pointed: Hex,
    pub pub_id_pointed: Hex,
    pub reference_module: Hex,
    pub reference_module_data: Hex,
    pub reference_module_init_data: Hex,
    pub sig: Eip712Signature,
}

impl MirrorWithSigData {
    pub fn from_envelope(envelope: &TypedDataEnvelope, sig: Eip712Signature) -> Result<Self> {
        Ok(Self {
            profile_id: envelope.value_str("profileId")?,
            profile_id_pointed: envelope.value_str("profileIdPointed")?,
            pub_id_pointed: envelope.value_str("pubIdPointed")?,
            reference_module: envelope.value_str("referenceModule")?,
            reference_module_data: envelope.value_str("referenceModuleData")?,
            reference_module_init_data: envelope.value_str("referenceModuleInitData")?,
            sig,
        })
    }
}

/// Input struct for `postWithSig` (no pointed-publication fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWithSigData {
    pub profile_id: Hex,
    #[serde(rename = "contentURI")]
    pub content_uri: String,
    pub collect_module: Hex,
    pub collect_module_init_data: Hex,
    pub reference_module: Hex,
    pub reference_module_init_data: Hex,
    pub sig: Eip712Signature,
}

impl PostWithSigData {
    pub fn from_envelope(envelope: &TypedDataEnvelope, sig: Eip712Signature) -> Result<Self> {
        Ok(Self {
            profile_id: envelope.value_str("profileId")?,
            content_uri: envelope.value_str("contentURI")?,
            collect_module: envelope.value_str("collectModule")?,
            collect_module_init_data: envelope.value_str("collectModuleInitData")?,
            reference_module: envelope.value_str("referenceModule")?,
            reference_module_init_data: envelope.value_str("referenceModuleInitData")?,
            sig,
        })
    }
}
