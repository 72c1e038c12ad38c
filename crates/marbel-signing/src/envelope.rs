//! The indexer's typed-data response and its sanitized signing form.
//!
//! The GraphQL layer tags every object with `__typename`. Typed-data signing
//! hashes the value structurally, so a stray tag changes the digest; the
//! envelope therefore must be stripped before it reaches a wallet.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use marbel_types::{MarbelError, Result};

/// Typed-data generation result: one envelope per requested action.
///
/// Consumed exactly once to produce a signature. `expires_at` is carried for
/// display; the deadline inside `value` is what the chain enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedDataEnvelope {
    pub id: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: String,
    #[serde(rename = "typedData")]
    pub typed_data: TypedData,
}

/// EIP-712 domain, type descriptors, and value, kept as raw JSON.
///
/// The value schema differs per action (comment carries pointed-publication
/// and collect fields, mirror does not), so the fields stay schemaless and
/// accessors pull out what the call payload needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedData {
    pub domain: Value,
    pub types: Value,
    pub value: Value,
}

impl TypedDataEnvelope {
    /// Clone of the typed data with all `__typename` tags removed, ready for
    /// the wallet's signing call.
    pub fn sanitized(&self) -> TypedData {
        let mut domain = self.typed_data.domain.clone();
        let mut types = self.typed_data.types.clone();
        let mut value = self.typed_data.value.clone();
        strip_typename(&mut domain);
        strip_typename(&mut types);
        strip_typename(&mut value);
        TypedData { domain, types, value }
    }

    /// The signing deadline from `value`, accepted as a JSON number or a
    /// decimal string (the API has emitted both).
    pub fn deadline(&self) -> Result<u64> {
        let raw = self
            .typed_data
            .value
            .get("deadline")
            .ok_or_else(|| missing_field("deadline"))?;
        match raw {
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| MarbelError::Api("typed data deadline is not a u64".into())),
            Value::String(s) => s
                .parse::<u64>()
                .map_err(|_| MarbelError::Api(format!("typed data deadline not numeric: {s}"))),
            other => Err(MarbelError::Api(format!(
                "typed data deadline has unexpected type: {other}"
            ))),
        }
    }

    /// A required string field of `value` (ids, addresses, and call data are
    /// all hex strings on the wire).
    pub fn value_str(&self, field: &str) -> Result<String> {
        self.typed_data
            .value
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| missing_field(field))
    }
}

fn missing_field(field: &str) -> MarbelError {
    MarbelError::Api(format!("typed data value missing field: {field}"))
}

/// Remove `__typename` keys recursively from objects and arrays in place.
pub fn strip_typename(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("__typename");
            for v in map.values_mut() {
                strip_typename(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                strip_typename(v);
            }
        }
        _ => {}
    }
}
