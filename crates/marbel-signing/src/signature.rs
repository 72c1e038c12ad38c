//! 65-byte ECDSA signature decomposition.
//!
//! Wallets return `r || s || v` as one 0x-prefixed hex string; the hub
//! contract takes `(v, r, s, deadline)` as a struct. The split is lossless:
//! `join_signature(split_signature(sig)) == sig`, modulo v normalization
//! (recovery ids 0/1 become 27/28, matching what signers emit either way).

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use marbel_types::{bytes_to_hex, hex_to_bytes, Hex, MarbelError, Result};

/// A split signature plus the envelope deadline, as the hub contract takes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Signature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
    pub deadline: u64,
}

impl Eip712Signature {
    /// Split a raw signature and attach the envelope deadline.
    pub fn from_raw(signature: &str, deadline: u64) -> Result<Self> {
        let (v, r, s) = split_signature(signature)?;
        Ok(Self { v, r, s, deadline })
    }
}

/// Split a 65-byte signature into (v, r, s). Deadline is attached later from
/// the typed-data envelope.
pub fn split_signature(signature: &str) -> Result<(u8, B256, B256)> {
    let bytes = hex_to_bytes(signature)?;
    if bytes.len() != 65 {
        return Err(MarbelError::InvalidSignature(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }

    let r = B256::from_slice(&bytes[0..32]);
    let s = B256::from_slice(&bytes[32..64]);
    let v = match bytes[64] {
        0 => 27,
        1 => 28,
        v @ (27 | 28) => v,
        other => {
            return Err(MarbelError::InvalidSignature(format!(
                "invalid recovery id: {other}"
            )))
        }
    };

    Ok((v, r, s))
}

/// Reassemble a split signature into the original 65-byte hex form.
pub fn join_signature(v: u8, r: &B256, s: &B256) -> Hex {
    let mut bytes = Vec::with_capacity(65);
    bytes.extend_from_slice(r.as_slice());
    bytes.extend_from_slice(s.as_slice());
    bytes.push(v);
    bytes_to_hex(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 32 bytes of 0x11, 32 bytes of 0x22, recovery byte 28.
    fn known_signature() -> String {
        format!("0x{}{}1c", "11".repeat(32), "22".repeat(32))
    }

    #[test]
    fn test_split_known_signature() {
        let (v, r, s) = split_signature(&known_signature()).unwrap();
        assert_eq!(v, 28);
        assert_eq!(r.as_slice(), &[0x11; 32]);
        assert_eq!(s.as_slice(), &[0x22; 32]);
    }

    #[test]
    fn test_split_then_join_reproduces_original() {
        let sig = known_signature();
        let (v, r, s) = split_signature(&sig).unwrap();
        assert_eq!(join_signature(v, &r, &s), sig);
    }

    #[test]
    fn test_recovery_id_normalization() {
        let raw = format!("0x{}{}00", "aa".repeat(32), "bb".repeat(32));
        let (v, _, _) = split_signature(&raw).unwrap();
        assert_eq!(v, 27);

        let raw = format!("0x{}{}01", "aa".repeat(32), "bb".repeat(32));
        let (v, _, _) = split_signature(&raw).unwrap();
        assert_eq!(v, 28);
    }

    #[test]
    fn test_split_rejects_wrong_length() {
        let err = split_signature("0x1122").unwrap_err();
        assert!(matches!(err, MarbelError::InvalidSignature(_)));
    }

    #[test]
    fn test_split_rejects_bad_recovery_id() {
        let raw = format!("0x{}{}07", "aa".repeat(32), "bb".repeat(32));
        assert!(split_signature(&raw).is_err());
    }
}
