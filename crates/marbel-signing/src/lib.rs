//! Typed-data handling for relayed protocol actions.
//!
//! - Envelope: the indexer's typed-data response (domain/types/value)
//! - Sanitizing: recursive removal of GraphQL `__typename` artifacts
//! - Signature: 65-byte split into (v, r, s) and lossless rejoin
//! - Payload: `*WithSig` call structs assembled from envelope + signature

pub mod envelope;
pub mod payload;
pub mod signature;

pub use envelope::{strip_typename, TypedData, TypedDataEnvelope};
pub use payload::{CommentWithSigData, MirrorWithSigData, PostWithSigData};
pub use signature::{join_signature, split_signature, Eip712Signature};
