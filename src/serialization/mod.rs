//! Deterministic CBOR encoding for cached aggregations and registry state.
//!
//! - CBOR via `ciborium` for everything persisted by the cache and the file-backed proof store
//! - `content_digest` gives the SHA-256 of the canonical encoding, used for
//!   aggregation content hashes and credential identifiers

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("CBOR encoding failed: {0}")]
    Encode(String),

    #[error("CBOR decoding failed: {0}")]
    Decode(String),
}

pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let mut out = Vec::with_capacity(256);
    ciborium::into_writer(value, &mut out).map_err(|e| SerializationError::Encode(e.to_string()))?;
    Ok(out)
}

pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializationError> {
    ciborium::from_reader(bytes).map_err(|e| SerializationError::Decode(e.to_string()))
}

/// SHA-256 over the CBOR encoding of `value`, hex encoded.
pub fn content_digest<T: Serialize>(value: &T) -> Result<String, SerializationError> {
    let bytes = to_cbor(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        commits: u64,
        repository: String,
    }

    #[test]
    fn test_cbor_roundtrip() {
        let original = Snapshot {
            commits: 42,
            repository: "org/repo".to_string(),
        };
        let bytes = to_cbor(&original).unwrap();
        let recovered: Snapshot = from_cbor(&bytes).unwrap();
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result: Result<Snapshot, _> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(SerializationError::Decode(_))));
    }

    #[test]
    fn test_digest_is_deterministic_for_ordered_maps() {
        let mut a = BTreeMap::new();
        a.insert("b", 2u32);
        a.insert("a", 1u32);
        let mut b = BTreeMap::new();
        b.insert("a", 1u32);
        b.insert("b", 2u32);

        assert_eq!(content_digest(&a).unwrap(), content_digest(&b).unwrap());
        assert_eq!(content_digest(&a).unwrap().len(), 64);
    }
}
