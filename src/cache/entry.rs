//! Cache entries and their public summaries.

use crate::activity::SubjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One cached payload and the metadata tracked for it.
///
/// `payload` is the hot in-memory copy. Eviction drops it while the metadata
/// stays indexed, so the entry can still be served from the durable backend.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    /// Identifier returned by the primary backend.
    pub storage_id: String,
    pub payload: Option<Arc<Vec<u8>>>,
    pub created_at: u64,
    pub expires_at: u64,
    pub access_count: u64,
    pub last_access: u64,
    /// Plain payload length in bytes.
    pub size: u64,
    pub tags: BTreeSet<String>,
    pub compressed: bool,
    pub encrypted: bool,
    pub subject: Option<SubjectId>,
    /// Stored with replication on; updates replicate to every secondary again.
    pub replicate: bool,
    /// Backends that acknowledged a replica.
    pub replicas: Vec<String>,
    /// Tie-breaker for entries touched in the same millisecond.
    pub(crate) access_seq: u64,
}

impl CacheEntry {
    /// Past its expiry; never served as a hit.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at
    }

    pub fn is_resident(&self) -> bool {
        self.payload.is_some()
    }

    /// Bytes this entry holds in memory.
    pub fn resident_bytes(&self) -> u64 {
        if self.is_resident() {
            self.size
        } else {
            0
        }
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            key: self.key.clone(),
            storage_id: self.storage_id.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            access_count: self.access_count,
            last_access: self.last_access,
            size: self.size,
            tags: self.tags.clone(),
            resident: self.is_resident(),
            replicas: self.replicas.clone(),
        }
    }
}

/// Entry metadata returned by searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub key: String,
    pub storage_id: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub access_count: u64,
    pub last_access: u64,
    pub size: u64,
    pub tags: BTreeSet<String>,
    pub resident: bool,
    pub replicas: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_strict() {
        let entry = CacheEntry {
            key: "k".into(),
            storage_id: "id".into(),
            payload: Some(Arc::new(vec![1, 2, 3])),
            created_at: 0,
            expires_at: 100,
            access_count: 0,
            last_access: 0,
            size: 3,
            tags: BTreeSet::new(),
            compressed: false,
            encrypted: false,
            subject: None,
            replicate: false,
            replicas: Vec::new(),
            access_seq: 0,
        };
        assert!(!entry.is_expired(100));
        assert!(entry.is_expired(101));
        assert_eq!(entry.resident_bytes(), 3);
    }
}
