//! In-memory cache index.
//!
//! - `entries`: key to entry
//! - `by_access`: (last access, sequence) to key, oldest first, for LRU
//! - `by_tag`: tag to keys
//!
//! The three maps are only ever updated together through this type.

use super::entry::CacheEntry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct CacheIndex {
    entries: HashMap<String, CacheEntry>,
    by_access: BTreeMap<(u64, u64), String>,
    by_tag: HashMap<String, BTreeSet<String>>,
    resident_bytes: u64,
    next_seq: u64,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes of payload currently held in memory.
    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Insert or replace, returning the previous entry.
    pub fn insert(&mut self, mut entry: CacheEntry) -> Option<CacheEntry> {
        let previous = self.remove(&entry.key);
        entry.access_seq = self.bump();
        self.by_access
            .insert((entry.last_access, entry.access_seq), entry.key.clone());
        for tag in &entry.tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(entry.key.clone());
        }
        self.resident_bytes += entry.resident_bytes();
        self.entries.insert(entry.key.clone(), entry);
        previous
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.by_access.remove(&(entry.last_access, entry.access_seq));
        for tag in &entry.tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        self.resident_bytes -= entry.resident_bytes();
        Some(entry)
    }

    /// Record an access and return the hot payload, if resident.
    pub fn touch(&mut self, key: &str, now_ms: u64) -> Option<&CacheEntry> {
        let seq = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.by_access.remove(&(entry.last_access, entry.access_seq));
        entry.last_access = now_ms.max(entry.last_access);
        entry.access_seq = seq;
        entry.access_count += 1;
        self.by_access
            .insert((entry.last_access, entry.access_seq), key.to_string());
        Some(entry)
    }

    /// Put a payload back in memory after a backend read.
    pub fn promote(&mut self, key: &str, payload: std::sync::Arc<Vec<u8>>) {
        if let Some(entry) = self.entries.get_mut(key) {
            if entry.payload.is_none() {
                self.resident_bytes += entry.size;
            }
            entry.payload = Some(payload);
        }
    }

    /// Drop the hot copy, keeping the metadata. Returns the bytes freed.
    pub fn demote(&mut self, key: &str) -> u64 {
        match self.entries.get_mut(key) {
            Some(entry) if entry.payload.is_some() => {
                entry.payload = None;
                self.resident_bytes -= entry.size;
                entry.size
            }
            _ => 0,
        }
    }

    /// Resident keys, least recently used first.
    pub fn lru_resident(&self) -> Vec<String> {
        self.by_access
            .values()
            .filter(|k| self.entries.get(*k).is_some_and(CacheEntry::is_resident))
            .cloned()
            .collect()
    }

    /// Keys carrying every tag in `tags`.
    pub fn keys_with_tags(&self, tags: &[String]) -> BTreeSet<String> {
        let mut iter = tags.iter();
        let Some(first) = iter.next() else {
            return self.entries.keys().cloned().collect();
        };
        let mut keys = self.by_tag.get(first).cloned().unwrap_or_default();
        for tag in iter {
            let other = self.by_tag.get(tag);
            keys.retain(|k| other.is_some_and(|o| o.contains(k)));
        }
        keys
    }

    pub fn expired_keys(&self, now_ms: u64) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.is_expired(now_ms))
            .map(|e| e.key.clone())
            .collect()
    }

    /// True when another entry still points at `storage_id`.
    pub fn references(&self, storage_id: &str) -> bool {
        self.entries.values().any(|e| e.storage_id == storage_id)
    }

    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}
