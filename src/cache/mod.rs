//! Aggregation Cache / Store
//!
//! Content-keyed, TTL-expiring, tag-indexed cache sitting between the
//! validator and the proving layer.
//!
//! ## Store pipeline
//!
//! ```text
//! payload ─▶ lz4 (optional) ─▶ AES-256-GCM (optional, per-subject key)
//!         ─▶ primary backend (fatal on failure) ─▶ in-memory index
//!         ─▶ secondary backends (best effort, failures logged)
//! ```
//!
//! Retrieval always tries the in-memory copy first and falls back to the
//! primary backend, promoting the payload back into memory.
//!
//! ## Concurrency
//!
//! - The index is behind a `std::sync::RwLock` that is never held across an await
//! - Each key has its own async `RwLock`: writers hold it exclusively, readers
//!   shared, so two writes to one key never interleave
//! - A key's lock leaves the lock map only when a guard is released and no
//!   other task holds or awaits it, so the map tracks in-flight keys only
//! - Eviction only demotes entries whose key lock it can take immediately,
//!   which skips anything mid-retrieval or mid-write

pub mod backend;
pub mod codec;
pub mod entry;
pub mod index;
pub mod oplog;

#[cfg(test)]
mod proptests;

pub use backend::{blob_id, BlobBackend, FileBackend, MemoryBackend, StorageError};
pub use codec::PayloadCodec;
pub use entry::{CacheEntry, EntrySummary};
pub use index::CacheIndex;
pub use oplog::{CacheMetrics, Operation, OperationLog, OperationRecord, Outcome, Tier};

use crate::activity::SubjectId;
use crate::clock::TimeSource;
use crate::serialization::{from_cbor, to_cbor, SerializationError};
use futures::future::join_all;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Storage backend error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Payload codec error: {0}")]
    Codec(String),

    #[error("Master key must be 32 bytes")]
    InvalidKey,

    #[error("Encryption requested for {0} without a subject")]
    MissingSubject(String),

    #[error("Cache key not found: {0}")]
    NotFound(String),

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Cache index lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_ms: u64,
    /// In-memory payload budget; eviction starts above it.
    pub max_memory_bytes: u64,
    pub compress: bool,
    pub encrypt: bool,
    pub replicate: bool,
    pub operation_log_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60 * 60 * 1000,
            max_memory_bytes: 64 * 1024 * 1024,
            compress: true,
            encrypt: true,
            replicate: true,
            operation_log_capacity: 1000,
        }
    }
}

/// Per-store options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreOptions {
    /// Falls back to the configured default.
    pub ttl_ms: Option<u64>,
    pub tags: Vec<String>,
    pub compress: Option<bool>,
    pub encrypt: Option<bool>,
    /// Required when encrypting; the key is derived from it.
    pub subject: Option<SubjectId>,
    pub replicate: Option<bool>,
}

impl StoreOptions {
    pub fn for_subject(subject: SubjectId) -> Self {
        Self {
            subject: Some(subject),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }
}

/// Search filter; every set field must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub tags: Vec<String>,
    pub key_pattern: Option<String>,
    pub created_after: Option<u64>,
    pub created_before: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub expired: usize,
    pub evicted: usize,
}

type KeyLock = Arc<tokio::sync::RwLock<()>>;

/// A held per-key lock. Dropping it prunes the key from the lock map once no
/// other task has a handle to the lock.
struct KeyGuard<'a, G> {
    locks: &'a Mutex<HashMap<String, KeyLock>>,
    key: String,
    held: Option<G>,
}

impl<G> Drop for KeyGuard<'_, G> {
    fn drop(&mut self) {
        // Release first: the owned guard keeps its own handle to the lock.
        drop(self.held.take());
        if let Ok(mut locks) = self.locks.lock() {
            if locks.get(&self.key).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(&self.key);
            }
        }
    }
}

enum Lookup {
    Live(CacheEntry),
    /// Removed on read; carries the entry when its blob is now unreferenced.
    Expired(Option<CacheEntry>),
}

/// The aggregation cache.
pub struct AggregationStore {
    config: CacheConfig,
    index: RwLock<CacheIndex>,
    locks: Mutex<HashMap<String, KeyLock>>,
    primary: Arc<dyn BlobBackend>,
    replicas: Vec<Arc<dyn BlobBackend>>,
    codec: PayloadCodec,
    clock: Arc<dyn TimeSource>,
    log: OperationLog,
}

impl AggregationStore {
    pub fn new(
        config: CacheConfig,
        primary: Arc<dyn BlobBackend>,
        codec: PayloadCodec,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let log = OperationLog::new(config.operation_log_capacity);
        Self {
            config,
            index: RwLock::new(CacheIndex::new()),
            locks: Mutex::new(HashMap::new()),
            primary,
            replicas: Vec::new(),
            codec,
            clock,
            log,
        }
    }

    /// Add a secondary backend for best-effort replication.
    pub fn with_replica(mut self, backend: Arc<dyn BlobBackend>) -> Self {
        self.replicas.push(backend);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.log
    }

    fn key_lock(&self, key: &str) -> Result<KeyLock, CacheError> {
        let mut locks = self.locks.lock().map_err(|_| CacheError::LockPoisoned)?;
        Ok(locks.entry(key.to_string()).or_default().clone())
    }

    async fn lock_shared(&self, key: &str) -> Result<KeyGuard<'_, OwnedRwLockReadGuard<()>>, CacheError> {
        let lock = self.key_lock(key)?;
        Ok(KeyGuard {
            locks: &self.locks,
            key: key.to_string(),
            held: Some(lock.read_owned().await),
        })
    }

    async fn lock_exclusive(&self, key: &str) -> Result<KeyGuard<'_, OwnedRwLockWriteGuard<()>>, CacheError> {
        let lock = self.key_lock(key)?;
        Ok(KeyGuard {
            locks: &self.locks,
            key: key.to_string(),
            held: Some(lock.write_owned().await),
        })
    }

    /// Keys with a lock handle outstanding.
    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }

    fn log_op(&self, op: Operation, key: Option<&str>, outcome: Outcome, tier: Tier, started: Instant, bytes: u64) {
        self.log.record(OperationRecord {
            op,
            key: key.map(str::to_string),
            outcome,
            tier,
            latency_us: started.elapsed().as_micros() as u64,
            bytes,
            at_ms: self.clock.now_ms(),
        });
    }

    /// Store `payload` under `key`, returning the primary storage identifier.
    pub async fn store(&self, key: &str, payload: &[u8], options: StoreOptions) -> Result<String, CacheError> {
        let started = Instant::now();
        let result = self.store_inner(key, payload, &options, Operation::Store).await;
        let outcome = if result.is_ok() { Outcome::Success } else { Outcome::Failure };
        self.log_op(Operation::Store, Some(key), outcome, Tier::None, started, payload.len() as u64);
        if result.is_ok() {
            self.evict_to_budget()?;
        }
        result
    }

    async fn store_inner(
        &self,
        key: &str,
        payload: &[u8],
        options: &StoreOptions,
        op: Operation,
    ) -> Result<String, CacheError> {
        let compress = options.compress.unwrap_or(self.config.compress);
        let encrypt = options.encrypt.unwrap_or(self.config.encrypt);
        let replicate = options.replicate.unwrap_or(self.config.replicate);
        let subject = if encrypt {
            Some(
                options
                    .subject
                    .as_ref()
                    .ok_or_else(|| CacheError::MissingSubject(key.to_string()))?,
            )
        } else {
            None
        };

        let _guard = self.lock_exclusive(key).await?;

        let encoded = self.codec.encode(payload, compress, subject)?;
        let storage_id = self.primary.put(&encoded).await?;

        let now = self.clock.now_ms();
        let entry = CacheEntry {
            key: key.to_string(),
            storage_id: storage_id.clone(),
            payload: Some(Arc::new(payload.to_vec())),
            created_at: now,
            expires_at: now.saturating_add(options.ttl_ms.unwrap_or(self.config.default_ttl_ms)),
            access_count: 0,
            last_access: now,
            size: payload.len() as u64,
            tags: options.tags.iter().cloned().collect::<BTreeSet<_>>(),
            compressed: compress,
            encrypted: subject.is_some(),
            subject: subject.cloned(),
            replicate,
            replicas: Vec::new(),
            access_seq: 0,
        };
        let replaced = {
            let mut index = self.index.write().map_err(|_| CacheError::LockPoisoned)?;
            let previous = index.insert(entry);
            previous.filter(|p| p.storage_id != storage_id && !index.references(&p.storage_id))
        };
        if let Some(old) = replaced {
            self.delete_blob(&old).await;
        }
        debug!(key = %key, storage_id = %storage_id, ?op, "stored cache entry");

        if replicate && !self.replicas.is_empty() {
            let acknowledged = self.replicate(key, &encoded).await;
            let mut index = self.index.write().map_err(|_| CacheError::LockPoisoned)?;
            if let Some(entry) = index.get(key).cloned() {
                if entry.storage_id == storage_id {
                    let mut updated = entry;
                    updated.replicas = acknowledged;
                    index.insert(updated);
                }
            }
        }

        Ok(storage_id)
    }

    /// Push to every secondary backend in parallel; failures are logged and dropped.
    async fn replicate(&self, key: &str, encoded: &[u8]) -> Vec<String> {
        let started = Instant::now();
        let results = join_all(self.replicas.iter().map(|b| b.put(encoded))).await;
        let mut acknowledged = Vec::new();
        for (backend, result) in self.replicas.iter().zip(results) {
            match result {
                Ok(_) => acknowledged.push(backend.name().to_string()),
                Err(e) => {
                    warn!(key = %key, backend = backend.name(), error = %e, "replication failed");
                    self.log_op(Operation::Replicate, Some(key), Outcome::Failure, Tier::Backend, started, 0);
                }
            }
        }
        acknowledged
    }

    /// Payload for `key`, or `None` on a miss.
    pub async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let started = Instant::now();
        let result = self.retrieve_inner(key).await;
        match &result {
            Ok(Some((payload, tier))) => {
                self.log_op(Operation::Retrieve, Some(key), Outcome::Hit, *tier, started, payload.len() as u64)
            }
            Ok(None) => self.log_op(Operation::Retrieve, Some(key), Outcome::Miss, Tier::None, started, 0),
            Err(_) => self.log_op(Operation::Retrieve, Some(key), Outcome::Failure, Tier::None, started, 0),
        }
        let promoted = matches!(result, Ok(Some((_, Tier::Backend))));
        let payload = result?.map(|(p, _)| p);
        if promoted {
            self.evict_to_budget()?;
        }
        Ok(payload)
    }

    async fn retrieve_inner(&self, key: &str) -> Result<Option<(Vec<u8>, Tier)>, CacheError> {
        let _guard = self.lock_shared(key).await?;
        let now = self.clock.now_ms();

        let lookup = {
            let mut index = self.index.write().map_err(|_| CacheError::LockPoisoned)?;
            let expired = match index.get(key) {
                None => return Ok(None),
                Some(e) => e.is_expired(now),
            };
            if expired {
                let removed = index.remove(key);
                Lookup::Expired(removed.filter(|e| !index.references(&e.storage_id)))
            } else {
                match index.touch(key, now) {
                    Some(e) => Lookup::Live(e.clone()),
                    None => return Ok(None),
                }
            }
        };
        let entry = match lookup {
            Lookup::Live(entry) => entry,
            Lookup::Expired(orphaned) => {
                if let Some(e) = orphaned {
                    self.delete_blob(&e).await;
                }
                debug!(key = %key, "expired cache entry dropped on read");
                return Ok(None);
            }
        };

        if let Some(payload) = &entry.payload {
            return Ok(Some((payload.as_ref().clone(), Tier::Memory)));
        }

        let blob = self.primary.get(&entry.storage_id).await?;
        let payload = self
            .codec
            .decode(&blob, entry.compressed, entry.subject.as_ref())?;
        {
            let mut index = self.index.write().map_err(|_| CacheError::LockPoisoned)?;
            if index.get(key).is_some_and(|e| e.storage_id == entry.storage_id) {
                index.promote(key, Arc::new(payload.clone()));
            }
        }
        Ok(Some((payload, Tier::Backend)))
    }

    /// Replace the payload of a live entry, keeping its tags, subject and expiry.
    pub async fn update(&self, key: &str, payload: &[u8]) -> Result<String, CacheError> {
        let started = Instant::now();
        let now = self.clock.now_ms();
        let existing = {
            let index = self.index.read().map_err(|_| CacheError::LockPoisoned)?;
            index.get(key).filter(|e| !e.is_expired(now)).cloned()
        };
        let Some(existing) = existing else {
            self.log_op(Operation::Update, Some(key), Outcome::Miss, Tier::None, started, 0);
            return Err(CacheError::NotFound(key.to_string()));
        };

        let options = StoreOptions {
            ttl_ms: Some(existing.expires_at.saturating_sub(now)),
            tags: existing.tags.iter().cloned().collect(),
            compress: Some(existing.compressed),
            encrypt: Some(existing.encrypted),
            subject: existing.subject.clone(),
            replicate: Some(existing.replicate),
        };
        let result = self.store_inner(key, payload, &options, Operation::Update).await;
        let outcome = if result.is_ok() { Outcome::Success } else { Outcome::Failure };
        self.log_op(Operation::Update, Some(key), outcome, Tier::None, started, payload.len() as u64);
        if result.is_ok() {
            self.evict_to_budget()?;
        }
        result
    }

    /// Remove an entry and its blobs. Returns whether the key existed.
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let started = Instant::now();
        let removed = {
            let _guard = self.lock_exclusive(key).await?;
            let mut index = self.index.write().map_err(|_| CacheError::LockPoisoned)?;
            let removed = index.remove(key);
            removed.map(|e| (index.references(&e.storage_id), e))
        };
        let existed = removed.is_some();
        if let Some((still_referenced, entry)) = removed {
            if !still_referenced {
                self.delete_blob(&entry).await;
            }
        }
        let outcome = if existed { Outcome::Success } else { Outcome::Miss };
        self.log_op(Operation::Delete, Some(key), outcome, Tier::None, started, 0);
        Ok(existed)
    }

    /// Best-effort blob removal from the primary and every replica holding it.
    async fn delete_blob(&self, entry: &CacheEntry) {
        if let Err(e) = self.primary.delete(&entry.storage_id).await {
            warn!(key = %entry.key, error = %e, "failed to delete blob from primary backend");
        }
        for backend in self.replicas.iter().filter(|b| entry.replicas.iter().any(|r| r == b.name())) {
            if let Err(e) = backend.delete(&entry.storage_id).await {
                warn!(key = %entry.key, backend = backend.name(), error = %e, "failed to delete replica");
            }
        }
    }

    /// Live entries matching `query`, oldest first.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<EntrySummary>, CacheError> {
        let started = Instant::now();
        let pattern = query.key_pattern.as_deref().map(Regex::new).transpose()?;
        let now = self.clock.now_ms();

        let mut found: Vec<EntrySummary> = {
            let index = self.index.read().map_err(|_| CacheError::LockPoisoned)?;
            index
                .keys_with_tags(&query.tags)
                .iter()
                .filter_map(|k| index.get(k))
                .filter(|e| !e.is_expired(now))
                .filter(|e| pattern.as_ref().map_or(true, |re| re.is_match(&e.key)))
                .filter(|e| query.created_after.map_or(true, |t| e.created_at >= t))
                .filter(|e| query.created_before.map_or(true, |t| e.created_at <= t))
                .map(CacheEntry::summary)
                .collect()
        };
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        self.log_op(Operation::Search, None, Outcome::Success, Tier::Memory, started, 0);
        Ok(found)
    }

    /// Drop expired entries, then evict down to the memory budget.
    pub async fn cleanup(&self) -> Result<CleanupReport, CacheError> {
        let started = Instant::now();
        let now = self.clock.now_ms();
        let expired: Vec<CacheEntry> = {
            let mut index = self.index.write().map_err(|_| CacheError::LockPoisoned)?;
            let removed: Vec<CacheEntry> = index
                .expired_keys(now)
                .iter()
                .filter_map(|k| index.remove(k))
                .collect();
            removed
                .into_iter()
                .filter(|e| !index.references(&e.storage_id))
                .collect()
        };
        let expired_count = expired.len();
        for entry in &expired {
            self.delete_blob(entry).await;
        }
        let evicted = self.evict_to_budget()?;
        let report = CleanupReport {
            expired: expired_count,
            evicted,
        };
        info!(expired = report.expired, evicted = report.evicted, "cache cleanup finished");
        self.log_op(Operation::Cleanup, None, Outcome::Success, Tier::None, started, 0);
        Ok(report)
    }

    /// Demote least recently used payloads until resident bytes fit the budget.
    fn evict_to_budget(&self) -> Result<usize, CacheError> {
        let budget = self.config.max_memory_bytes;
        let mut evicted = Vec::new();
        {
            let mut index = self.index.write().map_err(|_| CacheError::LockPoisoned)?;
            if index.resident_bytes() <= budget {
                return Ok(0);
            }
            let locks = self.locks.lock().map_err(|_| CacheError::LockPoisoned)?;
            for key in index.lru_resident() {
                if index.resident_bytes() <= budget {
                    break;
                }
                let busy = locks.get(&key).is_some_and(|l| l.try_write().is_err());
                if busy {
                    continue;
                }
                let freed = index.demote(&key);
                evicted.push((key, freed));
            }
        }
        let started = Instant::now();
        for (key, freed) in &evicted {
            debug!(key = %key, bytes = freed, "evicted cache payload from memory");
            self.log_op(Operation::Evict, Some(key), Outcome::Success, Tier::Memory, started, *freed);
        }
        Ok(evicted.len())
    }

    pub fn metrics(&self) -> CacheMetrics {
        let (entries, resident) = self
            .index
            .read()
            .map(|i| (i.len(), i.resident_bytes()))
            .unwrap_or((0, 0));
        self.log.metrics(entries, resident, self.config.max_memory_bytes)
    }

    /// Serialize `value` to CBOR and store it.
    pub async fn store_value<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: StoreOptions,
    ) -> Result<String, CacheError> {
        let bytes = to_cbor(value)?;
        self.store(key, &bytes, options).await
    }

    pub async fn retrieve_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.retrieve(key).await? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }
}
