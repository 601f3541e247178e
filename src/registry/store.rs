//! Persistent registry state: consumed proof hashes and issued credentials.
//!
//! - [`MemoryProofStore`]: process-local
//! - [`FileProofStore`]: CBOR snapshot rewritten atomically on every mutation

use super::credential::Credential;
use crate::activity::SubjectId;
use crate::serialization::{from_cbor, to_cbor, SerializationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Credential {0} already exists")]
    Duplicate(String),

    #[error("Credential {0} not found")]
    NotFound(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Outcome of [`ProofStore::issue_credential`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issuance {
    Issued,
    /// First proof hash already consumed, or repeated within the credential.
    Replayed(String),
    /// A credential with this id already exists.
    Duplicate(String),
}

/// Storage seam for the verification registry.
#[async_trait]
pub trait ProofStore: Send + Sync {
    /// Mark every hash consumed, or none of them if any was already consumed.
    ///
    /// Returns `false` when the batch was refused.
    async fn consume_proof_hashes(&self, hashes: &[String]) -> Result<bool, StoreError>;

    async fn is_consumed(&self, hash: &str) -> Result<bool, StoreError>;

    /// Consume the credential's proof hashes and insert it as one step.
    ///
    /// Nothing changes unless the result is [`Issuance::Issued`].
    async fn issue_credential(&self, credential: Credential) -> Result<Issuance, StoreError>;

    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError>;

    async fn get_credential(&self, id: &str) -> Result<Option<Credential>, StoreError>;

    /// Replace an existing credential.
    async fn update_credential(&self, credential: Credential) -> Result<(), StoreError>;

    async fn credentials_for(&self, subject: &SubjectId) -> Result<Vec<Credential>, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    consumed: BTreeSet<String>,
    credentials: BTreeMap<String, Credential>,
}

impl StoreState {
    fn consume(&mut self, hashes: &[String]) -> bool {
        let mut batch = BTreeSet::new();
        for hash in hashes {
            if self.consumed.contains(hash) || !batch.insert(hash.clone()) {
                return false;
            }
        }
        self.consumed.extend(batch);
        true
    }

    fn issue(&mut self, credential: Credential) -> Issuance {
        let mut batch = BTreeSet::new();
        for hash in &credential.proof_hashes {
            if self.consumed.contains(hash) || !batch.insert(hash.clone()) {
                return Issuance::Replayed(hash.clone());
            }
        }
        if self.credentials.contains_key(&credential.id) {
            return Issuance::Duplicate(credential.id);
        }
        self.consumed.extend(batch);
        self.credentials.insert(credential.id.clone(), credential);
        Issuance::Issued
    }

    fn insert(&mut self, credential: Credential) -> Result<(), StoreError> {
        if self.credentials.contains_key(&credential.id) {
            return Err(StoreError::Duplicate(credential.id));
        }
        self.credentials.insert(credential.id.clone(), credential);
        Ok(())
    }

    fn update(&mut self, credential: Credential) -> Result<(), StoreError> {
        match self.credentials.get_mut(&credential.id) {
            Some(slot) => {
                *slot = credential;
                Ok(())
            }
            None => Err(StoreError::NotFound(credential.id)),
        }
    }

    fn for_subject(&self, subject: &SubjectId) -> Vec<Credential> {
        self.credentials
            .values()
            .filter(|c| &c.subject == subject)
            .cloned()
            .collect()
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryProofStore {
    state: RwLock<StoreState>,
}

impl MemoryProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> Result<T, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&mut state))
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&state))
    }
}

#[async_trait]
impl ProofStore for MemoryProofStore {
    async fn consume_proof_hashes(&self, hashes: &[String]) -> Result<bool, StoreError> {
        self.write(|s| s.consume(hashes))
    }

    async fn is_consumed(&self, hash: &str) -> Result<bool, StoreError> {
        self.read(|s| s.consumed.contains(hash))
    }

    async fn issue_credential(&self, credential: Credential) -> Result<Issuance, StoreError> {
        self.write(|s| s.issue(credential))
    }

    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError> {
        self.write(|s| s.insert(credential))?
    }

    async fn get_credential(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        self.read(|s| s.credentials.get(id).cloned())
    }

    async fn update_credential(&self, credential: Credential) -> Result<(), StoreError> {
        self.write(|s| s.update(credential))?
    }

    async fn credentials_for(&self, subject: &SubjectId) -> Result<Vec<Credential>, StoreError> {
        self.read(|s| s.for_subject(subject))
    }
}

/// Store backed by a single CBOR file.
///
/// Each mutation is applied to a copy, written to `<path>.tmp`, renamed over
/// `path`, and only then made visible in memory.
#[derive(Debug)]
pub struct FileProofStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileProofStore {
    /// Open `path`, starting empty if it does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => from_cbor(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            path = %path.display(),
            credentials = state.credentials.len(),
            consumed = state.consumed.len(),
            "Opened proof store"
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = to_cbor(state)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }
}

#[async_trait]
impl ProofStore for FileProofStore {
    async fn consume_proof_hashes(&self, hashes: &[String]) -> Result<bool, StoreError> {
        {
            let state = self.state.lock().await;
            if hashes.iter().any(|h| state.consumed.contains(h)) {
                return Ok(false);
            }
        }
        self.mutate(|s| Ok(s.consume(hashes))).await
    }

    async fn is_consumed(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.consumed.contains(hash))
    }

    async fn issue_credential(&self, credential: Credential) -> Result<Issuance, StoreError> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let outcome = next.issue(credential);
        if outcome == Issuance::Issued {
            self.persist(&next).await?;
            *guard = next;
        }
        Ok(outcome)
    }

    async fn insert_credential(&self, credential: Credential) -> Result<(), StoreError> {
        self.mutate(|s| s.insert(credential)).await
    }

    async fn get_credential(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.state.lock().await.credentials.get(id).cloned())
    }

    async fn update_credential(&self, credential: Credential) -> Result<(), StoreError> {
        self.mutate(|s| s.update(credential)).await
    }

    async fn credentials_for(&self, subject: &SubjectId) -> Result<Vec<Credential>, StoreError> {
        Ok(self.state.lock().await.for_subject(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::statement::ClaimStatement;
    use tempfile::TempDir;

    fn credential(id: &str) -> Credential {
        Credential {
            id: id.into(),
            subject: SubjectId::new("0xabc"),
            submitter: SubjectId::new("0xabc"),
            statement: ClaimStatement::Language {
                language_count: 2,
                timestamp_ms: 0,
            },
            proof_hashes: vec![format!("{}-proof", id)],
            integrity_hash: String::new(),
            issued_at_ms: 0,
            expires_at_ms: 1_000,
            revoked_at_ms: None,
        }
    }

    fn hashes(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_consume_is_all_or_nothing() {
        let store = MemoryProofStore::new();
        assert!(store.consume_proof_hashes(&hashes(&["a", "b"])).await.unwrap());
        assert!(!store.consume_proof_hashes(&hashes(&["c", "b"])).await.unwrap());
        assert!(!store.is_consumed("c").await.unwrap());
        assert!(store.is_consumed("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_hash_within_batch_refused() {
        let store = MemoryProofStore::new();
        assert!(!store.consume_proof_hashes(&hashes(&["a", "a"])).await.unwrap());
        assert!(!store.is_consumed("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_credential_insert_update() {
        let store = MemoryProofStore::new();
        store.insert_credential(credential("c1")).await.unwrap();
        assert!(matches!(
            store.insert_credential(credential("c1")).await,
            Err(StoreError::Duplicate(_))
        ));

        let mut revoked = credential("c1");
        revoked.revoked_at_ms = Some(5);
        store.update_credential(revoked).await.unwrap();
        let loaded = store.get_credential("c1").await.unwrap().unwrap();
        assert_eq!(loaded.revoked_at_ms, Some(5));

        assert!(matches!(
            store.update_credential(credential("missing")).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.credentials_for(&SubjectId::new("0xabc")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_issue_is_atomic() {
        let store = MemoryProofStore::new();
        assert_eq!(store.issue_credential(credential("c1")).await.unwrap(), Issuance::Issued);
        assert!(store.is_consumed("c1-proof").await.unwrap());

        // Same id under a fresh proof hash: nothing is consumed.
        let mut same_id = credential("c1");
        same_id.proof_hashes = hashes(&["fresh"]);
        assert_eq!(
            store.issue_credential(same_id).await.unwrap(),
            Issuance::Duplicate("c1".to_string())
        );
        assert!(!store.is_consumed("fresh").await.unwrap());

        // A consumed hash refuses the whole credential.
        let mut reused = credential("c2");
        reused.proof_hashes = hashes(&["other", "c1-proof"]);
        assert_eq!(
            store.issue_credential(reused).await.unwrap(),
            Issuance::Replayed("c1-proof".to_string())
        );
        assert!(!store.is_consumed("other").await.unwrap());
        assert!(store.get_credential("c2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_issue_persists_only_on_success() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.cbor");
        let store = FileProofStore::open(&path).await.unwrap();
        assert_eq!(store.issue_credential(credential("c1")).await.unwrap(), Issuance::Issued);
        let mut same_id = credential("c1");
        same_id.proof_hashes = hashes(&["fresh"]);
        assert!(matches!(
            store.issue_credential(same_id).await.unwrap(),
            Issuance::Duplicate(_)
        ));

        let reopened = FileProofStore::open(&path).await.unwrap();
        assert!(reopened.is_consumed("c1-proof").await.unwrap());
        assert!(!reopened.is_consumed("fresh").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry").join("state.cbor");
        {
            let store = FileProofStore::open(&path).await.unwrap();
            assert!(store.consume_proof_hashes(&hashes(&["a"])).await.unwrap());
            store.insert_credential(credential("c1")).await.unwrap();
        }
        let reopened = FileProofStore::open(&path).await.unwrap();
        assert!(reopened.is_consumed("a").await.unwrap());
        assert!(!reopened.consume_proof_hashes(&hashes(&["a"])).await.unwrap());
        assert!(reopened.get_credential("c1").await.unwrap().is_some());
    }
}
