//! Durable blob backends
//!
//! Backends are content-addressed: `put` returns the hex SHA-256 of the bytes
//! and that identifier is the only handle for `get` and `delete`.
//!
//! - [`MemoryBackend`]: process-local, can be switched offline for outage tests
//! - [`FileBackend`]: one file per blob under a root directory

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use thiserror::Error;

/// Errors raised by blob backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Invalid blob identifier: {0}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content identifier for `bytes`.
pub fn blob_id(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Content-addressed blob storage.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Short name used in logs and replica lists.
    fn name(&self) -> &str;

    /// Store `bytes` and return their identifier.
    async fn put(&self, bytes: &[u8]) -> Result<String, StorageError>;

    async fn get(&self, id: &str) -> Result<Vec<u8>, StorageError>;

    /// Deleting a missing blob is not an error.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// In-memory backend.
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    online: AtomicBool,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blobs: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(self.unavailable("offline"))
        }
    }

    fn unavailable(&self, reason: &str) -> StorageError {
        StorageError::Unavailable {
            backend: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, bytes: &[u8]) -> Result<String, StorageError> {
        self.check_online()?;
        let id = blob_id(bytes);
        self.blobs
            .write()
            .map_err(|_| self.unavailable("lock poisoned"))?
            .insert(id.clone(), bytes.to_vec());
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        self.check_online()?;
        self.blobs
            .read()
            .map_err(|_| self.unavailable("lock poisoned"))?
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.check_online()?;
        self.blobs
            .write()
            .map_err(|_| self.unavailable("lock poisoned"))?
            .remove(id);
        Ok(())
    }
}

/// Filesystem backend storing each blob at `<root>/<id[..2]>/<id>`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    name: String,
    root: PathBuf,
}

impl FileBackend {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StorageError> {
        if id.len() != 64 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(&id[..2]).join(id))
    }
}

#[async_trait]
impl BlobBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, bytes: &[u8]) -> Result<String, StorageError> {
        let id = blob_id(bytes);
        let path = self.path_for(&id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_roundtrip_and_outage() {
        let backend = MemoryBackend::new("mem");
        let id = backend.put(b"hello").await.unwrap();
        assert_eq!(id, blob_id(b"hello"));
        assert_eq!(backend.get(&id).await.unwrap(), b"hello");

        backend.set_online(false);
        assert!(matches!(
            backend.get(&id).await,
            Err(StorageError::Unavailable { .. })
        ));
        backend.set_online(true);

        backend.delete(&id).await.unwrap();
        assert!(matches!(backend.get(&id).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_backend_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new("disk", dir.path());
        let id = backend.put(b"payload").await.unwrap();
        assert!(dir.path().join(&id[..2]).join(&id).exists());
        assert_eq!(backend.get(&id).await.unwrap(), b"payload");

        backend.delete(&id).await.unwrap();
        backend.delete(&id).await.unwrap();
        assert!(matches!(backend.get(&id).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_backend_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new("disk", dir.path());
        assert!(matches!(
            backend.get("../../etc/passwd").await,
            Err(StorageError::InvalidId(_))
        ));
    }
}
