//! §1/§6 — `BlobStore`: an opaque object store, put/get by id, with
//! optional server-side encryption transparent to the core. The real
//! deployment's store is out of scope; this crate ships the two
//! backends the engine's tests and a single-node deployment need.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, blob_id: &str, bytes: Vec<u8>) -> Result<(), BlobStoreError>;
    async fn get(&self, blob_id: &str) -> Result<Vec<u8>, BlobStoreError>;
}

pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self { blobs: RwLock::new(HashMap::new()) }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, blob_id: &str, bytes: Vec<u8>) -> Result<(), BlobStoreError> {
        self.blobs.write().await.insert(blob_id.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, blob_id: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.blobs
            .read()
            .await
            .get(blob_id)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(blob_id.to_string()))
    }
}

pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, blob_id: &str) -> PathBuf {
        self.root.join(blob_id)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, blob_id: &str, bytes: Vec<u8>) -> Result<(), BlobStoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(blob_id), bytes).await?;
        Ok(())
    }

    async fn get(&self, blob_id: &str) -> Result<Vec<u8>, BlobStoreError> {
        tokio::fs::read(self.path_for(blob_id))
            .await
            .map_err(|_| BlobStoreError::NotFound(blob_id.to_string()))
    }
}

pub type SharedBlobStore = Arc<dyn BlobStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryBlobStore::new();
        store.put("blob-1", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("blob-1").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let store = MemoryBlobStore::new();
        assert!(matches!(store.get("missing").await, Err(BlobStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn filesystem_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path().to_path_buf());
        store.put("blob-1", b"on disk".to_vec()).await.unwrap();
        assert_eq!(store.get("blob-1").await.unwrap(), b"on disk");
    }
}
