//! Blob storage backends for finished payloads.
//!
//! Keys are content-addressed by the finalizer; a backend only has to map
//! `key -> bytes` and hand back a stable URL.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::BlobError;

/// Where finished payloads live.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a payload under `key`, returning a stable URL for it.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str)
        -> Result<String, BlobError>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

/// In-memory blob storage for tests and Postgres-less development runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }

    /// Fetch a stored payload and its content type.
    pub async fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.blobs
            .lock()
            .await
            .get(key)
            .map(|blob| (blob.bytes.clone(), blob.content_type.clone()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, BlobError> {
        self.blobs.lock().await.insert(
            key.to_string(),
            StoredBlob {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("memory://{key}"))
    }
}

// ---------------------------------------------------------------------------
// Local-filesystem backend
// ---------------------------------------------------------------------------

/// Blob storage on the local filesystem, rooted at a configured directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, BlobError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("file://{}", path.display()))
    }
}
