//! Issue image storage
//!
//! Issue photos are written to an object bucket and referenced from the
//! issue by public URL. Object keys are `{unix_millis}-{uuid}.{ext}`, the
//! extension taken from the uploaded filename. Stores never overwrite an
//! existing key.
//!
//! Implementations target the local filesystem (served under `/images`) or
//! memory (tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Bucket holding issue photos
pub const IMAGE_BUCKET: &str = "issue-images";

/// Image storage failure
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Blob already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Object key for an uploaded image. `nonce` keeps uploads within the same
/// millisecond apart.
pub fn image_key(filename: &str, now: DateTime<Utc>, nonce: Uuid) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string());
    format!("{}-{}.{}", now.timestamp_millis(), nonce.simple(), ext)
}

/// Content type guessed from the key's extension
pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Abstract object storage for issue images
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store binary content under a new `key`. Fails with `AlreadyExists`
    /// rather than replacing an object.
    async fn put(&self, key: &str, content: &[u8], content_type: &str)
        -> Result<(), BlobStoreError>;

    /// Fetch binary content by key
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// Delete binary content
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError>;

    /// Check if blob exists
    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError>;

    /// URL the presentation layer loads the object from
    fn public_url(&self, key: &str) -> String;

    /// Store an uploaded image and return its public URL.
    async fn upload(&self, content: &[u8], filename: &str) -> Result<String, BlobStoreError> {
        if content.is_empty() {
            return Err(BlobStoreError::Storage("empty upload".to_string()));
        }
        let key = image_key(filename, Utc::now(), Uuid::new_v4());
        self.put(&key, content, content_type_for(&key)).await?;
        tracing::debug!(key = %key, bytes = content.len(), "Stored image");
        Ok(self.public_url(&key))
    }
}

fn check_key(key: &str) -> Result<(), BlobStoreError> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') {
        return Err(BlobStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Local filesystem implementation
pub struct LocalBlobStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for_key(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        check_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        key: &str,
        content: &[u8],
        _content_type: &str,
    ) -> Result<(), BlobStoreError> {
        let path = self.path_for_key(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BlobStoreError::AlreadyExists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content).await?;
        file.flush().await?;
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.path_for_key(key)?;

        if !path.exists() {
            return Err(BlobStoreError::NotFound(key.to_string()));
        }

        Ok(tokio::fs::read(path).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        let path = self.path_for_key(key)?;

        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        Ok(self.path_for_key(key)?.exists())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

/// In-memory blob store
#[derive(Default, Clone)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        content: &[u8],
        _content_type: &str,
    ) -> Result<(), BlobStoreError> {
        check_key(key)?;
        let mut blobs = self.blobs.write().await;
        match blobs.entry(key.to_string()) {
            Entry::Occupied(_) => Err(BlobStoreError::AlreadyExists(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(content.to_vec());
                Ok(())
            }
        }
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let blobs = self.blobs.read().await;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        let mut blobs = self.blobs.write().await;
        blobs.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobStoreError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.contains_key(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}/{}", IMAGE_BUCKET, key)
    }
}
