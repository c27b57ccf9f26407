//! Storage abstraction for the transaction log.
//!
//! Wraps an [`ObjectStore`] with the small surface the snapshot core needs:
//! offset listings, point reads, and writes (used by hosts and tests that
//! seed log directories). Local filesystem and in-memory backends are built
//! in; cloud drivers plug in through [`StorageProvider::from_store`].

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};
use snafu::prelude::*;

use crate::error::{InvalidUrlSnafu, IoSnafu, ObjectStoreSnafu, StorageError};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// URL scheme for the in-memory backend.
const MEMORY_SCHEME: &str = "memory://";

/// Storage provider rooted at a table directory.
///
/// All paths handed to and returned from this provider are relative to the
/// table root (e.g. `_delta_log/00000000000000000003.json`).
pub struct StorageProvider {
    object_store: Arc<dyn ObjectStore>,
    canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Create a provider for the given table URL.
    ///
    /// Plain paths and `file://` URLs resolve to the local filesystem (the
    /// directory is created if missing); `memory://` creates a fresh
    /// in-memory store.
    pub async fn for_url(url: &str) -> Result<Self, StorageError> {
        if let Some(name) = url.strip_prefix(MEMORY_SCHEME) {
            return Ok(Self::from_store(
                Arc::new(InMemory::new()),
                format!("{MEMORY_SCHEME}{name}"),
            ));
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        ensure!(path.starts_with('/'), InvalidUrlSnafu { url });

        tokio::fs::create_dir_all(path).await.context(IoSnafu)?;
        let store = LocalFileSystem::new_with_prefix(path).context(ObjectStoreSnafu)?;

        Ok(Self::from_store(
            Arc::new(store),
            format!("file://{path}"),
        ))
    }

    /// Wrap an externally constructed store (cloud drivers, test doubles).
    pub fn from_store(object_store: Arc<dyn ObjectStore>, canonical_url: String) -> Self {
        Self {
            object_store,
            canonical_url,
        }
    }

    /// Canonical URL of the table root.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// List entries under `prefix` whose paths sort strictly after `offset`,
    /// in ascending path order.
    ///
    /// The backend returns a snapshot-consistent listing for a single call;
    /// consecutive calls may observe different directory states.
    pub async fn list_from(
        &self,
        prefix: &Path,
        offset: &Path,
    ) -> Result<Vec<ObjectMeta>, StorageError> {
        let mut stream = self.object_store.list_with_offset(Some(prefix), offset);

        let mut entries = Vec::new();
        while let Some(result) = stream.next().await {
            entries.push(result.context(ObjectStoreSnafu)?);
        }

        // Object stores do not guarantee listing order across pages.
        entries.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(entries)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let result = self.object_store.get(path).await.context(ObjectStoreSnafu)?;
        result.bytes().await.context(ObjectStoreSnafu)
    }

    /// Write a file, replacing any existing content.
    pub async fn put(&self, path: &Path, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.object_store
            .put(path, bytes.into())
            .await
            .map(|_| ())
            .context(ObjectStoreSnafu)
    }

    /// Delete a file.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        self.object_store.delete(path).await.context(ObjectStoreSnafu)
    }
}
