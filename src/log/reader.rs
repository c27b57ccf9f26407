//! Listing layer over the log directory.

use object_store::path::Path;
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::error::{LogError, LogStorageSnafu};
use crate::log::checkpoint::LastCheckpointHint;
use crate::log::path::{self, LogFile, Version};
use crate::storage::StorageProviderRef;

/// Result of one log directory listing.
#[derive(Debug)]
pub struct LogListing {
    /// Commit and checkpoint files at or above the requested version, in
    /// ascending `(version, kind)` order.
    pub files: Vec<LogFile>,
    /// Total entries the backend returned before filtering. Zero means the
    /// log directory itself does not exist.
    pub raw_entries: usize,
}

/// Reads and classifies log directory listings.
///
/// The backend returns a snapshot-consistent listing per call; files may
/// appear or vanish between calls, and callers must tolerate both.
#[derive(Debug, Clone)]
pub struct LogDirectoryReader {
    storage: StorageProviderRef,
    log_path: Path,
    /// Table identifier for logging and metrics labeling.
    table: String,
}

impl LogDirectoryReader {
    pub fn new(storage: StorageProviderRef, log_path: Path, table: String) -> Self {
        Self {
            storage,
            log_path,
            table,
        }
    }

    /// The log directory path, relative to the table root.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Storage backing this log directory.
    pub fn storage(&self) -> &StorageProviderRef {
        &self.storage
    }

    /// List log files with version `>= start_version`.
    ///
    /// Half-written checkpoint files (zero length) are dropped: they would
    /// otherwise be selected and then fail to decode. An empty result is not
    /// an error here: whether it means a vanished directory or merely an
    /// offset past the newest file depends on what the caller asked for.
    pub async fn list_from(&self, start_version: Version) -> Result<LogListing, LogError> {
        let offset = path::version_offset(&self.log_path, start_version);
        let entries = self
            .storage
            .list_from(&self.log_path, &offset)
            .await
            .context(LogStorageSnafu)?;
        let raw_entries = entries.len();

        let mut files = Vec::with_capacity(raw_entries);
        for meta in &entries {
            let Some(file) = LogFile::classify(meta) else {
                continue;
            };
            if file.kind.is_checkpoint() && file.size == 0 {
                warn!(
                    table = %self.table,
                    path = %file.path,
                    "Ignoring zero-length checkpoint file"
                );
                continue;
            }
            files.push(file);
        }

        debug!(
            table = %self.table,
            start_version,
            raw_entries,
            log_files = files.len(),
            "Listed log directory"
        );

        Ok(LogListing { files, raw_entries })
    }

    /// Read the `_last_checkpoint` pointer file.
    ///
    /// The pointer is advisory: a missing or undecodable file is reported as
    /// `None` and never fails the caller.
    pub async fn read_last_checkpoint(&self) -> Option<LastCheckpointHint> {
        let pointer = path::last_checkpoint_path(&self.log_path);
        let bytes = match self.storage.get(&pointer).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return None,
            Err(e) => {
                warn!(table = %self.table, "Failed to read {pointer}: {e}");
                return None;
            }
        };

        match serde_json::from_slice::<LastCheckpointHint>(&bytes) {
            Ok(hint) => Some(hint),
            Err(e) => {
                warn!(
                    table = %self.table,
                    "Ignoring undecodable {pointer}: {e}"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use object_store::ObjectMeta;

    use super::*;
    use crate::log::path::{LOG_DIR_NAME, LogFileKind};
    use crate::storage::StorageProvider;

    async fn seed(storage: &StorageProvider, name: &str, bytes: &[u8]) {
        storage
            .put(&Path::from(format!("{LOG_DIR_NAME}/{name}")), bytes.to_vec())
            .await
            .unwrap();
    }

    fn reader(storage: Arc<StorageProvider>) -> LogDirectoryReader {
        LogDirectoryReader::new(storage, Path::from(LOG_DIR_NAME), "test".to_string())
    }

    #[tokio::test]
    async fn lists_and_classifies_from_version() {
        let storage = Arc::new(StorageProvider::for_url("memory://t").await.unwrap());
        seed(&storage, "00000000000000000000.json", b"{}").await;
        seed(&storage, "00000000000000000001.json", b"{}").await;
        seed(&storage, "00000000000000000001.checkpoint.parquet", b"pq").await;
        seed(&storage, "_last_checkpoint", b"{\"version\":1,\"size\":1}").await;

        let listing = reader(storage).list_from(1).await.unwrap();
        // The pointer file is listed by the backend but is not a log file.
        assert_eq!(listing.raw_entries, 3);
        assert_eq!(listing.files.len(), 2);
        assert_eq!(listing.files[0].kind, LogFileKind::Checkpoint);
        assert_eq!(listing.files[1].kind, LogFileKind::Commit);
        assert!(listing.files.iter().all(|f| f.version == 1));
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let storage = Arc::new(StorageProvider::for_url("memory://t").await.unwrap());
        let listing = reader(storage).list_from(0).await.unwrap();
        assert_eq!(listing.raw_entries, 0);
        assert!(listing.files.is_empty());
    }

    #[tokio::test]
    async fn drops_zero_length_checkpoints() {
        let storage = Arc::new(StorageProvider::for_url("memory://t").await.unwrap());
        seed(&storage, "00000000000000000000.json", b"{}").await;
        seed(&storage, "00000000000000000000.checkpoint.parquet", b"").await;

        let listing = reader(storage).list_from(0).await.unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].kind, LogFileKind::Commit);
    }

    #[tokio::test]
    async fn zero_length_commits_are_kept() {
        // Only checkpoints are dropped on zero length; an empty commit file
        // is a replay-time problem, not a listing-time one.
        let storage = Arc::new(StorageProvider::for_url("memory://t").await.unwrap());
        seed(&storage, "00000000000000000000.json", b"").await;

        let listing = reader(storage).list_from(0).await.unwrap();
        assert_eq!(listing.files.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_hint_is_none() {
        let storage = Arc::new(StorageProvider::for_url("memory://t").await.unwrap());
        let reader = reader(storage.clone());
        assert!(reader.read_last_checkpoint().await.is_none());

        seed(&storage, "_last_checkpoint", b"not json").await;
        assert!(reader.read_last_checkpoint().await.is_none());

        seed(&storage, "_last_checkpoint", b"{\"version\":4,\"size\":100}").await;
        let hint = reader.read_last_checkpoint().await.unwrap();
        assert_eq!(hint.version, 4);
        assert_eq!(hint.parts, None);
    }

    #[test]
    fn listing_order_is_version_then_kind() {
        // Lexicographic name order groups a version's checkpoint files
        // before its commit file ('c' < 'j' after the shared digit prefix).
        let mk = |name: &str| ObjectMeta {
            location: Path::from(format!("{LOG_DIR_NAME}/{name}")),
            last_modified: Utc::now(),
            size: 1,
            e_tag: None,
            version: None,
        };
        let a = mk("00000000000000000002.checkpoint.parquet");
        let b = mk("00000000000000000002.json");
        assert!(a.location < b.location);
    }
}
