//! Materialized table state.

pub mod cache;
pub mod factory;

use chrono::Utc;
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::log::{LogSegment, Version};
use crate::metadata::{Protocol, TableMetadata};

pub use cache::{SnapshotCache, SnapshotCacheRef};
pub use factory::SnapshotFactory;

/// Aggregate statistics for one version, read from the `.crc` sidecar the
/// writer leaves next to a commit. Advisory: absent or unreadable sidecars
/// yield `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionChecksum {
    pub table_size_bytes: i64,
    pub num_files: i64,
    pub num_metadata: i64,
    pub num_protocol: i64,
}

/// Immutable table state at one version, derived from a [`LogSegment`].
///
/// Snapshots are cheap to share (`Arc`) and never change after construction;
/// refreshing produces a new snapshot rather than mutating an old one.
#[derive(Debug)]
pub struct Snapshot {
    version: Version,
    log_segment: LogSegment,
    metadata: TableMetadata,
    protocol: Protocol,
    /// Millisecond timestamp before which removed data files may have been
    /// collected and must not be read.
    min_file_retention_timestamp: i64,
    checksum: Option<VersionChecksum>,
}

impl Snapshot {
    pub(crate) fn new(
        log_segment: LogSegment,
        metadata: TableMetadata,
        checksum: Option<VersionChecksum>,
    ) -> Self {
        let protocol = metadata.protocol();
        let min_file_retention_timestamp =
            Utc::now().timestamp_millis() - metadata.file_retention_millis();
        Self {
            version: log_segment.version,
            log_segment,
            metadata,
            protocol,
            min_file_retention_timestamp,
            checksum,
        }
    }

    /// State of a table whose log directory does not exist: version `-1`,
    /// empty metadata.
    pub fn initial(log_path: Path) -> Self {
        Self::new(LogSegment::empty(log_path), TableMetadata::default(), None)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// True for the pre-genesis state of an uninitialized table.
    pub fn is_initial(&self) -> bool {
        self.version < 0
    }

    pub fn log_segment(&self) -> &LogSegment {
        &self.log_segment
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Stable table identity; `None` for an uninitialized table.
    pub fn table_id(&self) -> Option<Uuid> {
        self.metadata.table_id
    }

    pub fn min_file_retention_timestamp(&self) -> i64 {
        self.min_file_retention_timestamp
    }

    pub fn checksum(&self) -> Option<VersionChecksum> {
        self.checksum
    }
}
