//! Log segment construction.
//!
//! A [`LogSegment`] is the minimal file manifest that reconstructs one table
//! version: an optional complete checkpoint plus the contiguous run of
//! commit files after it. Construction tolerates concurrent writers and
//! cleaners: any file in the listing may be gone by the time it is opened,
//! and a checkpoint named by the pointer file may never have finished
//! uploading.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use object_store::path::Path;
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::error::{
    EmptyDirectorySnafu, IllegalLogStateSnafu, LogError, MissingCheckpointPartsSnafu,
    MissingVersionSnafu, NonContiguousVersionsSnafu,
};
use crate::log::checkpoint::{self, CheckpointInstance, CompleteCheckpoint};
use crate::log::path::{LogFile, Version};
use crate::log::reader::LogDirectoryReader;

/// The ordered set of files that reconstructs one table version.
///
/// Immutable once built. Two segments compare equal when they name the same
/// log directory, version, and last commit timestamp; the modification time
/// makes a rewritten directory (same versions, new history) compare unequal.
#[derive(Debug, Clone)]
pub struct LogSegment {
    /// The log directory this segment was built from.
    pub log_path: Path,
    /// The table version this segment reconstructs.
    pub version: Version,
    /// Commit files covering `(checkpoint_version, version]`, ascending.
    pub deltas: Vec<LogFile>,
    /// Files of the chosen checkpoint; empty when replay starts at version 0.
    pub checkpoint_files: Vec<LogFile>,
    /// Version of the chosen checkpoint.
    pub checkpoint_version: Option<Version>,
    /// Modification time of the commit file for `version`. Sourced from a
    /// commit file, never from a checkpoint.
    pub last_commit_timestamp: DateTime<Utc>,
}

impl LogSegment {
    /// Segment for a table with no log: the pre-genesis sentinel.
    pub fn empty(log_path: Path) -> Self {
        Self {
            log_path,
            version: -1,
            deltas: Vec::new(),
            checkpoint_files: Vec::new(),
            checkpoint_version: None,
            last_commit_timestamp: DateTime::UNIX_EPOCH,
        }
    }
}

impl PartialEq for LogSegment {
    fn eq(&self, other: &Self) -> bool {
        self.log_path == other.log_path
            && self.version == other.version
            && self.last_commit_timestamp == other.last_commit_timestamp
    }
}

impl Eq for LogSegment {}

impl Hash for LogSegment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.log_path.hash(state);
        (self.last_commit_timestamp.timestamp_millis() as u32).hash(state);
    }
}

/// Builds [`LogSegment`]s from live directory listings.
#[derive(Debug, Clone)]
pub struct LogSegmentBuilder {
    reader: LogDirectoryReader,
}

impl LogSegmentBuilder {
    pub fn new(reader: LogDirectoryReader) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &LogDirectoryReader {
        &self.reader
    }

    /// Build the segment for `version_to_load`, or for the latest
    /// reconstructable version when absent.
    ///
    /// `start_checkpoint` narrows the listing to files at or above a
    /// checkpoint the caller believes exists (from the pointer file or a
    /// previous snapshot). The hint is not trusted: when the hinted
    /// checkpoint is gone from the listing, construction falls back to the
    /// previous complete checkpoint, and when the narrowed listing is empty
    /// (the directory was recreated below the hint) it restarts unhinted.
    pub async fn build(
        &self,
        start_checkpoint: Option<Version>,
        version_to_load: Option<Version>,
    ) -> Result<LogSegment, LogError> {
        let log_path = self.reader.log_path().clone();
        let mut hint = start_checkpoint;

        loop {
            let listing = self.reader.list_from(hint.unwrap_or(0)).await?;
            let mut files = listing.files;
            if let Some(ceiling) = version_to_load {
                files.retain(|f| f.version <= ceiling);
            }

            if files.is_empty() {
                if let Some(stale) = hint.take() {
                    warn!(
                        log_path = %log_path,
                        stale_checkpoint = stale,
                        "No log files at or above hinted checkpoint; relisting from scratch"
                    );
                    continue;
                }
                if listing.raw_entries == 0 {
                    // Not even foreign files: the directory itself is gone
                    // (or was never created).
                    return Err(directory_vanished(&log_path));
                }
                return EmptyDirectorySnafu {
                    log_path: log_path.to_string(),
                }
                .fail();
            }

            let (checkpoints, deltas): (Vec<LogFile>, Vec<LogFile>) =
                files.into_iter().partition(|f| f.kind.is_checkpoint());

            let bound = version_to_load
                .map(CheckpointInstance::at)
                .unwrap_or(CheckpointInstance::MAX);
            let new_checkpoint = checkpoint::latest_complete(&checkpoints, bound);

            if new_checkpoint.is_none()
                && let Some(expected) = hint
            {
                // The checkpoint we were told to start from is incomplete or
                // gone. Rebuild on the previous complete checkpoint instead.
                let target = version_to_load.or_else(|| deltas.last().map(|d| d.version));
                let Some(target) = target else {
                    return MissingCheckpointPartsSnafu { version: expected }.fail();
                };
                return match self.build_with_exclusive_ceiling(target, expected).await? {
                    Some(segment) => Ok(segment),
                    None => MissingCheckpointPartsSnafu { version: expected }.fail(),
                };
            }

            return self.assemble(log_path, new_checkpoint, deltas, version_to_load);
        }
    }

    /// Build a segment for `snapshot_version` using only checkpoints strictly
    /// below `max_exclusive_checkpoint`.
    ///
    /// Used when the checkpoint a segment was built on is missing or
    /// unreadable. Returns `Ok(None)` when no equivalent segment exists;
    /// the caller, not this function, decides whether that is fatal.
    pub async fn build_with_exclusive_ceiling(
        &self,
        snapshot_version: Version,
        max_exclusive_checkpoint: Version,
    ) -> Result<Option<LogSegment>, LogError> {
        ensure!(
            snapshot_version >= max_exclusive_checkpoint,
            IllegalLogStateSnafu {
                message: format!(
                    "cannot rebuild version {snapshot_version} below checkpoint \
                     {max_exclusive_checkpoint}"
                ),
            }
        );
        let log_path = self.reader.log_path().clone();
        let search_bound = snapshot_version.min(max_exclusive_checkpoint - 1);

        let previous = checkpoint::find_last_complete_checkpoint(&self.reader, search_bound).await?;
        let replay_start = previous.as_ref().map(|cp| cp.instance.version).unwrap_or(0);

        debug!(
            log_path = %log_path,
            snapshot_version,
            max_exclusive_checkpoint,
            fallback_checkpoint = previous.as_ref().map(|cp| cp.instance.version),
            "Rebuilding log segment below checkpoint ceiling"
        );

        let listing = match self.reader.list_from(replay_start).await {
            Ok(listing) => listing,
            Err(e) if e.is_directory_vanished() => return Ok(None),
            Err(e) => return Err(e),
        };

        let expected_start = match &previous {
            Some(cp) => cp.instance.version + 1,
            None => 0,
        };
        let deltas: Vec<LogFile> = listing
            .files
            .into_iter()
            .filter(|f| {
                !f.kind.is_checkpoint()
                    && f.version >= expected_start
                    && f.version <= snapshot_version
            })
            .collect();

        let chain_is_valid = verify_contiguous(&deltas, expected_start).is_ok()
            && deltas.last().map(|d| d.version) == Some(snapshot_version);
        if !chain_is_valid {
            return Ok(None);
        }

        let last_commit_timestamp = deltas
            .last()
            .map(|d| d.modified)
            .unwrap_or(DateTime::UNIX_EPOCH);

        Ok(Some(LogSegment {
            log_path,
            version: snapshot_version,
            deltas,
            checkpoint_files: previous.as_ref().map(|cp| cp.files.clone()).unwrap_or_default(),
            checkpoint_version: previous.map(|cp| cp.instance.version),
            last_commit_timestamp,
        }))
    }

    fn assemble(
        &self,
        log_path: Path,
        new_checkpoint: Option<CompleteCheckpoint>,
        deltas: Vec<LogFile>,
        version_to_load: Option<Version>,
    ) -> Result<LogSegment, LogError> {
        let checkpoint_version = new_checkpoint.as_ref().map(|cp| cp.instance.version);
        let replay_floor = checkpoint_version.unwrap_or(-1);
        let had_deltas = !deltas.is_empty();

        let retained: Vec<LogFile> = deltas
            .iter()
            .filter(|d| d.version > replay_floor)
            .cloned()
            .collect();

        if retained.is_empty() {
            let Some(cp) = new_checkpoint else {
                if had_deltas {
                    // Unreachable without a checkpoint: with no replay floor
                    // every listed commit is retained.
                    return IllegalLogStateSnafu {
                        message: "listed commit files disappeared during partitioning".to_string(),
                    }
                    .fail();
                }
                // Only incomplete checkpoints were listed; nothing can be
                // reconstructed from them.
                return EmptyDirectorySnafu {
                    log_path: log_path.to_string(),
                }
                .fail();
            };

            // Checkpoint-only segment: the checkpoint version is the newest
            // reconstructable state.
            if let Some(target) = version_to_load
                && target != cp.instance.version
            {
                return MissingVersionSnafu {
                    version: cp.instance.version + 1,
                }
                .fail();
            }

            // The commit for the checkpoint version normally still exists;
            // its timestamp is the commit time of the segment version.
            let last_commit_timestamp = deltas
                .iter()
                .find(|d| d.version == cp.instance.version)
                .map(|d| d.modified)
                .unwrap_or(DateTime::UNIX_EPOCH);

            return Ok(LogSegment {
                log_path,
                version: cp.instance.version,
                deltas: Vec::new(),
                checkpoint_files: cp.files,
                checkpoint_version,
                last_commit_timestamp,
            });
        }

        verify_contiguous(&retained, replay_floor + 1)?;

        let last = retained.last().expect("retained is non-empty");
        if let Some(target) = version_to_load
            && last.version != target
        {
            return MissingVersionSnafu {
                version: last.version + 1,
            }
            .fail();
        }

        Ok(LogSegment {
            log_path,
            version: last.version,
            last_commit_timestamp: last.modified,
            checkpoint_files: new_checkpoint.map(|cp| cp.files).unwrap_or_default(),
            checkpoint_version,
            deltas: retained,
        })
    }
}

/// The error shape for a log directory that does not exist. Object stores
/// have no directories, so "the directory vanished" is observed as a listing
/// with no entries at all and normalized to the same not-found error a
/// filesystem backend would raise.
fn directory_vanished(log_path: &Path) -> LogError {
    LogError::LogStorage {
        source: crate::error::StorageError::ObjectStore {
            source: object_store::Error::NotFound {
                path: log_path.to_string(),
                source: "log directory has no entries".into(),
            },
        },
    }
}

/// Verify that `deltas` carry strictly consecutive versions starting at
/// `expected_start`.
fn verify_contiguous(deltas: &[LogFile], expected_start: Version) -> Result<(), LogError> {
    let mut expected = expected_start;
    for file in deltas {
        if file.version == expected {
            expected += 1;
        } else if file.version > expected {
            return MissingVersionSnafu { version: expected }.fail();
        } else {
            return NonContiguousVersionsSnafu {
                expected,
                found: file.version,
            }
            .fail();
        }
    }
    Ok(())
}
