//! Checkpoint discovery and selection.
//!
//! A checkpoint is identified by `(version, parts)`: single-file checkpoints
//! have no part count, multi-part checkpoints name theirs. Selection only
//! ever returns *complete* checkpoints (every shard present in the same
//! listing), because a partially-uploaded checkpoint looks identical to a
//! partially-deleted one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LogError;
use crate::log::path::{LogFile, LogFileKind, Version};
use crate::log::reader::LogDirectoryReader;

/// Identity of one checkpoint within a listing.
///
/// Ordering is by version, then by part count with single-file checkpoints
/// ordering before multi-part ones at the same version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CheckpointInstance {
    pub version: Version,
    pub parts: Option<u32>,
}

impl CheckpointInstance {
    /// Unbounded search ceiling.
    pub const MAX: CheckpointInstance = CheckpointInstance {
        version: Version::MAX,
        parts: None,
    };

    /// Ceiling at `version`, admitting any part count.
    pub fn at(version: Version) -> Self {
        Self {
            version,
            parts: None,
        }
    }

    /// True when this instance is admitted by the `bound` ceiling. A bound
    /// without a part count admits every shape at its version.
    pub fn is_not_later_than(&self, bound: &CheckpointInstance) -> bool {
        if self.version != bound.version {
            return self.version < bound.version;
        }
        match (self.parts, bound.parts) {
            (_, None) => true,
            (None, Some(_)) => true,
            (Some(own), Some(limit)) => own <= limit,
        }
    }
}

/// A complete checkpoint: its identity plus every file that makes it up,
/// in part order.
#[derive(Debug, Clone)]
pub struct CompleteCheckpoint {
    pub instance: CheckpointInstance,
    pub files: Vec<LogFile>,
}

/// Contents of the `_last_checkpoint` pointer file.
///
/// Advisory only: it accelerates checkpoint discovery but is never trusted.
/// The checkpoint it names is re-verified against a live listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LastCheckpointHint {
    /// Version of the most recently finalized checkpoint.
    pub version: Version,
    /// Total byte size of the checkpoint.
    pub size: i64,
    /// Part count, for multi-part checkpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<u32>,
}

/// Select the latest complete checkpoint among `candidates` admitted by
/// `bound`.
///
/// `candidates` must be in listing (ascending path) order, so one version's
/// checkpoint files are adjacent and multi-part shards arrive part 1 first.
/// Files are accumulated per version and the group is resolved when the
/// version changes; a later complete group replaces an earlier selection.
///
/// At one version, a complete single-file checkpoint and a complete
/// multi-part checkpoint may coexist; the higher part count wins, matching
/// the writer that produced the multi-part variant last.
pub fn latest_complete(candidates: &[LogFile], bound: CheckpointInstance) -> Option<CompleteCheckpoint> {
    let mut selected: Option<CompleteCheckpoint> = None;
    let mut group_version: Option<Version> = None;
    let mut group: Vec<LogFile> = Vec::new();

    for file in candidates {
        if !file.kind.is_checkpoint() {
            continue;
        }
        if let Some(version) = group_version
            && version != file.version
        {
            flush_group(&mut selected, version, std::mem::take(&mut group), &bound);
        }
        group_version = Some(file.version);
        group.push(file.clone());
    }
    if let Some(version) = group_version {
        flush_group(&mut selected, version, group, &bound);
    }

    selected
}

/// Resolve one version's accumulated checkpoint files. Groups are flushed in
/// ascending version order, so a complete group admitted by the bound
/// overwrites whatever was selected before it.
fn flush_group(
    selected: &mut Option<CompleteCheckpoint>,
    version: Version,
    files: Vec<LogFile>,
    bound: &CheckpointInstance,
) {
    let mut by_part_count: BTreeMap<u32, Vec<LogFile>> = BTreeMap::new();

    for file in files {
        match file.kind {
            LogFileKind::Checkpoint => {
                // Single-file checkpoints at one version are equivalent;
                // keep one.
                by_part_count.insert(1, vec![file]);
            }
            LogFileKind::CheckpointPart { part: 1, total } => {
                by_part_count.insert(total, vec![file]);
            }
            LogFileKind::CheckpointPart { part, total } => {
                // Listing order delivers shards ascending; a shard that does
                // not extend its group (duplicate, out of order, or with no
                // part 1) is dropped and the group stays incomplete.
                if let Some(parts) = by_part_count.get_mut(&total)
                    && part as usize == parts.len() + 1
                {
                    parts.push(file);
                }
            }
            LogFileKind::Commit => {}
        }
    }

    for (part_count, files) in by_part_count.into_iter().rev() {
        let instance = match files[0].kind {
            LogFileKind::Checkpoint => CheckpointInstance {
                version,
                parts: None,
            },
            _ => CheckpointInstance {
                version,
                parts: Some(part_count),
            },
        };
        if files.len() != part_count as usize || !instance.is_not_later_than(bound) {
            continue;
        }
        *selected = Some(CompleteCheckpoint { instance, files });
        return;
    }
}

/// Find the latest complete checkpoint with version `<= upper_bound`,
/// consulting the `_last_checkpoint` pointer as an accelerator before
/// falling back to a full directory scan.
///
/// Returns `None` when no complete checkpoint exists in range, including
/// when the directory itself has vanished mid-search.
pub async fn find_last_complete_checkpoint(
    reader: &LogDirectoryReader,
    upper_bound: Version,
) -> Result<Option<CompleteCheckpoint>, LogError> {
    if upper_bound < 0 {
        return Ok(None);
    }

    if let Some(hint) = reader.read_last_checkpoint().await
        && hint.version <= upper_bound
        && let Ok(listing) = reader.list_from(hint.version).await
    {
        let candidates: Vec<LogFile> = listing
            .files
            .into_iter()
            .filter(|f| f.version <= upper_bound)
            .collect();
        if let Some(found) = latest_complete(&candidates, CheckpointInstance::at(upper_bound)) {
            debug!(
                version = found.instance.version,
                "Found complete checkpoint via pointer file"
            );
            return Ok(Some(found));
        }
    }

    let listing = match reader.list_from(0).await {
        Ok(listing) => listing,
        Err(e) if e.is_directory_vanished() => return Ok(None),
        Err(e) => return Err(e),
    };
    let candidates: Vec<LogFile> = listing
        .files
        .into_iter()
        .filter(|f| f.version <= upper_bound)
        .collect();
    Ok(latest_complete(&candidates, CheckpointInstance::at(upper_bound)))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use object_store::path::Path;

    use super::*;

    fn checkpoint_file(version: Version) -> LogFile {
        LogFile {
            kind: LogFileKind::Checkpoint,
            version,
            path: Path::from(format!("_delta_log/{version:020}.checkpoint.parquet")),
            modified: Utc::now(),
            size: 10,
        }
    }

    fn part_file(version: Version, part: u32, total: u32) -> LogFile {
        LogFile {
            kind: LogFileKind::CheckpointPart { part, total },
            version,
            path: Path::from(format!(
                "_delta_log/{version:020}.checkpoint.{part:010}.{total:010}.parquet"
            )),
            modified: Utc::now(),
            size: 10,
        }
    }

    #[test]
    fn instance_ordering() {
        let single_3 = CheckpointInstance { version: 3, parts: None };
        let multi_3 = CheckpointInstance { version: 3, parts: Some(2) };
        let single_5 = CheckpointInstance { version: 5, parts: None };

        assert!(single_3 < multi_3);
        assert!(multi_3 < single_5);
        assert!(single_5 < CheckpointInstance::MAX);
    }

    #[test]
    fn bound_admits_any_shape_at_its_version() {
        let bound = CheckpointInstance::at(3);
        assert!(CheckpointInstance { version: 3, parts: Some(8) }.is_not_later_than(&bound));
        assert!(CheckpointInstance { version: 3, parts: None }.is_not_later_than(&bound));
        assert!(!CheckpointInstance { version: 4, parts: None }.is_not_later_than(&bound));
    }

    #[test]
    fn picks_latest_complete() {
        let files = vec![
            checkpoint_file(2),
            part_file(5, 1, 2),
            part_file(5, 2, 2),
            checkpoint_file(7),
        ];
        let found = latest_complete(&files, CheckpointInstance::MAX).unwrap();
        assert_eq!(found.instance.version, 7);
    }

    #[test]
    fn incomplete_multipart_is_skipped() {
        let files = vec![checkpoint_file(2), part_file(5, 1, 2)];
        let found = latest_complete(&files, CheckpointInstance::MAX).unwrap();
        assert_eq!(found.instance.version, 2);
    }

    #[test]
    fn respects_version_bound() {
        let files = vec![checkpoint_file(2), checkpoint_file(7)];
        let found = latest_complete(&files, CheckpointInstance::at(5)).unwrap();
        assert_eq!(found.instance.version, 2);

        assert!(latest_complete(&files, CheckpointInstance::at(1)).is_none());
    }

    #[test]
    fn multipart_files_returned_in_part_order() {
        let files = vec![part_file(5, 1, 2), part_file(5, 2, 2)];
        let found = latest_complete(&files, CheckpointInstance::MAX).unwrap();
        let parts: Vec<u32> = found
            .files
            .iter()
            .map(|f| match f.kind {
                LogFileKind::CheckpointPart { part, .. } => part,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(parts, vec![1, 2]);
    }

    #[test]
    fn shard_without_its_first_part_is_incomplete() {
        // Part 2 listed with no part 1 ahead of it never forms a group.
        let files = vec![checkpoint_file(2), part_file(5, 2, 2)];
        let found = latest_complete(&files, CheckpointInstance::MAX).unwrap();
        assert_eq!(found.instance.version, 2);
    }

    #[test]
    fn multipart_preferred_over_single_at_same_version() {
        let files = vec![checkpoint_file(5), part_file(5, 1, 2), part_file(5, 2, 2)];
        let found = latest_complete(&files, CheckpointInstance::MAX).unwrap();
        assert_eq!(found.instance.parts, Some(2));
        assert_eq!(found.files.len(), 2);
    }

    #[test]
    fn duplicate_parts_do_not_fake_completeness() {
        // Two copies of part 1 must not count as parts 1 and 2.
        let files = vec![part_file(5, 1, 2), part_file(5, 1, 2)];
        assert!(latest_complete(&files, CheckpointInstance::MAX).is_none());
    }
}
