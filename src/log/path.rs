//! Transaction log file naming.
//!
//! Commit and checkpoint files carry their version in a 20-digit
//! zero-padded decimal prefix so that lexicographic listing order matches
//! version order:
//!
//! - commits: `00000000000000000003.json`
//! - single checkpoints: `00000000000000000003.checkpoint.parquet`
//! - multi-part checkpoints:
//!   `00000000000000000003.checkpoint.0000000001.0000000002.parquet`

use chrono::{DateTime, Utc};
use object_store::ObjectMeta;
use object_store::path::Path;

/// A committed table version. `-1` is the pre-genesis sentinel used by the
/// uninitialized snapshot.
pub type Version = i64;

/// Name of the directory holding the transaction log, under the table root.
pub const LOG_DIR_NAME: &str = "_delta_log";

/// Name of the advisory pointer file naming the most recent checkpoint.
pub const LAST_CHECKPOINT_NAME: &str = "_last_checkpoint";

/// Classification of an entry in the log directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFileKind {
    /// A commit file holding the actions for one version.
    Commit,
    /// A single-file checkpoint.
    Checkpoint,
    /// One shard of a multi-part checkpoint.
    CheckpointPart { part: u32, total: u32 },
}

impl LogFileKind {
    /// True for both checkpoint shapes.
    pub fn is_checkpoint(&self) -> bool {
        !matches!(self, LogFileKind::Commit)
    }
}

/// A classified log directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub kind: LogFileKind,
    pub version: Version,
    pub path: Path,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

impl LogFile {
    /// Classify a listed entry; `None` for anything that is not a commit or
    /// checkpoint file (hint file, temp files, foreign objects).
    pub fn classify(meta: &ObjectMeta) -> Option<Self> {
        let name = meta.location.filename()?;
        let kind_and_version = parse_file_name(name)?;

        Some(Self {
            kind: kind_and_version.0,
            version: kind_and_version.1,
            path: meta.location.clone(),
            modified: meta.last_modified,
            size: meta.size,
        })
    }
}

/// Relative path of the commit file for `version`.
pub fn commit_path(log_path: &Path, version: Version) -> Path {
    log_path.child(format!("{version:020}.json"))
}

/// Relative path of the single-file checkpoint for `version`.
pub fn checkpoint_path(log_path: &Path, version: Version) -> Path {
    log_path.child(format!("{version:020}.checkpoint.parquet"))
}

/// Relative path of shard `part` of a `total`-part checkpoint for `version`.
pub fn checkpoint_part_path(log_path: &Path, version: Version, part: u32, total: u32) -> Path {
    log_path.child(format!(
        "{version:020}.checkpoint.{part:010}.{total:010}.parquet"
    ))
}

/// Relative path of the version checksum sidecar for `version`.
pub fn checksum_path(log_path: &Path, version: Version) -> Path {
    log_path.child(format!("{version:020}.crc"))
}

/// Relative path of the `_last_checkpoint` pointer file.
pub fn last_checkpoint_path(log_path: &Path) -> Path {
    log_path.child(LAST_CHECKPOINT_NAME)
}

/// Listing offset that sorts before every log file of `version` and after
/// every log file of earlier versions.
pub fn version_offset(log_path: &Path, version: Version) -> Path {
    log_path.child(format!("{version:020}"))
}

fn parse_version(digits: &str) -> Option<Version> {
    if digits.len() != 20 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_file_name(name: &str) -> Option<(LogFileKind, Version)> {
    if let Some(digits) = name.strip_suffix(".json") {
        return Some((LogFileKind::Commit, parse_version(digits)?));
    }

    let rest = name.strip_suffix(".parquet")?;
    let (digits, checkpoint_rest) = rest.split_once(".checkpoint")?;
    let version = parse_version(digits)?;

    if checkpoint_rest.is_empty() {
        return Some((LogFileKind::Checkpoint, version));
    }

    // Multi-part: ".PPPPPPPPPP.TTTTTTTTTT"
    let mut parts = checkpoint_rest.strip_prefix('.')?.split('.');
    let part = parse_part(parts.next()?)?;
    let total = parse_part(parts.next()?)?;
    if parts.next().is_some() || part == 0 || part > total {
        return None;
    }

    Some((LogFileKind::CheckpointPart { part, total }, version))
}

fn parse_part(digits: &str) -> Option<u32> {
    if digits.len() != 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
