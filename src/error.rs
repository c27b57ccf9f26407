//! Error types for floe using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

use crate::log::Version;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            StorageError::Io { source } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// An option value could not be parsed as an integer.
    #[snafu(display("Invalid value {value:?} for option {key}"))]
    InvalidOptionValue { key: String, value: String },
}

// ============ Log Errors ============

/// Errors raised while reconstructing table state from the transaction log.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LogError {
    /// The log directory exists but contains no log files.
    #[snafu(display("No commit or checkpoint files found in log directory {log_path}"))]
    EmptyDirectory { log_path: String },

    /// A commit file expected by the contiguity check is absent.
    #[snafu(display("Commit file for version {version} is missing from the log"))]
    MissingVersion { version: Version },

    /// Commit versions do not form a strict consecutive range.
    #[snafu(display(
        "Commit versions are not contiguous: expected {expected}, found {found}"
    ))]
    NonContiguousVersions { expected: Version, found: Version },

    /// A multi-part checkpoint is missing shards and no earlier complete
    /// checkpoint could be used instead.
    #[snafu(display("Checkpoint at version {version} is missing parts and no complete fallback exists"))]
    MissingCheckpointParts { version: Version },

    /// Internal invariant violation: the listing implied a state the log
    /// format does not allow.
    #[snafu(display("Illegal log state: {message}"))]
    IllegalLogState { message: String },

    /// Underlying storage failure while listing or reading the log.
    #[snafu(display("Log storage error: {source}"))]
    LogStorage { source: StorageError },
}

impl LogError {
    /// True when the error is a storage "not found" raised by the listing
    /// layer, i.e. the log directory itself vanished. A not-found raised
    /// while replaying an individual file surfaces as
    /// [`SnapshotError::Replay`] instead and is not a vanished directory.
    pub fn is_directory_vanished(&self) -> bool {
        matches!(self, LogError::LogStorage { source } if source.is_not_found())
    }
}

// ============ Snapshot Errors ============

/// Errors raised while materializing or refreshing snapshots.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SnapshotError {
    /// Log reconstruction failed.
    #[snafu(display("Log reconstruction failed: {source}"))]
    Log { source: LogError },

    /// A checkpoint file could not be decoded. Recoverable: the factory
    /// retries with a segment built on an earlier complete checkpoint.
    #[snafu(display("Corrupt checkpoint file {path}: {message}"))]
    CheckpointCorruption { path: String, message: String },

    /// A commit file could not be read or decoded during replay.
    #[snafu(display("Failed to replay commit file {path}: {message}"))]
    Replay { path: String, message: String },

    /// The caller was cancelled while waiting for the update lock.
    #[snafu(display("Snapshot update cancelled"))]
    Cancelled,
}

impl From<LogError> for SnapshotError {
    fn from(source: LogError) -> Self {
        SnapshotError::Log { source }
    }
}

impl SnapshotError {
    /// True when the failure means the log directory itself is gone and the
    /// table should be treated as uninitialized.
    pub fn is_directory_vanished(&self) -> bool {
        matches!(self, SnapshotError::Log { source } if source.is_directory_vanished())
    }

    /// True for checkpoint decode failures, the only failure class the
    /// factory recovers from by rebuilding on an earlier checkpoint.
    pub fn is_checkpoint_corruption(&self) -> bool {
        matches!(self, SnapshotError::CheckpointCorruption { .. })
    }
}
