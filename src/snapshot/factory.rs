//! Snapshot construction from log segments.
//!
//! Replay reads the segment's checkpoint (Parquet, one serialized action per
//! row) and then its commit files (newline-delimited JSON) in version order,
//! applying every action to a [`TableMetadataBuilder`]. Checkpoint decode
//! failures are recoverable: construction retries on a segment rebuilt
//! around an earlier complete checkpoint, and the first failure is preserved
//! as the root cause if every retry fails.

use std::time::Instant;

use arrow::array::{Array, StringArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::{debug, warn};

use crate::config::SnapshotConfig;
use crate::emit;
use crate::error::{CheckpointCorruptionSnafu, ReplaySnafu, SnapshotError};
use crate::log::path::{self, LogFile};
use crate::log::{LogSegment, LogSegmentBuilder};
use crate::metadata::{Action, TableMetadata, TableMetadataBuilder};
use crate::metrics::events::{CheckpointFallback, SnapshotLoaded};
use crate::snapshot::{Snapshot, VersionChecksum};

/// Materializes [`Snapshot`]s from [`LogSegment`]s.
#[derive(Debug)]
pub struct SnapshotFactory {
    builder: LogSegmentBuilder,
    config: SnapshotConfig,
    /// Table identifier for logging and metrics labeling.
    table: String,
}

impl SnapshotFactory {
    pub fn new(builder: LogSegmentBuilder, config: SnapshotConfig, table: String) -> Self {
        Self {
            builder,
            config,
            table,
        }
    }

    pub fn builder(&self) -> &LogSegmentBuilder {
        &self.builder
    }

    /// Materialize a snapshot, retrying with equivalent segments when the
    /// checkpoint turns out to be unreadable.
    ///
    /// Each retry rebuilds the segment on the previous complete checkpoint
    /// below the one that failed. Retries stop when the budget is exhausted,
    /// when the segment has no checkpoint to fall back from, or when no
    /// equivalent segment exists; the error raised is always the first
    /// failure observed, which names the original corrupt file.
    pub async fn create_with_retry(
        &self,
        segment: LogSegment,
    ) -> Result<Snapshot, SnapshotError> {
        let mut segment = segment;
        let mut attempts_left = self.config.max_loading_retries;
        let mut first_error: Option<SnapshotError> = None;

        loop {
            let error = match self.create_snapshot(&segment).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(error) => error,
            };

            let failed_checkpoint = segment.checkpoint_version;
            let can_retry =
                error.is_checkpoint_corruption() && failed_checkpoint.is_some() && attempts_left > 0;

            if first_error.is_none() {
                first_error = Some(error);
            } else {
                debug!(table = %self.table, "Suppressing follow-up error: {error}");
            }

            if !can_retry {
                return Err(first_error.take().expect("first error recorded"));
            }
            attempts_left -= 1;

            let failed_checkpoint = failed_checkpoint.expect("checked above");
            warn!(
                table = %self.table,
                checkpoint_version = failed_checkpoint,
                attempts_left,
                "Checkpoint unreadable; rebuilding segment on an earlier checkpoint"
            );
            emit!(CheckpointFallback {
                table: self.table.clone(),
                checkpoint_version: failed_checkpoint,
            });

            match self
                .builder
                .build_with_exclusive_ceiling(segment.version, failed_checkpoint)
                .await
            {
                Ok(Some(equivalent)) => segment = equivalent,
                Ok(None) => return Err(first_error.take().expect("first error recorded")),
                Err(rebuild_error) => {
                    warn!(
                        table = %self.table,
                        "Segment rebuild failed during checkpoint fallback: {rebuild_error}"
                    );
                    return Err(first_error.take().expect("first error recorded"));
                }
            }
        }
    }

    /// Single construction attempt from the given segment.
    pub async fn create_snapshot(&self, segment: &LogSegment) -> Result<Snapshot, SnapshotError> {
        let start = Instant::now();
        let metadata = self.replay(segment).await?;
        let checksum = self.read_checksum(segment).await;

        emit!(SnapshotLoaded {
            table: self.table.clone(),
            version: segment.version,
            duration: start.elapsed(),
        });

        Ok(Snapshot::new(segment.clone(), metadata, checksum))
    }

    async fn replay(&self, segment: &LogSegment) -> Result<TableMetadata, SnapshotError> {
        let mut builder = TableMetadataBuilder::new();

        for file in &segment.checkpoint_files {
            for action in self.read_checkpoint_actions(file).await? {
                action.apply(&mut builder);
            }
        }

        for file in &segment.deltas {
            for action in self.read_commit_actions(file).await? {
                action.apply(&mut builder);
            }
        }

        Ok(builder.build())
    }

    /// Decode one checkpoint file. Every failure here, including the file
    /// having vanished since listing, classifies as checkpoint corruption
    /// so the retry protocol can recover on an earlier checkpoint.
    async fn read_checkpoint_actions(
        &self,
        file: &LogFile,
    ) -> Result<Vec<Action>, SnapshotError> {
        let path = file.path.to_string();
        let corruption = |message: String| {
            CheckpointCorruptionSnafu {
                path: path.clone(),
                message,
            }
            .build()
        };

        let bytes = self
            .builder
            .reader()
            .storage()
            .get(&file.path)
            .await
            .map_err(|e| corruption(e.to_string()))?;

        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .and_then(|b| b.build())
            .map_err(|e| corruption(e.to_string()))?;

        let mut actions = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| corruption(e.to_string()))?;
            let column = batch
                .column_by_name("action")
                .ok_or_else(|| corruption("missing action column".to_string()))?;
            let strings = column
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| corruption("action column is not utf8".to_string()))?;

            for row in 0..strings.len() {
                if strings.is_null(row) {
                    return Err(corruption(format!("null action at row {row}")));
                }
                let action = serde_json::from_str(strings.value(row))
                    .map_err(|e| corruption(format!("row {row}: {e}")))?;
                actions.push(action);
            }
        }

        Ok(actions)
    }

    /// Decode one commit file: one JSON action per non-empty line.
    async fn read_commit_actions(&self, file: &LogFile) -> Result<Vec<Action>, SnapshotError> {
        let path = file.path.to_string();

        let bytes = self
            .builder
            .reader()
            .storage()
            .get(&file.path)
            .await
            .map_err(|e| {
                ReplaySnafu {
                    path: path.clone(),
                    message: e.to_string(),
                }
                .build()
            })?;

        let text = std::str::from_utf8(&bytes).map_err(|e| {
            ReplaySnafu {
                path: path.clone(),
                message: e.to_string(),
            }
            .build()
        })?;

        let mut actions = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let action = serde_json::from_str(line).map_err(|e| {
                ReplaySnafu {
                    path: path.clone(),
                    message: format!("line {}: {e}", index + 1),
                }
                .build()
            })?;
            actions.push(action);
        }

        Ok(actions)
    }

    /// Read the advisory `.crc` sidecar for the segment version. Absent or
    /// undecodable sidecars are not an error.
    async fn read_checksum(&self, segment: &LogSegment) -> Option<VersionChecksum> {
        if segment.version < 0 {
            return None;
        }
        let reader = self.builder.reader();
        let sidecar = path::checksum_path(reader.log_path(), segment.version);

        let bytes = match reader.storage().get(&sidecar).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if !e.is_not_found() {
                    debug!(table = %self.table, "Failed to read {sidecar}: {e}");
                }
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(checksum) => Some(checksum),
            Err(e) => {
                warn!(table = %self.table, "Ignoring undecodable {sidecar}: {e}");
                None
            }
        }
    }
}
