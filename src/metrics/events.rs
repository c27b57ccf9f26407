//! Internal events for floe metrics emission.
//!
//! Each event struct represents a measurable occurrence in the snapshot
//! lifecycle. Events implement the `InternalEvent` trait which emits the
//! corresponding metric.
//!
//! ## Table Labels
//!
//! For multi-table deployments, metrics include a `table` label to enable
//! per-table observability (e.g., `"events"`, `"users"`).

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tracing::trace;

use crate::log::Version;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when a snapshot is materialized from a log segment.
pub struct SnapshotLoaded {
    /// Table label for multi-table deployments.
    pub table: String,
    /// Version the snapshot reconstructs.
    pub version: Version,
    pub duration: Duration,
}

impl InternalEvent for SnapshotLoaded {
    fn emit(self) {
        trace!(
            table = %self.table,
            version = self.version,
            duration_ms = self.duration.as_millis(),
            "Snapshot loaded"
        );
        histogram!("floe_snapshot_load_duration_seconds", "table" => self.table.clone())
            .record(self.duration.as_secs_f64());
        gauge!("floe_snapshot_version", "table" => self.table).set(self.version as f64);
    }
}

/// Event emitted when a refresh finds the directory unchanged and keeps the
/// current snapshot.
pub struct SnapshotUpdateSkipped {
    /// Table label for multi-table deployments.
    pub table: String,
}

impl InternalEvent for SnapshotUpdateSkipped {
    fn emit(self) {
        trace!(table = %self.table, "Snapshot update skipped");
        counter!("floe_snapshot_update_skipped_total", "table" => self.table).increment(1);
    }
}

/// Event emitted when a refresh is deferred to a background task and the
/// caller is served the current snapshot.
pub struct BackgroundRefreshScheduled {
    /// Table label for multi-table deployments.
    pub table: String,
}

impl InternalEvent for BackgroundRefreshScheduled {
    fn emit(self) {
        trace!(table = %self.table, "Background refresh scheduled");
        counter!("floe_background_refresh_scheduled_total", "table" => self.table).increment(1);
    }
}

/// Event emitted when snapshot construction falls back to an earlier
/// checkpoint after a decode failure.
pub struct CheckpointFallback {
    /// Table label for multi-table deployments.
    pub table: String,
    /// Version of the checkpoint that failed to decode.
    pub checkpoint_version: Version,
}

impl InternalEvent for CheckpointFallback {
    fn emit(self) {
        trace!(
            table = %self.table,
            checkpoint_version = self.checkpoint_version,
            "Checkpoint fallback"
        );
        counter!("floe_checkpoint_fallback_total", "table" => self.table).increment(1);
    }
}

/// Event emitted when a refresh observes a different table identity than
/// the published snapshot. The refreshed snapshot is still published; this
/// event is the only record of the identity change.
pub struct TableIdentityChanged {
    /// Table label for multi-table deployments.
    pub table: String,
}

impl InternalEvent for TableIdentityChanged {
    fn emit(self) {
        trace!(table = %self.table, "Table identity changed");
        counter!("floe_table_identity_changed_total", "table" => self.table).increment(1);
    }
}

/// Event emitted when the log directory vanishes and the cache resets to
/// the uninitialized snapshot.
pub struct TableReset {
    /// Table label for multi-table deployments.
    pub table: String,
}

impl InternalEvent for TableReset {
    fn emit(self) {
        trace!(table = %self.table, "Table reset to uninitialized");
        counter!("floe_table_reset_total", "table" => self.table).increment(1);
    }
}
