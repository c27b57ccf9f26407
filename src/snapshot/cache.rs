//! The snapshot cache: one current snapshot per table, refreshed on demand.
//!
//! Reads (`snapshot()`) never block on refreshes. Updates serialize through
//! a single update lock; a caller that tolerates staleness gets the current
//! snapshot back immediately while a background task refreshes. The cache
//! only ever publishes consistent snapshots: a failed refresh leaves the
//! previous one in place.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use object_store::path::Path;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SnapshotConfig;
use crate::emit;
use crate::error::SnapshotError;
use crate::log::checkpoint::{self, CheckpointInstance};
use crate::log::path::LOG_DIR_NAME;
use crate::log::{LogDirectoryReader, LogSegmentBuilder, Version};
use crate::metrics::events::{
    BackgroundRefreshScheduled, SnapshotUpdateSkipped, TableIdentityChanged, TableReset,
};
use crate::snapshot::{Snapshot, SnapshotFactory};
use crate::storage::StorageProviderRef;

/// A reference-counted snapshot cache.
pub type SnapshotCacheRef = Arc<SnapshotCache>;

/// Holds the current [`Snapshot`] for one table and arbitrates refreshes.
#[derive(Debug)]
pub struct SnapshotCache {
    factory: SnapshotFactory,
    config: SnapshotConfig,
    /// Table identifier for logging and metrics labeling.
    table: String,
    /// The published snapshot. Write-locked only for the instant of
    /// publication; readers clone the `Arc` and go.
    current: RwLock<Arc<Snapshot>>,
    /// Millisecond timestamp of the last successful load or refresh.
    last_update_timestamp: AtomicI64,
    /// Serializes refreshes. Held across the listing and replay I/O of one
    /// refresh.
    update_lock: Mutex<()>,
    /// At most one in-flight background refresh. A stale read here can
    /// double-spawn; the loser finds the update lock held and backs off.
    background_task: StdMutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl SnapshotCache {
    /// Open the cache for the table rooted at `storage`, loading the initial
    /// snapshot.
    ///
    /// A table whose log directory does not exist yet yields the
    /// uninitialized snapshot (version `-1`); an existing but unreadable log
    /// is an error.
    pub async fn open(
        storage: StorageProviderRef,
        table: String,
        config: SnapshotConfig,
    ) -> Result<SnapshotCacheRef, SnapshotError> {
        let log_path = Path::from(LOG_DIR_NAME);
        let reader = LogDirectoryReader::new(storage, log_path.clone(), table.clone());
        let builder = LogSegmentBuilder::new(reader);
        let factory = SnapshotFactory::new(builder, config.clone(), table.clone());

        let snapshot = Self::load_initial(&factory, &log_path, &table).await?;
        info!(
            table = %table,
            version = snapshot.version(),
            "Loaded initial snapshot"
        );

        let cache = Arc::new(Self {
            factory,
            config,
            table,
            current: RwLock::new(Arc::new(snapshot)),
            last_update_timestamp: AtomicI64::new(Utc::now().timestamp_millis()),
            update_lock: Mutex::new(()),
            background_task: StdMutex::new(None),
            cancel: CancellationToken::new(),
        });
        Ok(cache)
    }

    async fn load_initial(
        factory: &SnapshotFactory,
        log_path: &Path,
        table: &str,
    ) -> Result<Snapshot, SnapshotError> {
        let reader = factory.builder().reader();
        let hint = reader.read_last_checkpoint().await.map(|h| h.version);

        let segment = match factory.builder().build(hint, None).await {
            Ok(segment) => segment,
            Err(e) if e.is_directory_vanished() => {
                debug!(table = %table, "No log directory; starting uninitialized");
                return Ok(Snapshot::initial(log_path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        factory.create_with_retry(segment).await
    }

    /// The current snapshot, without refreshing.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    /// Request the cancellation of in-flight and future updates. Callers
    /// blocked on the update lock return [`SnapshotError::Cancelled`];
    /// interrupted background refreshes leave the current snapshot unchanged.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Refresh the cached snapshot from the log directory.
    ///
    /// With `staleness_acceptable` and a cache younger than the configured
    /// staleness limit, the refresh runs on a background task and the
    /// current snapshot is returned immediately. Otherwise the caller
    /// refreshes synchronously, serialized behind the update lock.
    pub async fn update(
        self: &Arc<Self>,
        staleness_acceptable: bool,
    ) -> Result<Arc<Snapshot>, SnapshotError> {
        let do_async = staleness_acceptable && !self.is_stale();

        if !do_async {
            let _guard = self.lock_interruptibly().await?;
            return self.update_internal(false).await;
        }

        self.spawn_background_refresh();
        Ok(self.snapshot().await)
    }

    /// Point-in-time snapshot at `version`, built without touching the
    /// cached state.
    ///
    /// `commit_ts_hint`, when the caller tracked the commit time of
    /// `version` itself, pins the segment timestamp instead of trusting a
    /// re-listed modification time. `checkpoint_hint` short-circuits the
    /// backward checkpoint search when it is usable for `version`.
    pub async fn get_snapshot_at(
        &self,
        version: Version,
        commit_ts_hint: Option<DateTime<Utc>>,
        checkpoint_hint: Option<CheckpointInstance>,
    ) -> Result<Arc<Snapshot>, SnapshotError> {
        let current = self.snapshot().await;
        if current.version() == version {
            return Ok(current);
        }

        let reader = self.factory.builder().reader();
        let start_checkpoint = match checkpoint_hint {
            Some(hint) if hint.version <= version => Some(hint.version),
            _ => checkpoint::find_last_complete_checkpoint(reader, version)
                .await
                .map_err(SnapshotError::from)?
                .map(|cp| cp.instance.version),
        };

        let mut segment = self
            .factory
            .builder()
            .build(start_checkpoint, Some(version))
            .await?;
        if let Some(ts) = commit_ts_hint {
            segment.last_commit_timestamp = ts;
        }

        let snapshot = self.factory.create_with_retry(segment).await?;
        Ok(Arc::new(snapshot))
    }

    /// True when the cache is old enough that callers must not be handed
    /// the current snapshot without a synchronous refresh.
    fn is_stale(&self) -> bool {
        let limit = self.config.staleness_limit_ms;
        if limit == 0 {
            return true;
        }
        let last = self.last_update_timestamp.load(Ordering::Acquire);
        if last < 0 {
            return true;
        }
        Utc::now().timestamp_millis() - last >= limit as i64
    }

    async fn lock_interruptibly(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, SnapshotError> {
        if self.cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }
        tokio::select! {
            guard = self.update_lock.lock() => Ok(guard),
            _ = self.cancel.cancelled() => Err(SnapshotError::Cancelled),
        }
    }

    /// Kick off a background refresh unless one is already in flight.
    fn spawn_background_refresh(self: &Arc<Self>) {
        let mut slot = self
            .background_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let idle = slot.as_ref().is_none_or(|task| task.is_finished());
        if !idle {
            return;
        }

        emit!(BackgroundRefreshScheduled {
            table: self.table.clone(),
        });
        let cache = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            tokio::select! {
                _ = cache.cancel.cancelled() => {}
                _ = cache.try_update() => {}
            }
        }));
    }

    /// Non-blocking refresh: runs only if the update lock is free.
    ///
    /// Failures are logged and swallowed; a background worker must not
    /// crash, and the next synchronous update re-raises an equivalent error.
    async fn try_update(&self) {
        let Ok(_guard) = self.update_lock.try_lock() else {
            debug!(table = %self.table, "Skipping refresh; another updater is active");
            return;
        };

        if let Err(e) = self.update_internal(true).await {
            warn!(table = %self.table, "Background snapshot refresh failed: {e}");
        }
    }

    /// One refresh pass. The caller must hold the update lock.
    async fn update_internal(&self, is_async: bool) -> Result<Arc<Snapshot>, SnapshotError> {
        let current = self.snapshot().await;

        let refreshed = self.rebuild(&current).await;
        let snapshot = match refreshed {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_directory_vanished() => {
                // The whole log directory was deleted underneath us; the
                // table is back to its uninitialized state.
                warn!(table = %self.table, "Log directory vanished; resetting to uninitialized");
                emit!(TableReset {
                    table: self.table.clone(),
                });
                let log_path = self.factory.builder().reader().log_path().clone();
                let initial = Arc::new(Snapshot::initial(log_path));
                self.publish(initial.clone()).await;
                initial
            }
            Err(e) => return Err(e),
        };

        self.last_update_timestamp
            .store(Utc::now().timestamp_millis(), Ordering::Release);
        debug!(
            table = %self.table,
            version = snapshot.version(),
            is_async,
            "Snapshot refresh complete"
        );
        Ok(snapshot)
    }

    /// Rebuild against the live directory, reusing the current snapshot when
    /// nothing changed.
    async fn rebuild(&self, current: &Arc<Snapshot>) -> Result<Arc<Snapshot>, SnapshotError> {
        let segment = self
            .factory
            .builder()
            .build(current.log_segment().checkpoint_version, None)
            .await?;

        if segment == *current.log_segment() {
            // Same directory state; nothing to replay.
            emit!(SnapshotUpdateSkipped {
                table: self.table.clone(),
            });
            return Ok(current.clone());
        }

        let snapshot = Arc::new(self.factory.create_with_retry(segment).await?);

        if current.version() >= 0
            && let (Some(old_id), Some(new_id)) = (current.table_id(), snapshot.table_id())
            && old_id != new_id
        {
            // A recreated directory is operationally legitimate; observe it
            // and publish anyway.
            warn!(
                table = %self.table,
                %old_id,
                %new_id,
                "Table identity changed across refresh"
            );
            emit!(TableIdentityChanged {
                table: self.table.clone(),
            });
        }

        self.publish(snapshot.clone()).await;
        Ok(snapshot)
    }

    async fn publish(&self, snapshot: Arc<Snapshot>) {
        let mut current = self.current.write().await;
        *current = snapshot;
    }
}
