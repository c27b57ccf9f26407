//! floe: snapshot management core for a Delta-style transactional table log.
//!
//! A table is a directory whose `_delta_log/` subdirectory holds one JSON
//! commit file per version plus periodic Parquet checkpoints. This crate
//! computes the set of files required to materialize the table state at a
//! version, keeps a consistent in-memory snapshot of that state, and
//! refreshes it in the face of concurrent writers, checkpoint cleaners, and
//! directory recreation.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use floe::{SnapshotCache, SnapshotConfig, StorageProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(StorageProvider::for_url("/data/events").await?);
//!     let cache = SnapshotCache::open(storage, "events".into(), SnapshotConfig::default())
//!         .await?;
//!
//!     let snapshot = cache.update(false).await?;
//!     println!("table at version {}", snapshot.version());
//!     Ok(())
//! }
//! ```
//!
//! Writing commits, conflict detection, log cleanup, and checkpoint creation
//! are the writer's concern; this crate only reads.

pub mod config;
pub mod error;
pub mod log;
pub mod metadata;
pub mod metrics;
pub mod snapshot;
pub mod storage;

// Re-export main types
pub use config::SnapshotConfig;
pub use error::{LogError, SnapshotError, StorageError};
pub use log::{CheckpointInstance, LogSegment, LogSegmentBuilder, Version};
pub use metadata::{Action, TableMetadata};
pub use snapshot::{Snapshot, SnapshotCache, SnapshotCacheRef, SnapshotFactory};
pub use storage::{StorageProvider, StorageProviderRef};
