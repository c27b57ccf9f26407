//! Transaction log reconstruction.
//!
//! This module turns a directory of commit and checkpoint files into
//! [`LogSegment`]s, the ordered file manifests that replay reconstructs
//! snapshots from.

pub mod checkpoint;
pub mod path;
pub mod reader;
pub mod segment;

pub use checkpoint::{CheckpointInstance, CompleteCheckpoint, LastCheckpointHint};
pub use path::{LogFile, LogFileKind, Version};
pub use reader::{LogDirectoryReader, LogListing};
pub use segment::{LogSegment, LogSegmentBuilder};
