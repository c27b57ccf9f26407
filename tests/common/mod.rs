//! Shared harness for seeding transaction log directories.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::StringArray;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use object_store::path::Path;
use parquet::arrow::ArrowWriter;
use uuid::Uuid;

use floe::log::{LogDirectoryReader, LogSegmentBuilder, Version, path};
use floe::metadata::{Action, SchemaDef, SnapshotEntry};
use floe::storage::{StorageProvider, StorageProviderRef};

/// A seeded table directory backed by the in-memory store.
pub struct TestLog {
    pub storage: StorageProviderRef,
    pub log_path: Path,
}

#[allow(dead_code)]
impl TestLog {
    pub async fn new() -> Self {
        let storage = Arc::new(StorageProvider::for_url("memory://table").await.unwrap());
        Self {
            storage,
            log_path: Path::from(path::LOG_DIR_NAME),
        }
    }

    pub fn reader(&self) -> LogDirectoryReader {
        LogDirectoryReader::new(self.storage.clone(), self.log_path.clone(), "test".to_string())
    }

    pub fn builder(&self) -> LogSegmentBuilder {
        LogSegmentBuilder::new(self.reader())
    }

    /// Write the commit file for `version`, one action per line.
    pub async fn write_commit(&self, version: Version, actions: &[Action]) {
        let mut body = String::new();
        for action in actions {
            body.push_str(&serde_json::to_string(action).unwrap());
            body.push('\n');
        }
        self.storage
            .put(&path::commit_path(&self.log_path, version), body.into_bytes())
            .await
            .unwrap();
    }

    /// Write a single-file checkpoint for `version`.
    pub async fn write_checkpoint(&self, version: Version, actions: &[Action]) {
        self.storage
            .put(
                &path::checkpoint_path(&self.log_path, version),
                checkpoint_bytes(actions),
            )
            .await
            .unwrap();
    }

    /// Write one shard of a multi-part checkpoint.
    pub async fn write_checkpoint_part(
        &self,
        version: Version,
        part: u32,
        total: u32,
        actions: &[Action],
    ) {
        self.storage
            .put(
                &path::checkpoint_part_path(&self.log_path, version, part, total),
                checkpoint_bytes(actions),
            )
            .await
            .unwrap();
    }

    /// Overwrite a checkpoint file with bytes that are not Parquet.
    pub async fn corrupt_checkpoint(&self, version: Version) {
        self.storage
            .put(
                &path::checkpoint_path(&self.log_path, version),
                b"not parquet at all".to_vec(),
            )
            .await
            .unwrap();
    }

    pub async fn write_last_checkpoint(&self, version: Version, parts: Option<u32>) {
        let hint = match parts {
            Some(parts) => {
                serde_json::json!({"version": version, "size": 1, "parts": parts})
            }
            None => serde_json::json!({"version": version, "size": 1}),
        };
        self.storage
            .put(
                &path::last_checkpoint_path(&self.log_path),
                serde_json::to_vec(&hint).unwrap(),
            )
            .await
            .unwrap();
    }

    pub async fn write_checksum(&self, version: Version, table_size_bytes: i64, num_files: i64) {
        let checksum = serde_json::json!({
            "tableSizeBytes": table_size_bytes,
            "numFiles": num_files,
            "numMetadata": 1,
            "numProtocol": 1,
        });
        self.storage
            .put(
                &path::checksum_path(&self.log_path, version),
                serde_json::to_vec(&checksum).unwrap(),
            )
            .await
            .unwrap();
    }

    pub async fn delete_commit(&self, version: Version) {
        self.storage
            .delete(&path::commit_path(&self.log_path, version))
            .await
            .unwrap();
    }

    pub async fn delete_checkpoint_part(&self, version: Version, part: u32, total: u32) {
        self.storage
            .delete(&path::checkpoint_part_path(&self.log_path, version, part, total))
            .await
            .unwrap();
    }

    /// Delete every object under the table root, simulating `rm -rf`.
    pub async fn delete_everything(&self) {
        let listing = self
            .storage
            .list_from(&self.log_path, &Path::from(path::LOG_DIR_NAME))
            .await
            .unwrap();
        for meta in listing {
            self.storage.delete(&meta.location).await.unwrap();
        }
    }

    /// Seed a linear table: a creation commit at version 0 followed by one
    /// data snapshot per version up to `last_version`. Returns the table id.
    pub async fn seed_linear(&self, last_version: Version) -> Uuid {
        let uuid = Uuid::new_v4();
        self.write_commit(0, &creation_actions(uuid)).await;
        for version in 1..=last_version {
            self.write_commit(version, &[data_snapshot_action(version)]).await;
        }
        uuid
    }
}

/// The standard table-creation action sequence.
pub fn creation_actions(uuid: Uuid) -> Vec<Action> {
    vec![
        Action::AssignUuid { uuid },
        Action::UpgradeFormatVersion { format_version: 2 },
        Action::AddSchema {
            schema: SchemaDef {
                schema_id: 0,
                fields: serde_json::json!([{"name": "id", "type": "long"}]),
            },
            last_column_id: 1,
        },
        Action::SetCurrentSchema { schema_id: -1 },
    ]
}

/// An `add-snapshot` action whose id encodes the version it was written at.
pub fn data_snapshot_action(version: Version) -> Action {
    Action::AddSnapshot {
        snapshot: SnapshotEntry {
            snapshot_id: version,
            timestamp_ms: version * 1_000,
            manifest_list: None,
            summary: BTreeMap::new(),
        },
    }
}

/// Encode actions as a single-column Parquet checkpoint payload.
pub fn checkpoint_bytes(actions: &[Action]) -> Vec<u8> {
    let schema = Arc::new(Schema::new(vec![Field::new(
        "action",
        DataType::Utf8,
        false,
    )]));
    let rows: Vec<String> = actions
        .iter()
        .map(|a| serde_json::to_string(a).unwrap())
        .collect();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(StringArray::from(rows))],
    )
    .unwrap();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    buf
}
