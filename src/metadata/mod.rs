//! Table metadata reconstructed by log replay.
//!
//! The snapshot core does not interpret schemas, partition specs, or sort
//! orders; their field lists are carried as opaque JSON for the planning
//! layers above. What it does own is the bookkeeping replay needs: which
//! definitions exist, which are current, and the table identity.

pub mod actions;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use actions::Action;

/// Table property naming how long (in milliseconds) removed data files stay
/// referenceable before cleanup may collect them.
pub const FILE_RETENTION_DURATION_PROP: &str = "retention.fileDeletionDuration";

/// Default file retention: 7 days.
pub const DEFAULT_FILE_RETENTION_MILLIS: i64 = 7 * 24 * 60 * 60 * 1000;

/// A schema definition. Field structure is opaque to the snapshot core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchemaDef {
    pub schema_id: i32,
    pub fields: serde_json::Value,
}

/// A partition spec definition. Field structure is opaque to the snapshot core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpecDef {
    pub spec_id: i32,
    pub fields: serde_json::Value,
}

/// A sort order definition. Field structure is opaque to the snapshot core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SortOrderDef {
    pub order_id: i32,
    pub fields: serde_json::Value,
}

/// One data snapshot recorded in table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SnapshotEntry {
    pub snapshot_id: i64,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_list: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub summary: BTreeMap<String, String>,
}

/// Reader-facing format requirements of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Protocol {
    pub format_version: i32,
}

/// Materialized table metadata at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    /// Stable table identity, assigned at table creation. `None` only for
    /// an uninitialized table.
    pub table_id: Option<Uuid>,
    pub format_version: i32,
    pub location: Option<String>,
    pub schemas: Vec<SchemaDef>,
    pub current_schema_id: Option<i32>,
    pub partition_specs: Vec<PartitionSpecDef>,
    pub default_spec_id: Option<i32>,
    pub sort_orders: Vec<SortOrderDef>,
    pub default_sort_order_id: Option<i32>,
    pub snapshots: Vec<SnapshotEntry>,
    pub refs: BTreeMap<String, i64>,
    pub properties: BTreeMap<String, String>,
}

impl Default for TableMetadata {
    fn default() -> Self {
        Self {
            table_id: None,
            format_version: 1,
            location: None,
            schemas: Vec::new(),
            current_schema_id: None,
            partition_specs: Vec::new(),
            default_spec_id: None,
            sort_orders: Vec::new(),
            default_sort_order_id: None,
            snapshots: Vec::new(),
            refs: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }
}

impl TableMetadata {
    /// The protocol view of this metadata.
    pub fn protocol(&self) -> Protocol {
        Protocol {
            format_version: self.format_version,
        }
    }

    /// Configured file retention window in milliseconds.
    pub fn file_retention_millis(&self) -> i64 {
        self.properties
            .get(FILE_RETENTION_DURATION_PROP)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_FILE_RETENTION_MILLIS)
    }
}

/// Accumulates metadata mutations during replay.
///
/// Application is deliberately lenient: replay of a log the writer already
/// committed must not fail on semantic oddities, so unknown ids are applied
/// as-is and duplicate definitions replace their predecessors.
#[derive(Debug, Default)]
pub struct TableMetadataBuilder {
    metadata: TableMetadata,
}

impl TableMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume building from existing metadata (checkpoint state).
    pub fn from_metadata(metadata: TableMetadata) -> Self {
        Self { metadata }
    }

    pub fn assign_uuid(&mut self, uuid: Uuid) {
        self.metadata.table_id = Some(uuid);
    }

    /// Format upgrades are monotone; a replayed downgrade is ignored.
    pub fn upgrade_format_version(&mut self, format_version: i32) {
        if format_version > self.metadata.format_version {
            self.metadata.format_version = format_version;
        }
    }

    pub fn add_schema(&mut self, schema: SchemaDef) {
        self.metadata.schemas.retain(|s| s.schema_id != schema.schema_id);
        self.metadata.schemas.push(schema);
    }

    /// `-1` selects the most recently added schema.
    pub fn set_current_schema(&mut self, schema_id: i32) {
        self.metadata.current_schema_id = if schema_id == -1 {
            self.metadata.schemas.last().map(|s| s.schema_id)
        } else {
            Some(schema_id)
        };
    }

    pub fn add_partition_spec(&mut self, spec: PartitionSpecDef) {
        self.metadata.partition_specs.retain(|s| s.spec_id != spec.spec_id);
        self.metadata.partition_specs.push(spec);
    }

    /// `-1` selects the most recently added spec.
    pub fn set_default_partition_spec(&mut self, spec_id: i32) {
        self.metadata.default_spec_id = if spec_id == -1 {
            self.metadata.partition_specs.last().map(|s| s.spec_id)
        } else {
            Some(spec_id)
        };
    }

    pub fn add_sort_order(&mut self, sort_order: SortOrderDef) {
        self.metadata.sort_orders.retain(|s| s.order_id != sort_order.order_id);
        self.metadata.sort_orders.push(sort_order);
    }

    /// `-1` selects the most recently added sort order.
    pub fn set_default_sort_order(&mut self, sort_order_id: i32) {
        self.metadata.default_sort_order_id = if sort_order_id == -1 {
            self.metadata.sort_orders.last().map(|s| s.order_id)
        } else {
            Some(sort_order_id)
        };
    }

    pub fn add_snapshot(&mut self, snapshot: SnapshotEntry) {
        self.metadata
            .snapshots
            .retain(|s| s.snapshot_id != snapshot.snapshot_id);
        self.metadata.snapshots.push(snapshot);
    }

    pub fn remove_snapshot(&mut self, snapshot_id: i64) {
        self.metadata.snapshots.retain(|s| s.snapshot_id != snapshot_id);
        self.metadata.refs.retain(|_, id| *id != snapshot_id);
    }

    pub fn set_snapshot_ref(&mut self, name: String, snapshot_id: i64) {
        self.metadata.refs.insert(name, snapshot_id);
    }

    pub fn remove_snapshot_ref(&mut self, name: &str) {
        self.metadata.refs.remove(name);
    }

    pub fn set_properties(&mut self, updates: BTreeMap<String, String>) {
        self.metadata.properties.extend(updates);
    }

    pub fn remove_properties(&mut self, removals: &[String]) {
        for key in removals {
            self.metadata.properties.remove(key);
        }
    }

    pub fn set_location(&mut self, location: String) {
        self.metadata.location = Some(location);
    }

    pub fn build(self) -> TableMetadata {
        self.metadata
    }
}
