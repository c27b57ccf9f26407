//! The metadata action set carried by commit files.
//!
//! Each line of a commit file is one serialized [`Action`]; replaying a
//! version means applying its actions, in order, to a
//! [`TableMetadataBuilder`]. Checkpoint files carry the same actions in
//! Parquet form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    PartitionSpecDef, SchemaDef, SnapshotEntry, SortOrderDef, TableMetadataBuilder,
};

/// A single metadata mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum Action {
    /// Assign the table identity. Written once, by the commit that creates
    /// the table.
    AssignUuid { uuid: Uuid },
    /// Raise the table format version.
    UpgradeFormatVersion { format_version: i32 },
    /// Register a schema definition.
    AddSchema { schema: SchemaDef, last_column_id: i32 },
    /// Select the current schema; `-1` means the most recently added.
    SetCurrentSchema { schema_id: i32 },
    /// Register a partition spec.
    AddPartitionSpec { spec: PartitionSpecDef },
    /// Select the default partition spec; `-1` means the most recently added.
    SetDefaultPartitionSpec { spec_id: i32 },
    /// Register a sort order.
    AddSortOrder { sort_order: SortOrderDef },
    /// Select the default sort order; `-1` means the most recently added.
    SetDefaultSortOrder { sort_order_id: i32 },
    /// Record a new data snapshot.
    AddSnapshot { snapshot: SnapshotEntry },
    /// Drop a data snapshot and any refs naming it.
    RemoveSnapshot { snapshot_id: i64 },
    /// Point a named ref at a data snapshot.
    SetSnapshotRef { name: String, snapshot_id: i64 },
    /// Drop a named ref.
    RemoveSnapshotRef { name: String },
    /// Upsert table properties.
    SetProperties { updates: BTreeMap<String, String> },
    /// Remove table properties.
    RemoveProperties { removals: Vec<String> },
    /// Move the table root.
    SetLocation { location: String },
}

impl Action {
    /// Apply this action to the metadata under construction.
    pub fn apply(self, builder: &mut TableMetadataBuilder) {
        match self {
            Action::AssignUuid { uuid } => builder.assign_uuid(uuid),
            Action::UpgradeFormatVersion { format_version } => {
                builder.upgrade_format_version(format_version);
            }
            Action::AddSchema { schema, .. } => builder.add_schema(schema),
            Action::SetCurrentSchema { schema_id } => builder.set_current_schema(schema_id),
            Action::AddPartitionSpec { spec } => builder.add_partition_spec(spec),
            Action::SetDefaultPartitionSpec { spec_id } => {
                builder.set_default_partition_spec(spec_id);
            }
            Action::AddSortOrder { sort_order } => builder.add_sort_order(sort_order),
            Action::SetDefaultSortOrder { sort_order_id } => {
                builder.set_default_sort_order(sort_order_id);
            }
            Action::AddSnapshot { snapshot } => builder.add_snapshot(snapshot),
            Action::RemoveSnapshot { snapshot_id } => builder.remove_snapshot(snapshot_id),
            Action::SetSnapshotRef { name, snapshot_id } => {
                builder.set_snapshot_ref(name, snapshot_id);
            }
            Action::RemoveSnapshotRef { name } => builder.remove_snapshot_ref(&name),
            Action::SetProperties { updates } => builder.set_properties(updates),
            Action::RemoveProperties { removals } => builder.remove_properties(&removals),
            Action::SetLocation { location } => builder.set_location(location),
        }
    }
}
