//! Schema diff engine.
//!
//! Compares an "old" and a "new" [`Snapshot`] and produces a
//! [`DatabaseDiff`]: the minimal structural delta between them. Tables and
//! fields are matched purely by name, so a rename shows up as a removal plus
//! an addition.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::schema::{
    AccessControl, Condition, DefaultValue, Field, FieldType, ForeignKey, Operation, Snapshot,
    Table,
};

// ================================================================
// Public types
// ================================================================

/// A from/to pair for one changed attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change<T> {
    /// Value in the old snapshot.
    pub from: T,
    /// Value in the new snapshot.
    pub to: T,
}

impl<T: PartialEq + Clone> Change<T> {
    /// Returns a change if `from` and `to` differ.
    fn between(from: &T, to: &T) -> Option<Self> {
        (from != to).then(|| Self {
            from: from.clone(),
            to: to.clone(),
        })
    }
}

/// Attribute changes of a field present in both snapshots.
///
/// Only the attributes that differ are set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldModification {
    /// Field name.
    pub name: String,
    /// Semantic type change.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<Change<FieldType>>,
    /// Nullability change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<Change<bool>>,
    /// Primary key flag change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Change<bool>>,
    /// Default value change; `None` on either side means no default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Change<Option<DefaultValue>>>,
    /// Foreign key change; `None` on either side means no foreign key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<Change<Option<ForeignKey>>>,
}

impl FieldModification {
    /// Returns `true` if no attribute changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.field_type.is_none()
            && self.nullable.is_none()
            && self.primary_key.is_none()
            && self.default.is_none()
            && self.foreign_key.is_none()
    }
}

/// Changes to a table present in both snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableModification {
    /// Table name.
    pub table: String,
    /// Fields only in the new snapshot.
    pub fields_added: Vec<Field>,
    /// Fields only in the old snapshot.
    pub fields_removed: Vec<Field>,
    /// Fields in both snapshots whose attributes differ.
    pub fields_modified: Vec<FieldModification>,
    /// Whether any access-control condition changed.
    pub access_control_changed: bool,
}

impl TableModification {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields_added.is_empty()
            && self.fields_removed.is_empty()
            && self.fields_modified.is_empty()
            && !self.access_control_changed
    }
}

/// Table-level delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableDiff {
    /// Tables only in the new snapshot, in new-snapshot order.
    pub added: Vec<Table>,
    /// Tables only in the old snapshot, in old-snapshot order.
    pub removed: Vec<Table>,
    /// Tables in both snapshots that changed, in new-snapshot order.
    pub modified: Vec<TableModification>,
}

impl TableDiff {
    /// Returns `true` if no table was added, removed or modified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Changed access-control conditions for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessControlChange {
    /// Table name.
    pub table: String,
    /// Read condition change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<Change<Condition>>,
    /// Create condition change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<Change<Condition>>,
    /// Update condition change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Change<Condition>>,
    /// Delete condition change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Change<Condition>>,
}

impl AccessControlChange {
    /// Records every operation of a table with no prior state, starting
    /// from the permissive default.
    #[must_use]
    pub fn from_default(table: &Table) -> Self {
        let from = Condition::default();
        let change = |to: &Condition| {
            Some(Change {
                from: from.clone(),
                to: to.clone(),
            })
        };
        let access = &table.access_control;
        Self {
            table: table.name.clone(),
            read: change(&access.read),
            create: change(&access.create),
            update: change(&access.update),
            delete: change(&access.delete),
        }
    }

    /// Records the operations whose conditions differ, or `None` if all match.
    fn between(table: &str, old: &AccessControl, new: &AccessControl) -> Option<Self> {
        let change = Self {
            table: table.to_string(),
            read: Change::between(&old.read, &new.read),
            create: Change::between(&old.create, &new.create),
            update: Change::between(&old.update, &new.update),
            delete: Change::between(&old.delete, &new.delete),
        };
        (!change.is_empty()).then_some(change)
    }

    /// Returns the change recorded for `op`.
    #[must_use]
    pub const fn get(&self, op: Operation) -> Option<&Change<Condition>> {
        match op {
            Operation::Read => self.read.as_ref(),
            Operation::Create => self.create.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
        }
    }

    /// Iterates over the changed operations in policy emission order.
    pub fn changes(&self) -> impl Iterator<Item = (Operation, &Change<Condition>)> {
        Operation::ALL
            .into_iter()
            .filter_map(|op| self.get(op).map(|change| (op, change)))
    }

    /// Returns `true` if no operation changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.read.is_none()
            && self.create.is_none()
            && self.update.is_none()
            && self.delete.is_none()
    }
}

/// Per-table access-control changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AccessControlDiff {
    /// Changed tables, in new-snapshot order.
    pub tables: Vec<AccessControlChange>,
}

impl AccessControlDiff {
    /// Returns `true` if no table's access control changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Looks up the change for a table.
    #[must_use]
    pub fn get(&self, table: &str) -> Option<&AccessControlChange> {
        self.tables.iter().find(|t| t.table == table)
    }
}

/// Result of comparing two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatabaseDiff {
    /// Table and field changes.
    pub tables: TableDiff,
    /// Access-control changes.
    pub access_control: AccessControlDiff,
}

impl DatabaseDiff {
    /// Returns `true` if there are no changes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.access_control.is_empty()
    }
}

// ================================================================
// Field-level diff
// ================================================================

/// Compares the attributes of a field present in both snapshots.
fn diff_field(old: &Field, new: &Field) -> Option<FieldModification> {
    let modification = FieldModification {
        name: new.name.clone(),
        field_type: Change::between(&old.field_type, &new.field_type),
        nullable: Change::between(&old.nullable, &new.nullable),
        primary_key: Change::between(&old.primary_key, &new.primary_key),
        default: Change::between(&old.default, &new.default),
        foreign_key: Change::between(&old.foreign_key, &new.foreign_key),
    };
    (!modification.is_empty()).then_some(modification)
}

// ================================================================
// Table-level diff
// ================================================================

/// Compares a table present in both snapshots. Returns `None` when the
/// table is unchanged.
fn diff_table(old: &Table, new: &Table, access_control_changed: bool) -> Option<TableModification> {
    let old_fields: BTreeMap<&str, &Field> =
        old.fields.iter().map(|f| (f.name.as_str(), f)).collect();
    let new_fields: BTreeMap<&str, &Field> =
        new.fields.iter().map(|f| (f.name.as_str(), f)).collect();

    let mut modification = TableModification {
        table: new.name.clone(),
        fields_added: Vec::new(),
        fields_removed: Vec::new(),
        fields_modified: Vec::new(),
        access_control_changed,
    };

    for field in &new.fields {
        match old_fields.get(field.name.as_str()) {
            None => modification.fields_added.push(field.clone()),
            Some(old_field) => {
                if let Some(change) = diff_field(old_field, field) {
                    modification.fields_modified.push(change);
                }
            }
        }
    }

    modification.fields_removed = old
        .fields
        .iter()
        .filter(|f| !new_fields.contains_key(f.name.as_str()))
        .cloned()
        .collect();

    if modification.is_empty() {
        return None;
    }

    debug!(
        table = %new.name,
        added = modification.fields_added.len(),
        removed = modification.fields_removed.len(),
        modified = modification.fields_modified.len(),
        access_control_changed,
        "table modified"
    );
    Some(modification)
}

// ================================================================
// Schema-level diff
// ================================================================

/// Compares two snapshots and produces the delta from `old` to `new`.
///
/// A table only present in `new` gets an access-control entry for all four
/// operations, starting from the permissive default, so that its policies
/// are created the same way a bootstrap creates them.
#[must_use]
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> DatabaseDiff {
    let old_tables: BTreeMap<&str, &Table> =
        old.tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let new_tables: BTreeMap<&str, &Table> =
        new.tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut diff = DatabaseDiff::default();

    // ---- Dropped tables ----------------------------------------
    for table in &old.tables {
        if !new_tables.contains_key(table.name.as_str()) {
            debug!(table = %table.name, "table removed");
            diff.tables.removed.push(table.clone());
        }
    }

    for table in &new.tables {
        match old_tables.get(table.name.as_str()) {
            // ---- New tables ------------------------------------
            None => {
                debug!(table = %table.name, "table added");
                diff.tables.added.push(table.clone());
                diff.access_control
                    .tables
                    .push(AccessControlChange::from_default(table));
            }
            // ---- Existing tables -------------------------------
            Some(old_table) => {
                let access = AccessControlChange::between(
                    &table.name,
                    &old_table.access_control,
                    &table.access_control,
                );
                if let Some(modification) = diff_table(old_table, table, access.is_some()) {
                    diff.tables.modified.push(modification);
                }
                if let Some(access) = access {
                    diff.access_control.tables.push(access);
                }
            }
        }
    }

    diff
}
