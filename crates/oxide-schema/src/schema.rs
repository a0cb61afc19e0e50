//! Schema snapshot types.
//!
//! A [`Snapshot`] is one immutable version of the declarative schema: an
//! ordered list of tables, each with typed fields and a per-operation
//! [`AccessControl`] block. Snapshots are usually read from JSON documents
//! and validated with [`Snapshot::validate`] before they are diffed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, SchemaError};
use crate::expr::Expr;

/// Semantic field types.
///
/// Unrecognised type names deserialize into [`FieldType::Other`] and map to
/// the text column type on every dialect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free-form text.
    Text,
    /// Numeric value.
    Number,
    /// Boolean.
    Boolean,
    /// Structured (JSON) object.
    Object,
    /// Calendar date.
    Date,
    /// Date and time with timezone.
    DateTime,
    /// Unique identifier.
    Uuid,
    /// Any type name this crate does not know about.
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::Object => f.write_str("object"),
            Self::Date => f.write_str("date"),
            Self::DateTime => f.write_str("datetime"),
            Self::Uuid => f.write_str("uuid"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Reject the delete/update while referencing rows exist.
    Restrict,
    /// Set the referencing field to NULL.
    SetNull,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub const fn to_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
        }
    }
}

/// A field-level foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referenced table.
    pub table: String,
    /// Referenced field.
    pub field: String,
    /// Action on delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ForeignKeyAction>,
    /// Action on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ForeignKeyAction>,
}

impl ForeignKey {
    /// Creates a foreign key to `table.field` without referential actions.
    #[must_use]
    pub fn new(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            field: field.into(),
            on_delete: None,
            on_update: None,
        }
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub const fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub const fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }
}

/// Default value for a field.
///
/// JSON scalars map onto the literal variants; objects are expression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Boolean(bool),
    /// Numeric default.
    Number(serde_json::Number),
    /// String default.
    Text(String),
    /// Computed default.
    Expression(Expr),
}

/// A declared default of `null` is a NULL default, not an absent one.
fn present_default<'de, D>(deserializer: D) -> std::result::Result<Option<DefaultValue>, D::Error>
where
    D: Deserializer<'de>,
{
    DefaultValue::deserialize(deserializer).map(Some)
}

const fn default_nullable() -> bool {
    true
}

/// Schema definition for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Semantic type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field allows NULL values.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Whether this field is the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Default value.
    #[serde(
        default,
        deserialize_with = "present_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<DefaultValue>,
    /// Foreign key reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

impl Field {
    /// Creates a nullable field.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            primary_key: false,
            default: None,
            foreign_key: None,
        }
    }

    /// Sets the field as NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the foreign key.
    #[must_use]
    pub fn references(mut self, fk: ForeignKey) -> Self {
        self.foreign_key = Some(fk);
        self
    }
}

/// An access-control condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Always allow (`true`) or always deny (`false`).
    Literal(bool),
    /// A boolean expression evaluated per row.
    Expr(Expr),
}

impl Default for Condition {
    fn default() -> Self {
        Self::Literal(true)
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Self::Literal(value)
    }
}

impl From<Expr> for Condition {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

/// The four guarded operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Row visibility (SELECT).
    Read,
    /// Row insertion (INSERT).
    Create,
    /// Row modification (UPDATE).
    Update,
    /// Row removal (DELETE).
    Delete,
}

impl Operation {
    /// All operations, in policy emission order.
    pub const ALL: [Self; 4] = [Self::Read, Self::Create, Self::Update, Self::Delete];

    /// Returns the lowercase operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-operation access rules for a table. Missing rules are permissive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessControl {
    /// Read rule.
    #[serde(default)]
    pub read: Condition,
    /// Create rule.
    #[serde(default)]
    pub create: Condition,
    /// Update rule.
    #[serde(default)]
    pub update: Condition,
    /// Delete rule.
    #[serde(default)]
    pub delete: Condition,
}

impl AccessControl {
    /// Returns the condition guarding `op`.
    #[must_use]
    pub const fn get(&self, op: Operation) -> &Condition {
        match op {
            Operation::Read => &self.read,
            Operation::Create => &self.create,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }

    /// Returns a copy with `op` guarded by `condition`.
    #[must_use]
    pub fn with(mut self, op: Operation, condition: impl Into<Condition>) -> Self {
        let condition = condition.into();
        match op {
            Operation::Read => self.read = condition,
            Operation::Create => self.create = condition,
            Operation::Update => self.update = condition,
            Operation::Delete => self.delete = condition,
        }
        self
    }
}

/// Schema definition for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Field definitions, in declaration order.
    pub fields: Vec<Field>,
    /// Access rules.
    #[serde(default)]
    pub access_control: AccessControl,
}

impl Table {
    /// Creates a table with no fields and permissive access control.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            access_control: AccessControl::default(),
        }
    }

    /// Adds a field to the table.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the access rules.
    #[must_use]
    pub fn access(mut self, access_control: AccessControl) -> Self {
        self.access_control = access_control;
        self
    }

    /// Gets a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A foreign-key relationship, derived from a field's [`ForeignKey`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Relation {
    /// Referencing table.
    pub from_table: String,
    /// Referencing field.
    pub from_field: String,
    /// Referenced table.
    pub to_table: String,
    /// Referenced field.
    pub to_field: String,
}

/// One version of the declarative schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tables in declaration order.
    pub tables: Vec<Table>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table to the snapshot.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns table names.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Parses a snapshot from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a snapshot from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Lists every foreign-key relationship declared on a field.
    #[must_use]
    pub fn relations(&self) -> Vec<Relation> {
        self.tables
            .iter()
            .flat_map(|table| {
                table.fields.iter().filter_map(move |field| {
                    field.foreign_key.as_ref().map(|fk| Relation {
                        from_table: table.name.clone(),
                        from_field: field.name.clone(),
                        to_table: fk.table.clone(),
                        to_field: fk.field.clone(),
                    })
                })
            })
            .collect()
    }

    /// Checks the structural invariants the diff engine relies on.
    ///
    /// Every violation is reported; more than one is returned as
    /// [`SchemaError::Multiple`].
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        let mut table_names = BTreeSet::new();

        for (position, table) in self.tables.iter().enumerate() {
            if table.name.is_empty() {
                errors.push(SchemaError::EmptyTableName(position));
            } else if !table_names.insert(table.name.as_str()) {
                errors.push(SchemaError::DuplicateTable(table.name.clone()));
            }

            let mut field_names = BTreeSet::new();
            for field in &table.fields {
                if field.name.is_empty() {
                    errors.push(SchemaError::EmptyFieldName {
                        table: table.name.clone(),
                    });
                } else if !field_names.insert(field.name.as_str()) {
                    errors.push(SchemaError::DuplicateField {
                        table: table.name.clone(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        let by_name: BTreeMap<&str, &Table> =
            self.tables.iter().map(|t| (t.name.as_str(), t)).collect();
        for relation in self.relations() {
            let target_exists = by_name
                .get(relation.to_table.as_str())
                .is_some_and(|t| t.get_field(&relation.to_field).is_some());
            if !target_exists {
                errors.push(SchemaError::UnknownForeignKeyTarget {
                    table: relation.from_table,
                    field: relation.from_field,
                    target_table: relation.to_table,
                    target_field: relation.to_field,
                });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SchemaError::Multiple(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> Table {
        Table::new("users")
            .field(Field::new("id", FieldType::Uuid).primary_key())
            .field(Field::new("email", FieldType::Text).not_null())
    }

    #[test]
    fn test_field_builder() {
        let field = Field::new("id", FieldType::Uuid).primary_key();
        assert!(field.primary_key);
        assert!(!field.nullable); // Primary keys are NOT NULL
        assert!(field.default.is_none());
    }

    #[test]
    fn test_snapshot_from_json() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "tables": [{
                "name": "posts",
                "fields": [
                    {"name": "id", "type": "uuid", "primary_key": true, "nullable": false},
                    {"name": "title", "type": "text", "nullable": false, "default": "untitled"},
                    {"name": "score", "type": "number", "default": 0},
                    {"name": "meta", "type": "geometry"},
                    {"name": "archived_at", "type": "datetime", "default": null},
                    {"name": "created_at", "type": "datetime",
                     "default": {"kind": "call", "name": "now"}},
                    {"name": "author_id", "type": "uuid",
                     "foreign_key": {"table": "users", "field": "id", "on_delete": "set_null"}}
                ],
                "access_control": {"read": true, "delete": false}
            }]
        }))
        .unwrap();

        let posts = snapshot.get_table("posts").unwrap();
        assert_eq!(posts.fields.len(), 7);
        assert_eq!(
            posts.get_field("title").unwrap().default,
            Some(DefaultValue::Text("untitled".into()))
        );
        assert!(matches!(
            posts.get_field("score").unwrap().default,
            Some(DefaultValue::Number(_))
        ));
        assert_eq!(
            posts.get_field("meta").unwrap().field_type,
            FieldType::Other("geometry".into())
        );
        assert_eq!(
            posts.get_field("archived_at").unwrap().default,
            Some(DefaultValue::Null)
        );
        assert_eq!(
            posts.get_field("created_at").unwrap().default,
            Some(DefaultValue::Expression(Expr::call("now", vec![])))
        );
        assert!(posts.get_field("created_at").unwrap().nullable);
        assert_eq!(
            posts.get_field("author_id").unwrap().foreign_key,
            Some(ForeignKey::new("users", "id").on_delete(ForeignKeyAction::SetNull))
        );
        assert_eq!(posts.access_control.read, Condition::Literal(true));
        assert_eq!(posts.access_control.create, Condition::Literal(true));
        assert_eq!(posts.access_control.delete, Condition::Literal(false));
    }

    #[test]
    fn test_relations_derived_from_fields() {
        let snapshot = Snapshot::new().table(users()).table(
            Table::new("posts")
                .field(Field::new("id", FieldType::Uuid).primary_key())
                .field(
                    Field::new("author_id", FieldType::Uuid)
                        .references(ForeignKey::new("users", "id")),
                ),
        );
        assert_eq!(
            snapshot.relations(),
            vec![Relation {
                from_table: "posts".into(),
                from_field: "author_id".into(),
                to_table: "users".into(),
                to_field: "id".into(),
            }]
        );
    }

    #[test]
    fn test_validate_accepts_well_formed_snapshot() {
        let snapshot = Snapshot::new()
            .table(users())
            .table(Table::new("notes").field(Field::new("body", FieldType::Other("blob".into()))));
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let snapshot = Snapshot::new().table(users()).table(users());
        assert!(matches!(
            snapshot.validate(),
            Err(SchemaError::DuplicateTable(name)) if name == "users"
        ));

        let snapshot = Snapshot::new().table(
            users().field(Field::new("email", FieldType::Text)),
        );
        assert!(matches!(
            snapshot.validate(),
            Err(SchemaError::DuplicateField { table, field })
                if table == "users" && field == "email"
        ));
    }

    #[test]
    fn test_validate_rejects_dangling_foreign_key_and_collects_errors() {
        let snapshot = Snapshot::new().table(
            Table::new("posts")
                .field(Field::new("", FieldType::Text))
                .field(
                    Field::new("author_id", FieldType::Uuid)
                        .references(ForeignKey::new("users", "id")),
                ),
        );
        match snapshot.validate() {
            Err(SchemaError::Multiple(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors[0], SchemaError::EmptyFieldName { .. }));
                assert!(matches!(
                    &errors[1],
                    SchemaError::UnknownForeignKeyTarget { target_table, .. }
                        if target_table == "users"
                ));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_access_control_get_and_with() {
        let access = AccessControl::default().with(Operation::Delete, false);
        assert_eq!(access.get(Operation::Read), &Condition::Literal(true));
        assert_eq!(access.get(Operation::Delete), &Condition::Literal(false));
    }
}
