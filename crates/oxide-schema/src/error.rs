//! Error types for schema diffing and migration synthesis.

use std::path::PathBuf;

use crate::compiler::CompileError;
use crate::schema::Operation;

/// Errors that can occur while validating snapshots or synthesizing SQL.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A table has an empty name.
    #[error("Table at position {0} has an empty name")]
    EmptyTableName(usize),

    /// A field has an empty name.
    #[error("Table '{table}' has a field with an empty name")]
    EmptyFieldName {
        /// Table containing the field.
        table: String,
    },

    /// Two tables share a name.
    #[error("Duplicate table '{0}'")]
    DuplicateTable(String),

    /// Two fields in one table share a name.
    #[error("Duplicate field '{field}' in table '{table}'")]
    DuplicateField {
        /// Table containing the fields.
        table: String,
        /// The repeated field name.
        field: String,
    },

    /// A foreign key points at a table or field that does not exist.
    #[error("Foreign key on '{table}.{field}' references unknown '{target_table}.{target_field}'")]
    UnknownForeignKeyTarget {
        /// Referencing table.
        table: String,
        /// Referencing field.
        field: String,
        /// Referenced table.
        target_table: String,
        /// Referenced field.
        target_field: String,
    },

    /// A default expression failed to compile.
    #[error("Failed to compile default for '{table}.{field}': {source}")]
    DefaultCompile {
        /// Table containing the field.
        table: String,
        /// Field whose default failed.
        field: String,
        /// Underlying compiler error.
        source: CompileError,
    },

    /// An access-control condition failed to compile.
    #[error("Failed to compile {operation} policy for '{table}': {source}")]
    PolicyCompile {
        /// Table the policy belongs to.
        table: String,
        /// Operation the policy guards.
        operation: Operation,
        /// Underlying compiler error.
        source: CompileError,
    },

    /// A dialect name could not be parsed.
    #[error("Unknown dialect '{0}' (expected postgres, sqlite or libsql)")]
    UnknownDialect(String),

    /// A diff refers to a table missing from the target snapshot.
    #[error("Table '{0}' is not present in the target snapshot")]
    MissingTargetTable(String),

    /// IO error (reading snapshot or configuration files).
    #[error("IO error on '{path}': {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Multiple errors occurred.
    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<SchemaError>),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
