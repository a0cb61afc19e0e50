//! Schema snapshot diffing and migration SQL synthesis.
//!
//! `oxide-schema` compares two declarative schema snapshots and turns the
//! difference into dialect-specific SQL:
//! - Tables and fields are matched by exact name (no rename detection)
//! - Access-control rules become row-level security policies where the
//!   dialect supports them
//! - SQL generation targets PostgreSQL, SQLite and libSQL
//!
//! # Architecture
//!
//! - **Schema** - Snapshot model: tables, fields, foreign keys, access rules
//! - **Diff** - Pure structural comparison of two snapshots
//! - **Dialect** - Type mapping and statement shapes per database
//! - **Compiler** - Translates condition and default expressions to SQL
//! - **Policy** - Row-level security statement blocks
//! - **Synth** - Orders everything into a migration
//!
//! # Example
//!
//! ```rust
//! use oxide_schema::prelude::*;
//!
//! let old = Snapshot::new().table(
//!     Table::new("users")
//!         .field(Field::new("id", FieldType::Uuid).primary_key())
//!         .field(Field::new("email", FieldType::Text).not_null()),
//! );
//! let new = Snapshot::new().table(
//!     Table::new("users")
//!         .field(Field::new("id", FieldType::Uuid).primary_key())
//!         .field(Field::new("email", FieldType::Text).not_null())
//!         .field(Field::new("name", FieldType::Text)),
//! );
//!
//! let diff = diff_snapshots(&old, &new);
//! let migration = synthesize(&diff, &new, Dialect::Postgres).unwrap();
//! assert_eq!(
//!     migration.sql(),
//!     "ALTER TABLE \"users\" ADD COLUMN \"name\" TEXT;\n"
//! );
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Check a snapshot
//! oxide-schema validate schema.json
//!
//! # Show the structural diff as JSON
//! oxide-schema diff old.json new.json
//!
//! # SQL creating a snapshot from scratch
//! oxide-schema --dialect sqlite bootstrap schema.json
//!
//! # SQL migrating between two snapshots
//! oxide-schema migrate old.json new.json --access-control-out acl.json
//! ```

pub mod compiler;
pub mod config;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod expr;
pub mod policy;
pub mod schema;
pub mod synth;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::compiler::{CompileContext, CompileError, ConditionCompiler, SqlCompiler};
    pub use crate::config::SynthesisConfig;
    pub use crate::dialect::Dialect;
    pub use crate::diff::{
        diff_snapshots, AccessControlChange, AccessControlDiff, Change, DatabaseDiff,
        FieldModification, TableDiff, TableModification,
    };
    pub use crate::error::{Result, SchemaError};
    pub use crate::expr::{CompareOp, Expr};
    pub use crate::schema::{
        AccessControl, Condition, DefaultValue, Field, FieldType, ForeignKey, ForeignKeyAction,
        Operation, Snapshot, Table,
    };
    pub use crate::synth::{bootstrap, synthesize, Migration, MigrationWarning, Synthesizer};
}
