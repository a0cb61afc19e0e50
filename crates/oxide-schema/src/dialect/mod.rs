//! Dialect-specific SQL generation.
//!
//! The three supported targets form a closed set. Each capability the
//! synthesizer branches on is one exhaustive `match` here, so adding a
//! dialect is a compile-checked change in this module.

mod types;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::{Field, ForeignKey};

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL: native UUID, JSONB, TIMESTAMPTZ and row-level security.
    #[default]
    Postgres,
    /// SQLite: everything folds to TEXT, REAL or INTEGER.
    Sqlite,
    /// libSQL: SQLite plus a JSON column type.
    Libsql,
}

impl Dialect {
    /// All dialects.
    pub const ALL: [Self; 3] = [Self::Postgres, Self::Sqlite, Self::Libsql];

    /// Returns the dialect name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Libsql => "libsql",
        }
    }

    /// Returns whether this dialect has native row-level access policies.
    #[must_use]
    pub const fn supports_policies(self) -> bool {
        match self {
            Self::Postgres => true,
            Self::Sqlite | Self::Libsql => false,
        }
    }

    /// Returns whether a column's type can be changed in place.
    #[must_use]
    pub const fn supports_alter_column_type(self) -> bool {
        match self {
            Self::Postgres => true,
            Self::Sqlite | Self::Libsql => false,
        }
    }

    /// Returns whether NOT NULL and DEFAULT can be altered on an existing column.
    #[must_use]
    pub const fn supports_alter_column_constraints(self) -> bool {
        match self {
            Self::Postgres => true,
            Self::Sqlite | Self::Libsql => false,
        }
    }

    /// Returns whether foreign keys are emitted as separate named
    /// constraints rather than inline column references.
    #[must_use]
    pub const fn uses_separate_foreign_keys(self) -> bool {
        match self {
            Self::Postgres => true,
            Self::Sqlite | Self::Libsql => false,
        }
    }

    /// Returns the literal text for a boolean default.
    #[must_use]
    pub const fn boolean_literal(self, value: bool) -> &'static str {
        match (self, value) {
            (Self::Postgres, true) => "TRUE",
            (Self::Postgres, false) => "FALSE",
            (Self::Sqlite | Self::Libsql, true) => "1",
            (Self::Sqlite | Self::Libsql, false) => "0",
        }
    }

    /// Quotes an identifier (table name, column name, etc.).
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quotes a string literal.
    #[must_use]
    pub fn quote_string(self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Wraps a compiled expression for use after `DEFAULT`.
    ///
    /// The SQLite family only accepts non-literal defaults in parentheses.
    #[must_use]
    pub fn expression_default(self, sql: &str) -> String {
        match self {
            Self::Postgres => sql.to_string(),
            Self::Sqlite | Self::Libsql => format!("({})", sql),
        }
    }

    /// Generates column definition SQL.
    ///
    /// `default_sql` is the already rendered DEFAULT expression. Inline
    /// REFERENCES clauses are only emitted on dialects without separate
    /// foreign key constraints.
    #[must_use]
    pub fn column_definition(self, field: &Field, default_sql: Option<&str>) -> String {
        let mut parts = vec![
            self.quote_identifier(&field.name),
            self.type_name(&field.field_type).to_string(),
        ];

        if field.primary_key {
            parts.push("PRIMARY KEY".to_string());
        } else if !field.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default_sql) = default_sql {
            parts.push(format!("DEFAULT {}", default_sql));
        }

        if !self.uses_separate_foreign_keys() {
            if let Some(fk) = &field.foreign_key {
                parts.push(self.references_clause(fk));
            }
        }

        parts.join(" ")
    }

    /// Generates SQL for CREATE TABLE from rendered column definitions.
    #[must_use]
    pub fn create_table(self, table: &str, column_defs: &[String]) -> String {
        let mut sql = String::from("CREATE TABLE ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (\n    ");
        sql.push_str(&column_defs.join(",\n    "));
        sql.push_str("\n)");
        sql
    }

    /// Generates SQL for DROP TABLE.
    #[must_use]
    pub fn drop_table(self, table: &str, cascade: bool) -> String {
        let mut sql = format!("DROP TABLE {}", self.quote_identifier(table));
        if cascade && matches!(self, Self::Postgres) {
            sql.push_str(" CASCADE");
        }
        sql
    }

    /// Generates SQL for adding a column.
    #[must_use]
    pub fn add_column(self, table: &str, column_def: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            column_def
        )
    }

    /// Generates SQL for dropping a column.
    #[must_use]
    pub fn drop_column(self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Generates SQL for renaming a column.
    #[must_use]
    pub fn rename_column(self, table: &str, old_name: &str, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(old_name),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for an in-place column type change.
    #[must_use]
    pub fn alter_column_type(self, table: &str, column: &str, type_name: &str) -> String {
        let column = self.quote_identifier(column);
        format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
            self.quote_identifier(table),
            column,
            type_name,
            column,
            type_name
        )
    }

    /// Generates SQL copying every row of `from` into `to`, cast to
    /// `type_name`.
    ///
    /// Pass [`Dialect::copy_type_name`], not the column type, so structured
    /// values survive on libSQL.
    #[must_use]
    pub fn copy_cast(self, table: &str, from: &str, to: &str, type_name: &str) -> String {
        format!(
            "UPDATE {} SET {} = CAST({} AS {})",
            self.quote_identifier(table),
            self.quote_identifier(to),
            self.quote_identifier(from),
            type_name
        )
    }

    /// Generates SQL for SET NOT NULL / DROP NOT NULL.
    #[must_use]
    pub fn alter_nullable(self, table: &str, column: &str, nullable: bool) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
            self.quote_identifier(table),
            self.quote_identifier(column),
            if nullable { "DROP" } else { "SET" }
        )
    }

    /// Generates SQL for SET DEFAULT.
    #[must_use]
    pub fn set_default(self, table: &str, column: &str, default_sql: &str) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            default_sql
        )
    }

    /// Generates SQL for DROP DEFAULT.
    #[must_use]
    pub fn drop_default(self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Returns the constraint name for the foreign key on `table.column`.
    ///
    /// Drop and add statements for the same column always agree on it.
    #[must_use]
    pub fn foreign_key_name(self, table: &str, column: &str) -> String {
        format!("fk_{}_{}", table, column)
    }

    /// Generates a `REFERENCES` clause.
    #[must_use]
    pub fn references_clause(self, fk: &ForeignKey) -> String {
        let mut sql = format!(
            "REFERENCES {} ({})",
            self.quote_identifier(&fk.table),
            self.quote_identifier(&fk.field)
        );
        if let Some(action) = fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.to_sql());
        }
        if let Some(action) = fk.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.to_sql());
        }
        sql
    }

    /// Generates SQL for ADD CONSTRAINT ... FOREIGN KEY.
    #[must_use]
    pub fn add_foreign_key(self, table: &str, column: &str, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) {}",
            self.quote_identifier(table),
            self.quote_identifier(&self.foreign_key_name(table, column)),
            self.quote_identifier(column),
            self.references_clause(fk)
        )
    }

    /// Generates SQL for DROP CONSTRAINT on a foreign key.
    #[must_use]
    pub fn drop_foreign_key(self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
            self.quote_identifier(table),
            self.quote_identifier(&self.foreign_key_name(table, column))
        )
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            "libsql" => Ok(Self::Libsql),
            _ => Err(SchemaError::UnknownDialect(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, ForeignKeyAction};

    #[test]
    fn test_capabilities() {
        assert!(Dialect::Postgres.supports_policies());
        assert!(Dialect::Postgres.supports_alter_column_type());
        assert!(Dialect::Postgres.uses_separate_foreign_keys());
        for dialect in [Dialect::Sqlite, Dialect::Libsql] {
            assert!(!dialect.supports_policies());
            assert!(!dialect.supports_alter_column_type());
            assert!(!dialect.supports_alter_column_constraints());
            assert!(!dialect.uses_separate_foreign_keys());
        }
    }

    #[test]
    fn test_column_definition() {
        let id = Field::new("id", FieldType::Uuid).primary_key();
        assert_eq!(
            Dialect::Postgres.column_definition(&id, None),
            "\"id\" UUID PRIMARY KEY"
        );
        assert_eq!(
            Dialect::Sqlite.column_definition(&id, None),
            "\"id\" TEXT PRIMARY KEY"
        );

        let active = Field::new("active", FieldType::Boolean).not_null();
        assert_eq!(
            Dialect::Libsql.column_definition(&active, Some("1")),
            "\"active\" INTEGER NOT NULL DEFAULT 1"
        );
    }

    #[test]
    fn test_inline_references_only_without_separate_constraints() {
        let author = Field::new("author_id", FieldType::Uuid).references(
            ForeignKey::new("users", "id").on_delete(ForeignKeyAction::Cascade),
        );
        assert_eq!(
            Dialect::Sqlite.column_definition(&author, None),
            "\"author_id\" TEXT REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        );
        assert_eq!(
            Dialect::Postgres.column_definition(&author, None),
            "\"author_id\" UUID"
        );
    }

    #[test]
    fn test_create_table() {
        let sql = Dialect::Sqlite.create_table(
            "users",
            &["\"id\" TEXT PRIMARY KEY".to_string(), "\"email\" TEXT NOT NULL".to_string()],
        );
        assert_eq!(
            sql,
            "CREATE TABLE \"users\" (\n    \"id\" TEXT PRIMARY KEY,\n    \"email\" TEXT NOT NULL\n)"
        );
    }

    #[test]
    fn test_drop_table_cascade_only_on_postgres() {
        assert_eq!(
            Dialect::Postgres.drop_table("users", true),
            "DROP TABLE \"users\" CASCADE"
        );
        assert_eq!(Dialect::Sqlite.drop_table("users", true), "DROP TABLE \"users\"");
    }

    #[test]
    fn test_foreign_key_constraints_share_a_name() {
        let fk = ForeignKey::new("users", "id").on_delete(ForeignKeyAction::SetNull);
        assert_eq!(
            Dialect::Postgres.add_foreign_key("posts", "author_id", &fk),
            "ALTER TABLE \"posts\" ADD CONSTRAINT \"fk_posts_author_id\" \
             FOREIGN KEY (\"author_id\") REFERENCES \"users\" (\"id\") ON DELETE SET NULL"
        );
        assert_eq!(
            Dialect::Postgres.drop_foreign_key("posts", "author_id"),
            "ALTER TABLE \"posts\" DROP CONSTRAINT IF EXISTS \"fk_posts_author_id\""
        );
    }

    #[test]
    fn test_alter_column_sql() {
        assert_eq!(
            Dialect::Postgres.alter_nullable("users", "email", false),
            "ALTER TABLE \"users\" ALTER COLUMN \"email\" SET NOT NULL"
        );
        assert_eq!(
            Dialect::Postgres.alter_nullable("users", "email", true),
            "ALTER TABLE \"users\" ALTER COLUMN \"email\" DROP NOT NULL"
        );
        assert_eq!(
            Dialect::Postgres.alter_column_type("users", "age", "NUMERIC"),
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE NUMERIC USING \"age\"::NUMERIC"
        );
    }

    #[test]
    fn test_expression_default() {
        assert_eq!(Dialect::Postgres.expression_default("NOW()"), "NOW()");
        assert_eq!(
            Dialect::Sqlite.expression_default("CURRENT_TIMESTAMP"),
            "(CURRENT_TIMESTAMP)"
        );
    }

    #[test]
    fn test_quoting_escapes() {
        assert_eq!(Dialect::Postgres.quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Dialect::Sqlite.quote_string("it's"), "'it''s'");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("libsql".parse::<Dialect>().unwrap(), Dialect::Libsql);
        assert!(matches!(
            "mysql".parse::<Dialect>(),
            Err(SchemaError::UnknownDialect(name)) if name == "mysql"
        ));
    }
}
