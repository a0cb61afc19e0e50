//! Migration synthesis.
//!
//! Turns a [`DatabaseDiff`] (or a whole snapshot, for bootstrap) into an
//! ordered list of SQL statements for one [`Dialect`]. Statements are
//! emitted in a fixed order:
//!
//! 1. `DROP TABLE` for removed tables
//! 2. `CREATE TABLE` for added tables, then their foreign key constraints
//!    on dialects that declare them separately
//! 3. per modified table: added columns, removed columns, then attribute
//!    changes of modified columns
//! 4. the row-level security block of every table with changed access
//!    control
//!
//! Attribute changes a dialect cannot express in place are either rebuilt
//! (column types) or skipped with a [`MigrationWarning`].

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compiler::{CompileContext, ConditionCompiler, SchemaShape, SqlCompiler};
use crate::config::SynthesisConfig;
use crate::diff::{
    diff_snapshots, AccessControlChange, AccessControlDiff, DatabaseDiff, FieldModification,
    TableModification,
};
use crate::dialect::Dialect;
use crate::error::{Result, SchemaError};
use crate::expr::normalize_function_names;
use crate::policy::PolicyWriter;
use crate::schema::{DefaultValue, Field, FieldType, Snapshot, Table};

// ============================================================
// Output
// ============================================================

/// A change that was detected but not expressed as SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationWarning {
    /// The dialect cannot alter nullability in place.
    NullabilityChangeSkipped {
        /// Table name.
        table: String,
        /// Column name.
        field: String,
        /// Requested nullability.
        nullable: bool,
    },
    /// The dialect cannot alter defaults in place.
    DefaultChangeSkipped {
        /// Table name.
        table: String,
        /// Column name.
        field: String,
    },
    /// The dialect cannot add or drop foreign keys on existing columns.
    ForeignKeyChangeSkipped {
        /// Table name.
        table: String,
        /// Column name.
        field: String,
    },
    /// A column rebuilt for a type change lost a constraint the SQLite
    /// family cannot add to an existing table.
    RebuildDroppedConstraint {
        /// Table name.
        table: String,
        /// Column name.
        field: String,
        /// The lost constraint (`DEFAULT`, `NOT NULL`, `PRIMARY KEY` or
        /// `FOREIGN KEY`).
        constraint: &'static str,
    },
    /// Primary keys are never altered on existing tables.
    PrimaryKeyChange {
        /// Table name.
        table: String,
        /// Column name.
        field: String,
        /// Requested primary key flag.
        primary_key: bool,
    },
}

impl fmt::Display for MigrationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullabilityChangeSkipped {
                table,
                field,
                nullable,
            } => write!(
                f,
                "nullability of '{}.{}' not changed to {}: unsupported by dialect",
                table,
                field,
                if *nullable { "NULL" } else { "NOT NULL" }
            ),
            Self::DefaultChangeSkipped { table, field } => write!(
                f,
                "default of '{}.{}' not changed: unsupported by dialect",
                table, field
            ),
            Self::ForeignKeyChangeSkipped { table, field } => write!(
                f,
                "foreign key of '{}.{}' not changed: unsupported by dialect",
                table, field
            ),
            Self::RebuildDroppedConstraint {
                table,
                field,
                constraint,
            } => write!(
                f,
                "{} of '{}.{}' lost when rebuilding the column: rebuild the table manually",
                constraint, table, field
            ),
            Self::PrimaryKeyChange {
                table,
                field,
                primary_key,
            } => write!(
                f,
                "primary key flag of '{}.{}' changed to {}: rebuild the table manually",
                table, field, primary_key
            ),
        }
    }
}

/// The result of synthesis.
#[derive(Debug, Clone, Serialize)]
pub struct Migration {
    /// Target dialect.
    pub dialect: Dialect,
    /// SQL statements, without trailing semicolons, in execution order.
    pub statements: Vec<String>,
    /// Access-control changes the statements were generated from.
    pub access_control: AccessControlDiff,
    /// Changes that could not be expressed for this dialect.
    pub warnings: Vec<MigrationWarning>,
}

impl Migration {
    /// Returns `true` if there is nothing to execute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Renders the statements as a script, one per line, each terminated
    /// by a semicolon.
    #[must_use]
    pub fn sql(&self) -> String {
        self.statements
            .iter()
            .map(|statement| format!("{};\n", statement))
            .collect()
    }
}

// ============================================================
// Synthesizer
// ============================================================

/// Generates migration SQL using a condition compiler and configuration.
#[derive(Debug, Clone, Default)]
pub struct Synthesizer<C = SqlCompiler> {
    compiler: C,
    config: SynthesisConfig,
}

impl Synthesizer<SqlCompiler> {
    /// Creates a synthesizer with the built-in compiler and default
    /// configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: ConditionCompiler> Synthesizer<C> {
    /// Creates a synthesizer around a custom condition compiler.
    #[must_use]
    pub fn with_compiler(compiler: C) -> Self {
        Self {
            compiler,
            config: SynthesisConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: SynthesisConfig) -> Self {
        self.config = config;
        self
    }

    /// Generates the SQL creating `snapshot` from an empty database.
    ///
    /// Produces the same statements as synthesizing the diff from an empty
    /// snapshot to `snapshot`.
    pub fn bootstrap(&self, snapshot: &Snapshot, dialect: Dialect) -> Result<Migration> {
        let access_control = AccessControlDiff {
            tables: snapshot
                .tables
                .iter()
                .map(AccessControlChange::from_default)
                .collect(),
        };

        let mut emitter = Emitter::new(&self.compiler, &self.config, dialect, snapshot);
        emitter.create_tables(&snapshot.tables)?;
        emitter.policies(&access_control)?;
        Ok(emitter.finish(access_control))
    }

    /// Generates the SQL applying `diff`, whose new side is `target`.
    pub fn synthesize(
        &self,
        diff: &DatabaseDiff,
        target: &Snapshot,
        dialect: Dialect,
    ) -> Result<Migration> {
        let mut emitter = Emitter::new(&self.compiler, &self.config, dialect, target);

        for table in &diff.tables.removed {
            emitter.drop_table(table);
        }
        emitter.create_tables(&diff.tables.added)?;
        for modification in &diff.tables.modified {
            let table = target
                .get_table(&modification.table)
                .ok_or_else(|| SchemaError::MissingTargetTable(modification.table.clone()))?;
            emitter.modify_table(modification, table)?;
        }
        emitter.policies(&diff.access_control)?;

        Ok(emitter.finish(diff.access_control.clone()))
    }

    /// Diffs `old` against `new` and synthesizes the result.
    pub fn migrate(&self, old: &Snapshot, new: &Snapshot, dialect: Dialect) -> Result<Migration> {
        self.synthesize(&diff_snapshots(old, new), new, dialect)
    }
}

/// Bootstraps `snapshot` with the built-in compiler and default configuration.
pub fn bootstrap(snapshot: &Snapshot, dialect: Dialect) -> Result<Migration> {
    Synthesizer::new().bootstrap(snapshot, dialect)
}

/// Synthesizes `diff` with the built-in compiler and default configuration.
pub fn synthesize(diff: &DatabaseDiff, target: &Snapshot, dialect: Dialect) -> Result<Migration> {
    Synthesizer::new().synthesize(diff, target, dialect)
}

// ============================================================
// Statement emission
// ============================================================

struct Emitter<'a, C: ?Sized> {
    compiler: &'a C,
    config: &'a SynthesisConfig,
    dialect: Dialect,
    shape: SchemaShape<'a>,
    statements: Vec<String>,
    warnings: Vec<MigrationWarning>,
}

impl<'a, C: ConditionCompiler + ?Sized> Emitter<'a, C> {
    fn new(
        compiler: &'a C,
        config: &'a SynthesisConfig,
        dialect: Dialect,
        target: &'a Snapshot,
    ) -> Self {
        Self {
            compiler,
            config,
            dialect,
            shape: SchemaShape::new(target),
            statements: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn push(&mut self, statement: String) {
        debug!(sql = %statement, "statement");
        self.statements.push(statement);
    }

    fn skip(&mut self, warning: MigrationWarning) {
        warn!(dialect = %self.dialect, "{}", warning);
        self.warnings.push(warning);
    }

    fn finish(self, access_control: AccessControlDiff) -> Migration {
        info!(
            dialect = %self.dialect,
            statements = self.statements.len(),
            warnings = self.warnings.len(),
            "synthesized migration"
        );
        Migration {
            dialect: self.dialect,
            statements: self.statements,
            access_control,
            warnings: self.warnings,
        }
    }

    fn drop_table(&mut self, table: &Table) {
        let sql = self
            .dialect
            .drop_table(&table.name, self.config.drop_cascade);
        self.push(sql);
    }

    /// Creates every table before any constraint so that tables may
    /// reference each other in either order.
    fn create_tables(&mut self, tables: &[Table]) -> Result<()> {
        for table in tables {
            let columns = table
                .fields
                .iter()
                .map(|field| self.column_definition(&table.name, field))
                .collect::<Result<Vec<_>>>()?;
            let sql = self.dialect.create_table(&table.name, &columns);
            self.push(sql);
        }

        if self.dialect.uses_separate_foreign_keys() {
            for table in tables {
                for field in &table.fields {
                    if let Some(fk) = &field.foreign_key {
                        let sql = self.dialect.add_foreign_key(&table.name, &field.name, fk);
                        self.push(sql);
                    }
                }
            }
        }
        Ok(())
    }

    fn modify_table(&mut self, modification: &TableModification, target: &Table) -> Result<()> {
        let table = modification.table.as_str();
        let separate_fks = self.dialect.uses_separate_foreign_keys();

        for field in &modification.fields_added {
            let column = self.column_definition(table, field)?;
            let sql = self.dialect.add_column(table, &column);
            self.push(sql);
            if separate_fks {
                if let Some(fk) = &field.foreign_key {
                    let sql = self.dialect.add_foreign_key(table, &field.name, fk);
                    self.push(sql);
                }
            }
        }

        for field in &modification.fields_removed {
            if separate_fks && field.foreign_key.is_some() {
                let sql = self.dialect.drop_foreign_key(table, &field.name);
                self.push(sql);
            }
            let sql = self.dialect.drop_column(table, &field.name);
            self.push(sql);
        }

        for field in &modification.fields_modified {
            self.modify_field(target, field)?;
        }
        Ok(())
    }

    fn modify_field(&mut self, target: &Table, modification: &FieldModification) -> Result<()> {
        let table = target.name.as_str();
        let column = modification.name.as_str();
        let dialect = self.dialect;

        let mut rebuilt = false;
        if let Some(change) = &modification.field_type {
            let type_name = dialect.type_name(&change.to);
            if dialect.supports_alter_column_type() {
                self.push(dialect.alter_column_type(table, column, type_name));
            } else {
                self.rebuild_column(target, modification, &change.to)?;
                rebuilt = true;
            }
        }

        // The rebuilt column already carries what the target field allows.
        if !rebuilt {
            self.alter_constraints(table, modification)?;
        }

        if let Some(change) = &modification.primary_key {
            self.skip(MigrationWarning::PrimaryKeyChange {
                table: table.to_string(),
                field: column.to_string(),
                primary_key: change.to,
            });
        }

        Ok(())
    }

    fn alter_constraints(&mut self, table: &str, modification: &FieldModification) -> Result<()> {
        let column = modification.name.as_str();
        let dialect = self.dialect;

        if let Some(change) = &modification.nullable {
            if dialect.supports_alter_column_constraints() {
                self.push(dialect.alter_nullable(table, column, change.to));
            } else {
                self.skip(MigrationWarning::NullabilityChangeSkipped {
                    table: table.to_string(),
                    field: column.to_string(),
                    nullable: change.to,
                });
            }
        }

        if let Some(change) = &modification.default {
            if dialect.supports_alter_column_constraints() {
                match &change.to {
                    Some(default) => {
                        let sql = self.render_default(table, column, default)?;
                        self.push(dialect.set_default(table, column, &sql));
                    }
                    None => self.push(dialect.drop_default(table, column)),
                }
            } else {
                self.skip(MigrationWarning::DefaultChangeSkipped {
                    table: table.to_string(),
                    field: column.to_string(),
                });
            }
        }

        if let Some(change) = &modification.foreign_key {
            if dialect.uses_separate_foreign_keys() {
                if change.from.is_some() {
                    self.push(dialect.drop_foreign_key(table, column));
                }
                if let Some(fk) = &change.to {
                    self.push(dialect.add_foreign_key(table, column, fk));
                }
            } else {
                self.skip(MigrationWarning::ForeignKeyChangeSkipped {
                    table: table.to_string(),
                    field: column.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Replaces a column by a new one of `field_type`: add a temporary
    /// column, copy the values, drop the original, rename.
    ///
    /// Only a constant default can be declared on the temporary column.
    /// Every other constraint of the target field is reported as lost.
    fn rebuild_column(
        &mut self,
        target: &Table,
        modification: &FieldModification,
        field_type: &FieldType,
    ) -> Result<()> {
        let dialect = self.dialect;
        let type_name = dialect.type_name(field_type);
        let table = target.name.as_str();
        let column = modification.name.as_str();
        let rebuild = rebuild_column_name(target, column);
        debug!(table, column, temp = %rebuild, "rebuilding column");

        let mut temp_def = format!("{} {}", dialect.quote_identifier(&rebuild), type_name);
        let mut lost = Vec::new();
        if let Some(field) = target.get_field(column) {
            match &field.default {
                Some(DefaultValue::Expression(_)) => lost.push("DEFAULT"),
                Some(default) => {
                    let sql = self.render_default(table, column, default)?;
                    temp_def.push_str(" DEFAULT ");
                    temp_def.push_str(&sql);
                }
                None => {}
            }
            // A primary key change is reported on its own.
            if field.primary_key {
                if modification.primary_key.is_none() {
                    lost.push("PRIMARY KEY");
                }
            } else if !field.nullable {
                lost.push("NOT NULL");
            }
            if field.foreign_key.is_some() {
                lost.push("FOREIGN KEY");
            }
        }

        self.push(dialect.add_column(table, &temp_def));
        self.push(dialect.copy_cast(
            table,
            column,
            &rebuild,
            dialect.copy_type_name(field_type),
        ));
        self.push(dialect.drop_column(table, column));
        self.push(dialect.rename_column(table, &rebuild, column));

        for constraint in lost {
            self.skip(MigrationWarning::RebuildDroppedConstraint {
                table: table.to_string(),
                field: column.to_string(),
                constraint,
            });
        }
        Ok(())
    }

    fn policies(&mut self, access_control: &AccessControlDiff) -> Result<()> {
        let writer = PolicyWriter::new(
            self.compiler,
            self.dialect,
            &self.shape,
            &self.config.variables,
        );
        let mut statements = Vec::new();
        for change in &access_control.tables {
            let block = writer.statements(change)?;
            if !block.is_empty() {
                debug!(table = %change.table, count = block.len(), "policy block");
            }
            statements.extend(block);
        }
        for statement in statements {
            self.push(statement);
        }
        Ok(())
    }

    fn column_definition(&self, table: &str, field: &Field) -> Result<String> {
        let default_sql = field
            .default
            .as_ref()
            .map(|default| self.render_default(table, &field.name, default))
            .transpose()?;
        Ok(self
            .dialect
            .column_definition(field, default_sql.as_deref()))
    }

    fn render_default(&self, table: &str, field: &str, default: &DefaultValue) -> Result<String> {
        let sql = match default {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Boolean(value) => self.dialect.boolean_literal(*value).to_string(),
            DefaultValue::Number(value) => value.to_string(),
            DefaultValue::Text(value) => self.dialect.quote_string(value),
            DefaultValue::Expression(expr) => {
                let ctx = CompileContext {
                    dialect: self.dialect,
                    table,
                    shape: &self.shape,
                    variables: &self.config.variables,
                };
                let compiled = self
                    .compiler
                    .compile(&normalize_function_names(expr), &ctx)
                    .map_err(|source| SchemaError::DefaultCompile {
                        table: table.to_string(),
                        field: field.to_string(),
                        source,
                    })?;
                self.dialect.expression_default(&compiled)
            }
        };
        Ok(sql)
    }
}

/// Picks a temporary column name that does not collide with `table`'s
/// columns.
fn rebuild_column_name(table: &Table, column: &str) -> String {
    let base = format!("{}__rebuild", column);
    let mut candidate = base.clone();
    let mut suffix = 1;
    while table.get_field(&candidate).is_some() {
        candidate = format!("{}_{}", base, suffix);
        suffix += 1;
    }
    candidate
}
