//! Condition compilation.
//!
//! The synthesizer never renders expression trees itself. It builds a
//! [`CompileContext`] describing the target snapshot and hands each tree to a
//! [`ConditionCompiler`]. [`SqlCompiler`] is the implementation used by the
//! CLI; embedders can plug in their own.

use std::collections::BTreeMap;

use crate::dialect::Dialect;
use crate::expr::Expr;
use crate::schema::{Field, Relation, Snapshot};

/// Errors reported by a [`ConditionCompiler`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// A field reference names a field the table does not have.
    #[error("unknown field '{field}' on table '{table}'")]
    UnknownField {
        /// Table searched.
        table: String,
        /// Missing field.
        field: String,
    },

    /// A dotted path traverses a field that is not a foreign key.
    #[error("field '{table}.{field}' is not a foreign key")]
    UnknownRelation {
        /// Table searched.
        table: String,
        /// Field that was expected to be a foreign key.
        field: String,
    },

    /// A variable is not present in the bindings.
    #[error("unbound variable '{0}'")]
    UnboundVariable(String),

    /// A function is not in the catalogue.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A function was called with the wrong number of arguments.
    #[error("function '{name}' expects {expected} argument(s), got {actual}")]
    Arity {
        /// Function name.
        name: String,
        /// Accepted argument count.
        expected: &'static str,
        /// Supplied argument count.
        actual: usize,
    },

    /// A literal is not a JSON scalar.
    #[error("unsupported literal {0}")]
    UnsupportedLiteral(String),
}

/// Fields of one table, keyed by name.
pub type FieldMap<'a> = BTreeMap<&'a str, &'a Field>;

/// Every table's fields and the foreign-key relationships between them.
#[derive(Debug, Clone)]
pub struct SchemaShape<'a> {
    /// Fields per table.
    pub tables: BTreeMap<&'a str, FieldMap<'a>>,
    /// Relationships derived from field-level foreign keys.
    pub relations: Vec<Relation>,
}

impl<'a> SchemaShape<'a> {
    /// Builds the shape of a snapshot.
    #[must_use]
    pub fn new(snapshot: &'a Snapshot) -> Self {
        let tables = snapshot
            .tables
            .iter()
            .map(|t| {
                let fields = t.fields.iter().map(|f| (f.name.as_str(), f)).collect();
                (t.name.as_str(), fields)
            })
            .collect();
        Self {
            tables,
            relations: snapshot.relations(),
        }
    }

    /// Looks up a field.
    #[must_use]
    pub fn field(&self, table: &str, field: &str) -> Option<&'a Field> {
        self.tables.get(table)?.get(field).copied()
    }

    /// Looks up the relationship declared on `table.field`.
    #[must_use]
    pub fn relation(&self, table: &str, field: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.from_table == table && r.from_field == field)
    }
}

/// Everything a compiler may consult while rendering one expression.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    /// Target dialect.
    pub dialect: Dialect,
    /// Table the expression is evaluated against.
    pub table: &'a str,
    /// Fields and relationships of the target snapshot.
    pub shape: &'a SchemaShape<'a>,
    /// Bound variables (name to SQL expression).
    pub variables: &'a BTreeMap<String, String>,
}

/// Compiles expression trees to boolean or scalar SQL text.
///
/// Implementations must be deterministic and free of side effects.
pub trait ConditionCompiler {
    /// Renders `expr` in the context's dialect.
    fn compile(&self, expr: &Expr, ctx: &CompileContext<'_>) -> Result<String, CompileError>;
}

/// The built-in compiler.
///
/// Function names are matched exactly against an uppercase catalogue, so
/// callers are expected to normalize names first.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlCompiler;

impl SqlCompiler {
    /// Creates a new compiler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn literal(value: &serde_json::Value, dialect: Dialect) -> Result<String, CompileError> {
        match value {
            serde_json::Value::Null => Ok("NULL".to_string()),
            serde_json::Value::Bool(b) => Ok(dialect.boolean_literal(*b).to_string()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::String(s) => Ok(dialect.quote_string(s)),
            other => Err(CompileError::UnsupportedLiteral(other.to_string())),
        }
    }

    /// Resolves `segments` starting at `table`. Every segment but the last
    /// must be a foreign key; each hop becomes a correlated sub-select.
    fn field_path(
        ctx: &CompileContext<'_>,
        table: &str,
        segments: &[&str],
    ) -> Result<String, CompileError> {
        let q = |name: &str| ctx.dialect.quote_identifier(name);
        let unknown = |field: &str| CompileError::UnknownField {
            table: table.to_string(),
            field: field.to_string(),
        };

        let (head, rest) = segments.split_first().ok_or_else(|| unknown(""))?;
        ctx.shape.field(table, head).ok_or_else(|| unknown(head))?;
        let column = format!("{}.{}", q(table), q(head));
        if rest.is_empty() {
            return Ok(column);
        }

        let relation = ctx
            .shape
            .relation(table, head)
            .ok_or_else(|| CompileError::UnknownRelation {
                table: table.to_string(),
                field: (*head).to_string(),
            })?;
        let inner = Self::field_path(ctx, &relation.to_table, rest)?;
        Ok(format!(
            "(SELECT {} FROM {} WHERE {}.{} = {})",
            inner,
            q(&relation.to_table),
            q(&relation.to_table),
            q(&relation.to_field),
            column
        ))
    }

    fn function(name: &str, args: &[String], dialect: Dialect) -> Result<String, CompileError> {
        let arity = |expected: &'static str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(CompileError::Arity {
                    name: name.to_string(),
                    expected,
                    actual: args.len(),
                })
            }
        };

        match name {
            "NOW" => {
                arity("0", args.is_empty())?;
                Ok(match dialect {
                    Dialect::Postgres => "NOW()",
                    Dialect::Sqlite | Dialect::Libsql => "CURRENT_TIMESTAMP",
                }
                .to_string())
            }
            "CURRENT_DATE" => {
                arity("0", args.is_empty())?;
                Ok("CURRENT_DATE".to_string())
            }
            "UUID" => {
                arity("0", args.is_empty())?;
                Ok(match dialect {
                    Dialect::Postgres => "gen_random_uuid()",
                    Dialect::Sqlite | Dialect::Libsql => "lower(hex(randomblob(16)))",
                }
                .to_string())
            }
            "LOWER" | "UPPER" | "LENGTH" => {
                arity("1", args.len() == 1)?;
                Ok(format!("{}({})", name, args[0]))
            }
            "COALESCE" => {
                arity("at least 1", !args.is_empty())?;
                Ok(format!("COALESCE({})", args.join(", ")))
            }
            _ => Err(CompileError::UnknownFunction(name.to_string())),
        }
    }

    fn join(
        &self,
        args: &[Expr],
        ctx: &CompileContext<'_>,
        separator: &str,
        empty: bool,
    ) -> Result<String, CompileError> {
        if args.is_empty() {
            return Ok(ctx.dialect.boolean_literal(empty).to_string());
        }
        let parts = args
            .iter()
            .map(|arg| self.compile(arg, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("({})", parts.join(separator)))
    }
}

impl ConditionCompiler for SqlCompiler {
    fn compile(&self, expr: &Expr, ctx: &CompileContext<'_>) -> Result<String, CompileError> {
        match expr {
            Expr::Literal { value } => Self::literal(value, ctx.dialect),
            Expr::Field { path } => {
                let segments: Vec<&str> = path.split('.').collect();
                Self::field_path(ctx, ctx.table, &segments)
            }
            Expr::Var { name } => ctx
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| CompileError::UnboundVariable(name.clone())),
            Expr::Compare { op, left, right } => Ok(format!(
                "({} {} {})",
                self.compile(left, ctx)?,
                op.as_sql(),
                self.compile(right, ctx)?
            )),
            Expr::And { args } => self.join(args, ctx, " AND ", true),
            Expr::Or { args } => self.join(args, ctx, " OR ", false),
            Expr::Not { arg } => Ok(format!("(NOT {})", self.compile(arg, ctx)?)),
            Expr::IsNull { arg } => Ok(format!("({} IS NULL)", self.compile(arg, ctx)?)),
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.compile(arg, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Self::function(name, &args, ctx.dialect)
            }
        }
    }
}
