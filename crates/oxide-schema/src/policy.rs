//! Row-level security policy generation.
//!
//! Only dialects with native policies get any output. For every table with
//! changed access control the block enables row-level security, drops all
//! four policies unconditionally and recreates the ones that changed, so
//! replaying the block is idempotent.

use std::collections::BTreeMap;

use crate::compiler::{CompileContext, ConditionCompiler, SchemaShape};
use crate::diff::AccessControlChange;
use crate::dialect::Dialect;
use crate::error::{Result, SchemaError};
use crate::schema::{Condition, Operation};

/// Returns the policy name for `table` and `op`.
#[must_use]
pub fn policy_name(table: &str, op: Operation) -> String {
    format!("{}_{}", table, op.as_str())
}

/// Policy statement generator bound to one target snapshot.
pub struct PolicyWriter<'a, C: ?Sized> {
    compiler: &'a C,
    dialect: Dialect,
    shape: &'a SchemaShape<'a>,
    variables: &'a BTreeMap<String, String>,
}

impl<'a, C: ConditionCompiler + ?Sized> PolicyWriter<'a, C> {
    /// Creates a writer.
    #[must_use]
    pub const fn new(
        compiler: &'a C,
        dialect: Dialect,
        shape: &'a SchemaShape<'a>,
        variables: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            compiler,
            dialect,
            shape,
            variables,
        }
    }

    /// Generates the policy block for one table.
    ///
    /// Returns no statements on dialects without row-level policies.
    pub fn statements(&self, change: &AccessControlChange) -> Result<Vec<String>> {
        if !self.dialect.supports_policies() {
            return Ok(Vec::new());
        }

        let table = change.table.as_str();
        let quoted = self.dialect.quote_identifier(table);

        // Compile first so a failing predicate leaves nothing half-written.
        let creates = change
            .changes()
            .map(|(op, condition)| -> Result<String> {
                let predicate = self.predicate(table, op, &condition.to)?;
                Ok(self.create_policy(table, op, &predicate))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut statements = Vec::with_capacity(1 + Operation::ALL.len() + creates.len());
        statements.push(format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", quoted));
        for op in Operation::ALL {
            statements.push(format!(
                "DROP POLICY IF EXISTS {} ON {}",
                self.dialect.quote_identifier(&policy_name(table, op)),
                quoted
            ));
        }
        statements.extend(creates);
        Ok(statements)
    }

    fn predicate(&self, table: &str, op: Operation, condition: &Condition) -> Result<String> {
        match condition {
            Condition::Literal(value) => Ok(self.dialect.boolean_literal(*value).to_string()),
            Condition::Expr(expr) => {
                let ctx = CompileContext {
                    dialect: self.dialect,
                    table,
                    shape: self.shape,
                    variables: self.variables,
                };
                self.compiler
                    .compile(expr, &ctx)
                    .map_err(|source| SchemaError::PolicyCompile {
                        table: table.to_string(),
                        operation: op,
                        source,
                    })
            }
        }
    }

    fn create_policy(&self, table: &str, op: Operation, predicate: &str) -> String {
        let clause = match op {
            Operation::Read => format!("FOR SELECT USING ({})", predicate),
            Operation::Create => format!("FOR INSERT WITH CHECK ({})", predicate),
            Operation::Update => format!(
                "FOR UPDATE USING ({}) WITH CHECK ({})",
                predicate, predicate
            ),
            Operation::Delete => format!("FOR DELETE USING ({})", predicate),
        };
        format!(
            "CREATE POLICY {} ON {} {}",
            self.dialect.quote_identifier(&policy_name(table, op)),
            self.dialect.quote_identifier(table),
            clause
        )
    }
}
