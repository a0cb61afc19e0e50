//! Structured expression trees.
//!
//! Access-control conditions and computed column defaults are both written as
//! [`Expr`] trees in the schema document. The core never interprets them; it
//! compares them structurally and hands them to a
//! [`ConditionCompiler`](crate::compiler::ConditionCompiler).

use serde::{Deserialize, Serialize};

/// Comparison operators usable in a [`Expr::Compare`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Returns the SQL operator text.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// A node of an expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// A JSON scalar literal (string, number, boolean or null).
    Literal {
        /// The literal value.
        value: serde_json::Value,
    },
    /// A reference to a field of the current table.
    ///
    /// Dotted paths (`author_id.org_id`) follow foreign keys: every segment
    /// but the last must be a foreign-key field.
    Field {
        /// Field path.
        path: String,
    },
    /// A bound variable such as `auth.uid`.
    Var {
        /// Variable name.
        name: String,
    },
    /// A binary comparison.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Conjunction of all arguments.
    And {
        /// Operands.
        args: Vec<Expr>,
    },
    /// Disjunction of all arguments.
    Or {
        /// Operands.
        args: Vec<Expr>,
    },
    /// Negation.
    Not {
        /// Operand.
        arg: Box<Expr>,
    },
    /// `IS NULL` test.
    IsNull {
        /// Operand.
        arg: Box<Expr>,
    },
    /// A function call.
    Call {
        /// Function name.
        name: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Creates a literal node.
    #[must_use]
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    /// Creates a field reference.
    #[must_use]
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field { path: path.into() }
    }

    /// Creates a bound variable reference.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var { name: name.into() }
    }

    /// Creates a function call.
    #[must_use]
    pub fn call(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Call {
            name: name.into(),
            args,
        }
    }

    /// Creates a comparison.
    #[must_use]
    pub fn compare(op: CompareOp, left: Self, right: Self) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Shorthand for an equality comparison.
    #[must_use]
    pub fn equals(left: Self, right: Self) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }
}

/// Uppercases the names of function calls so the compiler sees canonical
/// casing (`now` becomes `NOW`).
///
/// Only `Call` nodes and their arguments are visited. Any other node is
/// returned unchanged, including calls nested under comparisons or boolean
/// operators. Custom functions with case-sensitive names are altered too.
#[must_use]
pub fn normalize_function_names(expr: &Expr) -> Expr {
    match expr {
        Expr::Call { name, args } => Expr::Call {
            name: name.to_uppercase(),
            args: args.iter().map(normalize_function_names).collect(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_uppercases_nested_calls() {
        let expr = Expr::call(
            "coalesce",
            vec![Expr::field("nickname"), Expr::call("lower", vec![Expr::field("email")])],
        );
        let normalized = normalize_function_names(&expr);
        assert_eq!(
            normalized,
            Expr::call(
                "COALESCE",
                vec![Expr::field("nickname"), Expr::call("LOWER", vec![Expr::field("email")])],
            )
        );
    }

    #[test]
    fn test_normalize_leaves_other_shapes_alone() {
        let expr = Expr::equals(Expr::call("now", vec![]), Expr::var("auth.uid"));
        assert_eq!(normalize_function_names(&expr), expr);

        let field = Expr::field("now");
        assert_eq!(normalize_function_names(&field), field);
    }

    #[test]
    fn test_expr_json_shape() {
        let expr: Expr = serde_json::from_value(json!({
            "kind": "compare",
            "op": "eq",
            "left": {"kind": "field", "path": "owner_id"},
            "right": {"kind": "var", "name": "auth.uid"}
        }))
        .unwrap();
        assert_eq!(
            expr,
            Expr::equals(Expr::field("owner_id"), Expr::var("auth.uid"))
        );

        let call: Expr = serde_json::from_value(json!({"kind": "call", "name": "now"})).unwrap();
        assert_eq!(call, Expr::call("now", vec![]));
    }
}
