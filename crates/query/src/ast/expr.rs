//! Filter expression AST definitions.
//!
//! These are the filter expressions a caller writes. Operands may be
//! literals or named variables; the compiler substitutes variables and
//! normalizes the tree into a `Filter`.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::Value;

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Membership in a list of values.
    In,
    /// Pattern match with `%` and `_` wildcards.
    Like,
}

impl CmpOp {
    /// Returns the operator name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
            CmpOp::In => "in",
            CmpOp::Like => "like",
        }
    }
}

/// A bound argument: a single value or a list of values for `In`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Argument {
    One(Value),
    Many(Vec<Value>),
}

impl Argument {
    /// Returns the single value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Argument::One(v) => Some(v),
            Argument::Many(_) => None,
        }
    }
}

impl From<Vec<Value>> for Argument {
    fn from(values: Vec<Value>) -> Self {
        Argument::Many(values)
    }
}

/// Right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A literal argument.
    Literal(Argument),
    /// A named variable bound at compile time.
    Variable(String),
}

impl Operand {
    /// Creates a literal operand.
    pub fn literal(value: impl Into<Value>) -> Self {
        Operand::Literal(Argument::One(value.into()))
    }

    /// Creates a literal list operand.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Operand::Literal(Argument::Many(values.into_iter().map(Into::into).collect()))
    }

    /// Creates a variable operand.
    pub fn var(name: impl Into<String>) -> Self {
        Operand::Variable(name.into())
    }
}

macro_rules! impl_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Argument {
                fn from(v: $t) -> Self {
                    Argument::One(v.into())
                }
            }

            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Operand::literal(v)
                }
            }
        )*
    };
}

impl_from_scalar!(Value, bool, i32, i64, f64, String, &str);

/// Filter expression AST node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FilterExpr {
    /// All children must hold.
    And(Vec<FilterExpr>),
    /// At least one child must hold.
    Or(Vec<FilterExpr>),
    /// Negation.
    Not(Box<FilterExpr>),
    /// Compares a field of the record to an operand.
    Compare {
        field: String,
        op: CmpOp,
        operand: Operand,
    },
}

impl FilterExpr {
    /// Creates a comparison.
    pub fn compare(field: impl Into<String>, op: CmpOp, operand: impl Into<Operand>) -> Self {
        FilterExpr::Compare {
            field: field.into(),
            op,
            operand: operand.into(),
        }
    }

    /// Creates an equality comparison.
    pub fn eq(field: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::compare(field, CmpOp::Eq, operand)
    }

    /// Creates a not-equal comparison.
    pub fn ne(field: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::compare(field, CmpOp::Ne, operand)
    }

    /// Creates a less-than comparison.
    pub fn lt(field: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::compare(field, CmpOp::Lt, operand)
    }

    /// Creates a less-than-or-equal comparison.
    pub fn le(field: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::compare(field, CmpOp::Le, operand)
    }

    /// Creates a greater-than comparison.
    pub fn gt(field: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::compare(field, CmpOp::Gt, operand)
    }

    /// Creates a greater-than-or-equal comparison.
    pub fn ge(field: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::compare(field, CmpOp::Ge, operand)
    }

    /// Creates a membership test.
    pub fn in_list(field: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::compare(field, CmpOp::In, operand)
    }

    /// Creates a pattern match.
    pub fn like(field: impl Into<String>, pattern: impl Into<Operand>) -> Self {
        Self::compare(field, CmpOp::Like, pattern)
    }

    /// Creates a conjunction.
    pub fn and(children: Vec<FilterExpr>) -> Self {
        FilterExpr::And(children)
    }

    /// Creates a disjunction.
    pub fn or(children: Vec<FilterExpr>) -> Self {
        FilterExpr::Or(children)
    }

    /// Creates a negation.
    pub fn not(inner: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_builders() {
        let expr = FilterExpr::and(vec![
            FilterExpr::eq("firstName", "Ena"),
            FilterExpr::gt("age", Operand::var("minAge")),
        ]);
        match expr {
            FilterExpr::And(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(
                    children[0],
                    FilterExpr::Compare {
                        field: "firstName".into(),
                        op: CmpOp::Eq,
                        operand: Operand::Literal(Argument::One(Value::from("Ena"))),
                    }
                );
            }
            _ => panic!("expected And"),
        }
    }

    #[test]
    fn test_list_operand() {
        let op = Operand::list(["a", "b"]);
        assert_eq!(
            op,
            Operand::Literal(Argument::Many(vec![Value::from("a"), Value::from("b")]))
        );
    }
}
