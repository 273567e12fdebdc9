//! AST module for query descriptions, filters and predicates.

mod expr;
mod predicate;
mod query;

pub use expr::{Argument, CmpOp, FilterExpr, Operand};
pub use predicate::{like, Filter, Predicate};
pub use query::{QueryNode, Selection, SortKey, SortOrder, Variables};
