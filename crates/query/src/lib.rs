//! Strata Query - Query descriptions and the query-layer compiler.
//!
//! This crate provides:
//!
//! - `ast`: nested query descriptions, filter expressions and normalized
//!   filters
//! - `sort`: the record comparator used to order layers
//! - `compile`: the compiler turning a query into a `Layer` tree
//! - `fingerprint`: stable hashes of query shapes

#![no_std]

extern crate alloc;

pub mod ast;
pub mod compile;
pub mod fingerprint;
pub mod sort;

pub use ast::{
    Argument, CmpOp, Filter, FilterExpr, Operand, Predicate, QueryNode, Selection, SortKey,
    SortOrder, Variables,
};
pub use compile::{compile, Layer, LayerTarget, RelationKind};
pub use fingerprint::fingerprint;
pub use sort::{Comparator, SortValue};
