//! Nested query descriptions.

use crate::ast::expr::{Argument, FilterExpr};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// Sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One sort key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

impl SortKey {
    /// Creates an ascending sort key.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    /// Creates a descending sort key.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// A selection inside a query node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Selection {
    /// A scalar field.
    Field(String),
    /// A nested relation.
    Relation(QueryNode),
}

/// A node of a nested query description.
///
/// The root node names a collection; nested nodes name a relation field of
/// the parent's collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryNode {
    pub field: String,
    pub filter: Option<FilterExpr>,
    pub sort: Vec<SortKey>,
    pub skip: usize,
    pub show: Option<usize>,
    pub selections: Vec<Selection>,
}

impl QueryNode {
    /// Creates a query node with no arguments or selections.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            filter: None,
            sort: Vec::new(),
            skip: 0,
            show: None,
            selections: Vec::new(),
        }
    }

    /// Sets the filter.
    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Sets the number of leading records to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of records to show.
    pub fn show(mut self, show: usize) -> Self {
        self.show = Some(show);
        self
    }

    /// Selects scalar fields.
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.selections
            .extend(fields.iter().map(|f| Selection::Field((*f).into())));
        self
    }

    /// Selects a nested relation.
    pub fn relation(mut self, node: QueryNode) -> Self {
        self.selections.push(Selection::Relation(node));
        self
    }

    /// Returns true if the node carries slice, sort or filter arguments.
    pub fn has_args(&self) -> bool {
        self.filter.is_some() || !self.sort.is_empty() || self.skip > 0 || self.show.is_some()
    }
}

/// Variable bindings for a query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Variables {
    values: BTreeMap<String, Argument>,
}

impl Variables {
    /// Creates empty bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Argument>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Looks up a variable.
    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.values.get(name)
    }

    /// Iterates over the bindings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
