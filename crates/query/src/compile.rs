//! Query-layer compiler.
//!
//! Turns a nested `QueryNode` into a tree of `Layer`s resolved against the
//! schema: targets are looked up, filters are normalized with variables
//! substituted, sorts are made total and the fields every layer must fetch
//! are collected.

use crate::ast::{
    Argument, CmpOp, Filter, FilterExpr, Operand, Predicate, QueryNode, Selection, SortKey,
    SortOrder, Variables,
};
use crate::sort::Comparator;
use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::schema::{Collection, Field, FieldKind, Schema};
use strata_core::{Error, Result, Value, CREATED_AT_FIELD, ID_FIELD};

/// How a layer is reached from its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// A root collection: an implicit list with no parent.
    Root,
    /// One id stored on the parent.
    Single,
    /// A list of ids stored on the parent.
    List,
    /// Child records pointing back at the parent through an inverse field.
    Foreign,
}

/// The collection a layer reads and how it is reached.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayerTarget {
    /// Target collection.
    pub collection: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Field name on the parent (the collection name for roots).
    pub field: String,
    /// Inverse field on the target, for foreign relations.
    pub inverse: Option<String>,
}

/// One compiled node of a query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Layer {
    /// Dot-joined field path from the root, unique per layer position.
    pub path: String,
    pub target: LayerTarget,
    pub filter: Option<Filter>,
    /// Total order: caller keys, then `id asc`.
    pub sort: Comparator,
    /// True when the caller supplied sort keys.
    pub explicit_sort: bool,
    pub skip: usize,
    pub show: Option<usize>,
    /// Scalar fields the caller asked for, in request order.
    pub scalars: Vec<String>,
    /// Fields needed to place records: filter, sort, inverse and the
    /// foreign-key fields of direct child relations.
    pub structural: BTreeSet<String>,
    /// Fields a record must hold before it can be placed: filter, sort and
    /// inverse fields.
    pub decide_fields: BTreeSet<String>,
    pub children: Vec<Layer>,
}

impl Layer {
    /// Returns the target collection.
    #[inline]
    pub fn collection(&self) -> &str {
        &self.target.collection
    }

    /// Returns true for layers paginated by the server: roots and foreign
    /// relations.
    #[inline]
    pub fn is_windowed(&self) -> bool {
        matches!(self.target.kind, RelationKind::Root | RelationKind::Foreign)
    }

    /// Returns true for direct relations stored on the parent.
    #[inline]
    pub fn is_direct(&self) -> bool {
        matches!(self.target.kind, RelationKind::Single | RelationKind::List)
    }

    /// Returns true if the record passes the layer filter.
    pub fn matches(&self, id: &str, record: &strata_core::Record) -> bool {
        self.filter.as_ref().map_or(true, |f| f.eval(id, record))
    }

    /// Returns true if the record holds every field the filter, sort and
    /// inverse read.
    pub fn is_decidable(&self, record: &strata_core::Record) -> bool {
        self.decide_fields
            .iter()
            .all(|f| f == ID_FIELD || record.contains_key(f))
    }

    /// Returns every field a fetch of this layer must request, id first.
    pub fn fetch_fields(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(1 + self.scalars.len() + self.structural.len());
        out.push(String::from(ID_FIELD));
        for field in self.scalars.iter().chain(self.structural.iter()) {
            if !out.contains(field) {
                out.push(field.clone());
            }
        }
        out
    }

    /// Returns true if a field is structural for this layer.
    #[inline]
    pub fn is_structural(&self, field: &str) -> bool {
        field == ID_FIELD || self.structural.contains(field)
    }

    /// Visits this layer and every descendant, depth first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Layer)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Finds a layer by path.
    pub fn find(&self, path: &str) -> Option<&Layer> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(path))
    }
}

/// Compiles a query against the schema.
///
/// Fails on the first unknown name or misuse; nothing is partially compiled.
pub fn compile(schema: &Schema, query: &QueryNode, variables: &Variables) -> Result<Layer> {
    let collection = schema.collection(&query.field)?;
    let target = LayerTarget {
        collection: query.field.clone(),
        kind: RelationKind::Root,
        field: query.field.clone(),
        inverse: None,
    };
    let layer = compile_node(schema, collection, target, query, variables, query.field.clone())?;
    tracing::trace!(path = %layer.path, "compiled query");
    Ok(layer)
}

fn compile_node(
    schema: &Schema,
    collection: &Collection,
    target: LayerTarget,
    node: &QueryNode,
    variables: &Variables,
    path: String,
) -> Result<Layer> {
    let sliced = !node.sort.is_empty() || node.skip > 0 || node.show.is_some();
    if target.kind == RelationKind::Single && sliced {
        return Err(Error::bad_query(format!(
            "{}: single relations cannot be sorted or sliced",
            path
        )));
    }

    let filter = node
        .filter
        .as_ref()
        .map(|expr| normalize(collection, expr, variables))
        .transpose()?;

    let explicit_sort = !node.sort.is_empty();
    let mut keys = if explicit_sort {
        node.sort.clone()
    } else {
        alloc::vec![SortKey::desc(CREATED_AT_FIELD)]
    };
    for key in &keys {
        check_orderable(collection, &key.field)?;
    }
    if !keys.iter().any(|k| k.field == ID_FIELD) {
        keys.push(SortKey {
            field: String::from(ID_FIELD),
            order: SortOrder::Asc,
        });
    }
    let sort = Comparator::new(keys);

    let mut decide_fields = BTreeSet::new();
    if let Some(filter) = &filter {
        filter.collect_fields(&mut decide_fields);
    }
    // Direct relations keep their stored order unless sorted explicitly.
    if explicit_sort || matches!(target.kind, RelationKind::Root | RelationKind::Foreign) {
        decide_fields.extend(sort.fields().map(String::from));
    }
    if let Some(inverse) = &target.inverse {
        decide_fields.insert(inverse.clone());
    }
    decide_fields.remove(ID_FIELD);
    let mut structural = decide_fields.clone();

    let mut scalars = Vec::new();
    let mut children = Vec::new();
    for selection in &node.selections {
        match selection {
            Selection::Field(name) => {
                let field = collection.field(name)?;
                if !field.is_scalar() {
                    return Err(Error::bad_query(format!(
                        "{}.{} is a relation and needs a nested selection",
                        path, name
                    )));
                }
                if name != ID_FIELD && !scalars.contains(name) {
                    scalars.push(name.clone());
                }
            }
            Selection::Relation(child) => {
                let field = collection.field(&child.field)?;
                let child_target = relation_target(collection, field, &path)?;
                if child_target.kind != RelationKind::Foreign {
                    structural.insert(child.field.clone());
                }
                let child_collection = schema.collection(&child_target.collection)?;
                let child_path = format!("{}.{}", path, child.field);
                if children.iter().any(|c: &Layer| c.path == child_path) {
                    return Err(Error::bad_query(format!("{} is selected twice", child_path)));
                }
                children.push(compile_node(
                    schema,
                    child_collection,
                    child_target,
                    child,
                    variables,
                    child_path,
                )?);
            }
        }
    }

    Ok(Layer {
        path,
        target,
        filter,
        sort,
        explicit_sort,
        skip: node.skip,
        show: node.show,
        scalars,
        structural,
        decide_fields,
        children,
    })
}

fn relation_target(collection: &Collection, field: &Field, path: &str) -> Result<LayerTarget> {
    let FieldKind::Relation(rel) = field.kind() else {
        return Err(Error::bad_query(format!(
            "{}.{} is a scalar and cannot be nested",
            path,
            field.name()
        )));
    };
    let kind = match (&rel.inverse, rel.list) {
        (Some(_), _) => RelationKind::Foreign,
        (None, true) => RelationKind::List,
        (None, false) => RelationKind::Single,
    };
    tracing::trace!(
        collection = collection.name(),
        field = field.name(),
        ?kind,
        "resolved relation"
    );
    Ok(LayerTarget {
        collection: rel.target.clone(),
        kind,
        field: String::from(field.name()),
        inverse: rel.inverse.clone(),
    })
}

/// Sort and filter fields must be stored scalars or single relations.
fn check_orderable<'a>(collection: &'a Collection, name: &str) -> Result<&'a Field> {
    let field = collection.field(name)?;
    match field.relation() {
        Some(rel) if rel.list || rel.is_foreign() => Err(Error::bad_query(format!(
            "{}.{} is a list relation and cannot be filtered or sorted on",
            collection.name(),
            name
        ))),
        _ => Ok(field),
    }
}

fn normalize(collection: &Collection, expr: &FilterExpr, variables: &Variables) -> Result<Filter> {
    match expr {
        FilterExpr::And(children) => Ok(Filter::all(
            children
                .iter()
                .map(|c| normalize(collection, c, variables))
                .collect::<Result<Vec<_>>>()?,
        )),
        FilterExpr::Or(children) => Ok(Filter::any(
            children
                .iter()
                .map(|c| normalize(collection, c, variables))
                .collect::<Result<Vec<_>>>()?,
        )),
        FilterExpr::Not(inner) => Ok(Filter::negate(normalize(collection, inner, variables)?)),
        FilterExpr::Compare { field, op, operand } => {
            let def = check_orderable(collection, field)?;
            let arg = match operand {
                Operand::Literal(arg) => arg.clone(),
                Operand::Variable(name) => variables
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::bad_query(format!("unbound variable ${}", name)))?,
            };
            let arg = bind_argument(def, *op, arg)?;
            Ok(Filter::Leaf(Predicate {
                field: field.clone(),
                op: *op,
                arg,
            }))
        }
    }
}

/// Decodes an argument for the field it is compared with, so that
/// `"p1"` compares equal to a stored reference and epoch numbers to dates.
fn bind_argument(field: &Field, op: CmpOp, arg: Argument) -> Result<Argument> {
    let decode = |v: Value| -> Result<Value> {
        if field.name() == ID_FIELD {
            return Ok(v);
        }
        field
            .decode(v)
            .map_err(|e| Error::bad_query(format!("{}", e)))
    };
    match (op, arg) {
        (CmpOp::In, Argument::Many(values)) => Ok(Argument::Many(
            values.into_iter().map(decode).collect::<Result<Vec<_>>>()?,
        )),
        (CmpOp::In, Argument::One(_)) => Err(Error::bad_query(format!(
            "{} in needs a list of values",
            field.name()
        ))),
        (CmpOp::Like, Argument::One(Value::String(pattern))) => {
            Ok(Argument::One(Value::String(pattern)))
        }
        (CmpOp::Like, _) => Err(Error::bad_query(format!(
            "{} like needs a string pattern",
            field.name()
        ))),
        (op, Argument::Many(_)) => Err(Error::bad_query(format!(
            "{} {} needs a single value",
            field.name(),
            op.name()
        ))),
        (_, Argument::One(v)) => Ok(Argument::One(decode(v)?)),
    }
}
