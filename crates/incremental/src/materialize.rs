//! Materialization of live query results.
//!
//! A result is a tree of `Node`s built from the combined tier. The root is a
//! list of records; each record carries its id, the requested scalars and
//! one entry per nested relation.

use crate::book::WindowBook;
use crate::select::{select_ids, Parent, Unsatisfied};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{field_value, ChangeMap, Record, RecordId, Value, ID_FIELD};
use strata_query::{Layer, RelationKind};
use strata_store::RecordStore;

/// One node of a materialized result.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Null,
    Scalar(Value),
    Record {
        id: RecordId,
        fields: BTreeMap<String, Node>,
    },
    List(Vec<Node>),
}

impl Node {
    /// Wraps a field value; `Value::Null` becomes `Node::Null`.
    pub fn from_value(value: Value) -> Self {
        if value.is_null() {
            Node::Null
        } else {
            Node::Scalar(value)
        }
    }

    /// Returns the id of a record node.
    pub fn id(&self) -> Option<&str> {
        match self {
            Node::Record { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Returns a field of a record node.
    pub fn get(&self, field: &str) -> Option<&Node> {
        match self {
            Node::Record { fields, .. } => fields.get(field),
            _ => None,
        }
    }

    /// Returns the items of a list node.
    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the scalar value of a scalar node.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the ids of the records of a list node, in order.
    pub fn ids(&self) -> Vec<&str> {
        self.as_list()
            .map(|items| items.iter().filter_map(Node::id).collect())
            .unwrap_or_default()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }
}

/// Materializes a compiled query from the store.
///
/// Fails with the first window or record that cannot be resolved from what
/// the store holds.
pub fn materialize(layer: &Layer, store: &RecordStore, book: &WindowBook) -> Result<Node, Unsatisfied> {
    rows(layer, Parent::Root, store, book)
}

fn rows(
    layer: &Layer,
    parent: Parent<'_>,
    store: &RecordStore,
    book: &WindowBook,
) -> Result<Node, Unsatisfied> {
    let ids = select_ids(layer, parent, store, book)?;
    match layer.target.kind {
        RelationKind::Single => match ids.first() {
            Some(id) => record(layer, id, store, book),
            None => Ok(Node::Null),
        },
        _ => ids
            .iter()
            .map(|id| record(layer, id, store, book))
            .collect::<Result<Vec<_>, _>>()
            .map(Node::List),
    }
}

fn record(layer: &Layer, id: &str, store: &RecordStore, book: &WindowBook) -> Result<Node, Unsatisfied> {
    let collection = layer.collection();
    let Some(values) = store.combined(collection, id) else {
        return Ok(Node::Null);
    };
    let mut fields = BTreeMap::new();
    fields.insert(String::from(ID_FIELD), Node::Scalar(Value::String(id.into())));
    for name in &layer.scalars {
        fields.insert(name.clone(), scalar(id, values, name));
    }
    let parent = Parent::Row { collection, id };
    for child in &layer.children {
        fields.insert(child.target.field.clone(), rows(child, parent, store, book)?);
    }
    Ok(Node::Record { id: id.into(), fields })
}

fn scalar(id: &str, values: &Record, field: &str) -> Node {
    Node::from_value(field_value(id, values, field).to_value())
}

/// Rewrites the requested scalars of materialized records whose fields
/// changed, leaving rows and relations in place.
///
/// Returns true if any field changed.
pub fn refresh_scalars(layer: &Layer, node: &mut Node, store: &RecordStore, changes: &ChangeMap) -> bool {
    match node {
        Node::List(items) => items
            .iter_mut()
            .fold(false, |changed, item| refresh_record(layer, item, store, changes) | changed),
        Node::Record { .. } => refresh_record(layer, node, store, changes),
        Node::Null | Node::Scalar(_) => false,
    }
}

fn refresh_record(layer: &Layer, node: &mut Node, store: &RecordStore, changes: &ChangeMap) -> bool {
    let Node::Record { id, fields } = node else {
        return false;
    };
    let collection = layer.collection();
    let mut changed = false;
    if let (Some(touched), Some(values)) = (changes.fields(collection, id), store.combined(collection, id)) {
        for name in layer.scalars.iter().filter(|name| touched.contains(*name)) {
            let fresh = scalar(id, values, name);
            if fields.get(name) != Some(&fresh) {
                fields.insert(name.clone(), fresh);
                changed = true;
            }
        }
    }
    for child in &layer.children {
        if let Some(nested) = fields.get_mut(&child.target.field) {
            changed |= refresh_scalars(child, nested, store, changes);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Window, WindowAnchor, WindowKey};
    use crate::select::MissReason;
    use alloc::vec;
    use strata_core::schema::{CollectionBuilder, Schema};
    use strata_core::ScalarType;
    use strata_query::{compile, QueryNode, SortKey, Variables};
    use strata_store::{ClientEdit, ServerWrite};

    fn schema() -> Schema {
        let people = CollectionBuilder::new("people")
            .unwrap()
            .scalar("firstName", ScalarType::String)
            .unwrap()
            .single("bestFriend", "people")
            .unwrap()
            .build();
        Schema::new(vec![people]).unwrap()
    }

    fn person(id: &str, name: &str, friend: Option<&str>) -> ServerWrite {
        let mut fields = Record::new();
        fields.insert("firstName".into(), Value::from(name));
        fields.insert(
            "bestFriend".into(),
            friend.map_or(Value::Null, |f| Value::Ref(f.into())),
        );
        ServerWrite::present("people", id, fields)
    }

    fn layer() -> Layer {
        let query = QueryNode::new("people")
            .sort(SortKey::asc("firstName"))
            .select(&["firstName"])
            .relation(QueryNode::new("bestFriend").select(&["firstName"]));
        compile(&schema(), &query, &Variables::new()).unwrap()
    }

    fn store() -> RecordStore {
        let mut store = RecordStore::new();
        store
            .set_server(
                &schema(),
                vec![person("b", "Delphia", Some("c")), person("c", "Ena", None)],
            )
            .unwrap();
        store
    }

    fn book() -> WindowBook {
        let mut book = WindowBook::new();
        book.set_anchor(
            WindowKey::root("people"),
            WindowAnchor::from_response(Window::new(0, None), &["b".into(), "c".into()]),
        );
        book
    }

    #[test]
    fn test_materialize_nested() {
        let node = materialize(&layer(), &store(), &book()).unwrap();
        assert_eq!(node.ids(), ["b", "c"]);

        let delphia = &node.as_list().unwrap()[0];
        assert_eq!(delphia.get("firstName").unwrap().as_value(), Some(&Value::from("Delphia")));
        assert_eq!(delphia.get("bestFriend").unwrap().id(), Some("c"));
        assert!(node.as_list().unwrap()[1].get("bestFriend").unwrap().is_null());
    }

    #[test]
    fn test_unknown_reference() {
        let mut store = store();
        store
            .set_server(&schema(), vec![person("c", "Ena", Some("z"))])
            .unwrap();
        let err = materialize(&layer(), &store, &book()).unwrap_err();
        assert_eq!(err.reason, MissReason::RecordUnknown);
        assert_eq!(err.key, WindowKey::new("people.bestFriend", Some("c")));
    }

    #[test]
    fn test_refresh_scalars() {
        let mut store = store();
        let mut node = materialize(&layer(), &store, &book()).unwrap();
        let changes = store
            .set_client(&schema(), vec![ClientEdit::set("people", "c", "firstName", "Enid")])
            .unwrap();

        assert!(refresh_scalars(&layer(), &mut node, &store, &changes));
        assert_eq!(node, materialize(&layer(), &store, &book()).unwrap());
        assert!(!refresh_scalars(&layer(), &mut node, &store, &changes));
    }
}
