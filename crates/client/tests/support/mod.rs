//! An in-memory server answering session requests from their JSON
//! variables, plus the reference results live queries are checked against.

#![allow(dead_code)]

use std::collections::BTreeMap;
use strata_client::wire::{decode_filter, decode_record, encode_record};
use strata_client::{Outgoing, RawRecord, Response, Session, Transport, WireRequest};
use strata_core::schema::{CollectionBuilder, Schema};
use strata_core::{Record, Result, ScalarType, Value};
use strata_incremental::Node;
use strata_query::Layer;
use strata_store::ClientEntry;

/// People with posts; posts point at their author and an editor.
pub fn schema() -> Schema {
    let people = CollectionBuilder::new("people")
        .unwrap()
        .scalar("firstName", ScalarType::String)
        .unwrap()
        .foreign("posts", "posts", "author")
        .unwrap()
        .build();
    let posts = CollectionBuilder::new("posts")
        .unwrap()
        .scalar("title", ScalarType::String)
        .unwrap()
        .single("author", "people")
        .unwrap()
        .single("editor", "people")
        .unwrap()
        .build();
    Schema::new(vec![people, posts]).unwrap()
}

pub struct MemoryServer {
    schema: Schema,
    tables: BTreeMap<String, BTreeMap<String, Record>>,
    /// Batches answered so far.
    pub calls: usize,
    /// Requests answered so far.
    pub requests: usize,
    /// Fails every request while set.
    pub offline: bool,
}

impl MemoryServer {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            tables: BTreeMap::new(),
            calls: 0,
            requests: 0,
            offline: false,
        }
    }

    /// Stores a record, decoded the way the cache decodes it.
    pub fn put(&mut self, collection: &str, raw: RawRecord) {
        let def = self.schema.collection(collection).unwrap();
        let record = decode_record(&self.schema, collection, &raw)
            .unwrap()
            .into_iter()
            .map(|(name, value)| {
                let value = def.field(&name).unwrap().decode(value).unwrap();
                (name, value)
            })
            .collect();
        self.tables
            .entry(collection.to_string())
            .or_default()
            .insert(raw.id, record);
    }

    pub fn person(mut self, id: &str, name: Option<&str>) -> Self {
        self.put("people", RawRecord::new(id).with("firstName", name));
        self
    }

    pub fn post(mut self, id: &str, title: &str, author: &str) -> Self {
        self.put(
            "posts",
            RawRecord::new(id).with("title", title).with("author", author),
        );
        self
    }

    pub fn remove(&mut self, collection: &str, id: &str) {
        if let Some(table) = self.tables.get_mut(collection) {
            table.remove(id);
        }
    }

    pub fn table(&self, collection: &str) -> BTreeMap<String, Record> {
        self.tables.get(collection).cloned().unwrap_or_default()
    }

    fn answer(&self, outgoing: &Outgoing) -> Result<Vec<RawRecord>> {
        let wire = WireRequest::from_json(&outgoing.variables)?;
        let def = self.schema.collection(&wire.collection)?;
        let empty = BTreeMap::new();
        let table = self.tables.get(&wire.collection).unwrap_or(&empty);

        let rows: Vec<(&String, &Record)> = match &wire.ids {
            Some(ids) => ids.iter().filter_map(|id| table.get_key_value(id)).collect(),
            None => {
                let filter = wire.filter.as_ref().map(|f| decode_filter(def, f)).transpose()?;
                let sort = wire.comparator();
                let mut rows: Vec<_> = table
                    .iter()
                    .filter(|(id, record)| filter.as_ref().map_or(true, |f| f.eval(id, record)))
                    .filter(|(_, record)| {
                        wire.parent.as_ref().map_or(true, |parent| {
                            record.get(&parent.field) == Some(&Value::Ref(parent.id.clone()))
                        })
                    })
                    .collect();
                rows.sort_by(|a, b| sort.compare(a.0, a.1, b.0, b.1));
                rows.into_iter()
                    .skip(wire.skip)
                    .take(wire.show.unwrap_or(usize::MAX))
                    .collect()
            }
        };
        rows.into_iter()
            .map(|(id, record)| encode_record(&self.schema, &wire.collection, id, record, &wire.fields))
            .collect()
    }
}

impl Transport for MemoryServer {
    fn fetch(&mut self, batch: &[Outgoing]) -> Vec<Response> {
        self.calls += 1;
        self.requests += batch.len();
        batch
            .iter()
            .map(|outgoing| if self.offline { None } else { self.answer(outgoing).ok() })
            .collect()
    }
}

/// The ids a full re-fetch of a root layer would show: server truth with
/// the session's local edits laid over it, filtered, sorted and sliced.
pub fn expected_ids(server: &MemoryServer, session: &Session, layer: &Layer) -> Vec<String> {
    let collection = layer.collection();
    let truth = server.table(collection);
    let mut combined: BTreeMap<String, Record> = truth.clone();

    if let Some(store) = session.store().collection(collection) {
        for (id, entry) in store.client_entries() {
            match entry {
                ClientEntry::Deleted => {
                    combined.remove(id);
                }
                ClientEntry::Override(fields) => {
                    let mut record = truth.get(id).cloned().unwrap_or_default();
                    record.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                    combined.insert(id.clone(), record);
                }
            }
        }
    }

    let mut rows: Vec<_> = combined
        .iter()
        .filter(|(id, record)| layer.matches(id, record))
        .collect();
    rows.sort_by(|a, b| layer.sort.compare(a.0, a.1, b.0, b.1));
    rows.into_iter()
        .skip(layer.skip)
        .take(layer.show.unwrap_or(usize::MAX))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Reads the `firstName` of every row of a list result.
pub fn names(node: &Node) -> Vec<String> {
    node.as_list()
        .unwrap()
        .iter()
        .map(|row| {
            row.get("firstName")
                .and_then(Node::as_value)
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string()
        })
        .collect()
}
