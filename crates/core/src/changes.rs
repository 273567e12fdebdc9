//! Field-level change maps.
//!
//! Every mutation of the record store reports the fields whose combined
//! value changed as `collection -> id -> {field}`. A record that becomes
//! visible or hidden, or whose diff status or server placement changes,
//! marks the pseudo-field `id`.

use crate::record::{RecordId, ID_FIELD};
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;

/// Changed fields grouped by collection and record id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeMap {
    collections: BTreeMap<String, BTreeMap<RecordId, BTreeSet<String>>>,
}

impl ChangeMap {
    /// Creates an empty change map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a field of a record as changed.
    pub fn mark(&mut self, collection: &str, id: &str, field: &str) {
        self.collections
            .entry(collection.into())
            .or_default()
            .entry(id.into())
            .or_default()
            .insert(field.into());
    }

    /// Marks a visibility flip or a placement change of a record.
    #[inline]
    pub fn mark_visibility(&mut self, collection: &str, id: &str) {
        self.mark(collection, id, ID_FIELD);
    }

    /// Returns true if nothing changed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Returns true if the given field changed.
    pub fn contains(&self, collection: &str, id: &str, field: &str) -> bool {
        self.fields(collection, id)
            .is_some_and(|fields| fields.contains(field))
    }

    /// Returns true if any record of the collection changed.
    pub fn touches(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    /// Returns the changed fields of one record.
    pub fn fields(&self, collection: &str, id: &str) -> Option<&BTreeSet<String>> {
        self.collections.get(collection)?.get(id)
    }

    /// Returns the changed records of one collection.
    pub fn records(&self, collection: &str) -> Option<&BTreeMap<RecordId, BTreeSet<String>>> {
        self.collections.get(collection)
    }

    /// Iterates over `(collection, id, fields)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &BTreeSet<String>)> {
        self.collections.iter().flat_map(|(collection, records)| {
            records
                .iter()
                .map(move |(id, fields)| (collection.as_str(), id.as_str(), fields))
        })
    }

    /// Iterates over the names of the touched collections.
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(|k| k.as_str())
    }

    /// Merges another change map into this one.
    pub fn merge(&mut self, other: ChangeMap) {
        for (collection, records) in other.collections {
            let target = self.collections.entry(collection).or_default();
            for (id, fields) in records {
                target.entry(id).or_default().extend(fields);
            }
        }
    }

    /// Returns the number of changed records across collections.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(|records| records.len()).sum()
    }
}
