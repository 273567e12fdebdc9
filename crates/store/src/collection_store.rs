//! Record storage for a single collection.
//!
//! This module provides the `CollectionStore` struct which holds the three
//! tiers of one collection (server, client overlay, combined) plus the diff
//! status of every locally edited record.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::vec::Vec;
use hashbrown::HashMap;
use strata_core::{is_new_id, DiffStatus, Error, Record, RecordId, Result, Value};

/// Last known authoritative state of a record.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEntry {
    /// The server confirmed the record is deleted.
    Deleted,
    /// The server returned these fields.
    Present(Record),
}

impl ServerEntry {
    /// Returns the server record if present.
    #[inline]
    pub fn record(&self) -> Option<&Record> {
        match self {
            ServerEntry::Present(record) => Some(record),
            ServerEntry::Deleted => None,
        }
    }
}

/// Local overlay of a record.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEntry {
    /// Deleted locally, whatever the server says.
    Deleted,
    /// Field-level overrides applied over the server record.
    Override(Record),
}

impl ClientEntry {
    /// Returns the overridden fields if this is an override.
    #[inline]
    pub fn fields(&self) -> Option<&Record> {
        match self {
            ClientEntry::Override(fields) => Some(fields),
            ClientEntry::Deleted => None,
        }
    }
}

/// Storage for one collection.
#[derive(Clone, Debug, Default)]
pub struct CollectionStore {
    server: HashMap<RecordId, ServerEntry>,
    client: HashMap<RecordId, ClientEntry>,
    combined: HashMap<RecordId, Record>,
    diff: BTreeMap<RecordId, DiffStatus>,
}

impl CollectionStore {
    /// Creates an empty collection store.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn server(&self, id: &str) -> Option<&ServerEntry> {
        self.server.get(id)
    }

    #[inline]
    pub fn client(&self, id: &str) -> Option<&ClientEntry> {
        self.client.get(id)
    }

    #[inline]
    pub fn combined(&self, id: &str) -> Option<&Record> {
        self.combined.get(id)
    }

    #[inline]
    pub fn diff(&self, id: &str) -> Option<DiffStatus> {
        self.diff.get(id).copied()
    }

    /// Returns the diff map in id order.
    pub fn diffs(&self) -> impl Iterator<Item = (&RecordId, DiffStatus)> {
        self.diff.iter().map(|(id, status)| (id, *status))
    }

    /// Returns every visible record.
    pub fn combined_records(&self) -> impl Iterator<Item = (&RecordId, &Record)> {
        self.combined.iter()
    }

    /// Returns every server entry.
    pub fn server_entries(&self) -> impl Iterator<Item = (&RecordId, &ServerEntry)> {
        self.server.iter()
    }

    /// Returns every client entry.
    pub fn client_entries(&self) -> impl Iterator<Item = (&RecordId, &ClientEntry)> {
        self.client.iter()
    }

    /// Returns the number of visible records.
    pub fn len(&self) -> usize {
        self.combined.len()
    }

    /// Returns true if no record is visible.
    pub fn is_empty(&self) -> bool {
        self.combined.is_empty()
    }

    /// Merges server fields into the record, creating it if needed.
    pub(crate) fn merge_server(&mut self, id: &str, fields: Record) {
        match self.server.get_mut(id) {
            Some(ServerEntry::Present(record)) => record.extend(fields),
            _ => {
                self.server.insert(id.into(), ServerEntry::Present(fields));
            }
        }
    }

    pub(crate) fn delete_server(&mut self, id: &str) {
        self.server.insert(id.into(), ServerEntry::Deleted);
    }

    pub(crate) fn set_client_field(&mut self, id: &str, field: &str, value: Value) {
        match self.client.get_mut(id) {
            Some(ClientEntry::Override(fields)) => {
                fields.insert(field.into(), value);
            }
            _ => {
                let mut fields = Record::new();
                fields.insert(field.into(), value);
                self.client.insert(id.into(), ClientEntry::Override(fields));
            }
        }
    }

    /// Removes a field from the override. An override left empty on a
    /// server-backed id is dropped so the record reads as unchanged.
    pub(crate) fn clear_client_field(&mut self, id: &str, field: &str) {
        if let Some(ClientEntry::Override(fields)) = self.client.get_mut(id) {
            fields.remove(field);
            if fields.is_empty() && !is_new_id(id) {
                self.client.remove(id);
            }
        }
    }

    pub(crate) fn delete_client(&mut self, id: &str) {
        self.client.insert(id.into(), ClientEntry::Deleted);
    }

    pub(crate) fn take_client(&mut self, id: &str) -> Option<ClientEntry> {
        self.client.remove(id)
    }

    pub(crate) fn put_client(&mut self, id: &str, entry: ClientEntry) {
        self.client.insert(id.into(), entry);
    }

    pub(crate) fn client_ids(&self) -> Vec<RecordId> {
        self.client.keys().cloned().collect()
    }

    /// Returns the ids whose override references `target`.
    pub(crate) fn referencing(&self, target: &str) -> Vec<RecordId> {
        self.client
            .iter()
            .filter(|(_, entry)| {
                entry
                    .fields()
                    .is_some_and(|fields| fields.values().any(|v| v.references(target)))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Rewrites references in every override.
    pub(crate) fn rewrite_references(&mut self, from: &str, to: &str) {
        for entry in self.client.values_mut() {
            if let ClientEntry::Override(fields) = entry {
                for value in fields.values_mut() {
                    value.rewrite_reference(from, to);
                }
            }
        }
    }

    /// Derives the combined record and diff status of an id from its server
    /// and client entries.
    pub fn derive(&self, id: &str) -> (Option<Record>, Option<DiffStatus>) {
        let server = self.server.get(id);
        let client = self.client.get(id);
        let combined = match (client, server) {
            (Some(ClientEntry::Deleted), _) => None,
            (Some(ClientEntry::Override(fields)), server) => {
                let mut record = server.and_then(|s| s.record()).cloned().unwrap_or_default();
                record.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                Some(record)
            }
            (None, Some(ServerEntry::Present(record))) => Some(record.clone()),
            (None, _) => None,
        };
        let diff = match (client, server) {
            (None, _) => None,
            (Some(ClientEntry::Override(_)), None) if is_new_id(id) => Some(DiffStatus::Created),
            (Some(ClientEntry::Override(_)), None) => Some(DiffStatus::Modified),
            (Some(ClientEntry::Override(_)), Some(ServerEntry::Deleted)) => Some(DiffStatus::Created),
            (Some(ClientEntry::Override(_)), Some(ServerEntry::Present(_))) => {
                Some(DiffStatus::Modified)
            }
            (Some(ClientEntry::Deleted), Some(ServerEntry::Present(_))) => Some(DiffStatus::Deleted),
            (Some(ClientEntry::Deleted), None) if !is_new_id(id) => Some(DiffStatus::Deleted),
            (Some(ClientEntry::Deleted), _) => None,
        };
        (combined, diff)
    }

    /// Stores a derived combined record and diff status.
    pub(crate) fn store_derived(&mut self, id: &str, combined: Option<Record>, diff: Option<DiffStatus>) {
        match combined {
            Some(record) => {
                self.combined.insert(id.into(), record);
            }
            None => {
                self.combined.remove(id);
            }
        }
        match diff {
            Some(status) => {
                self.diff.insert(id.into(), status);
            }
            None => {
                self.diff.remove(id);
            }
        }
    }

    /// Checks that the stored combined view and diff match their derivation.
    pub fn check_invariants(&self, collection: &str) -> Result<()> {
        let ids: BTreeSet<&RecordId> = self
            .server
            .keys()
            .chain(self.client.keys())
            .chain(self.combined.keys())
            .chain(self.diff.keys())
            .collect();
        for id in ids {
            let (combined, diff) = self.derive(id);
            if combined.as_ref() != self.combined.get(id.as_str()) {
                return Err(Error::invariant(format!(
                    "combined view of {}/{} disagrees with server and client",
                    collection, id
                )));
            }
            if diff != self.diff(id) {
                return Err(Error::invariant(format!(
                    "diff status of {}/{} is {:?}, expected {:?}",
                    collection,
                    id,
                    self.diff(id),
                    diff
                )));
            }
        }
        Ok(())
    }
}
