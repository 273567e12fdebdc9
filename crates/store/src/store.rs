//! The record store.
//!
//! `RecordStore` owns one `CollectionStore` per collection and is the only
//! mutable state of a session. Every mutation recomputes the combined view
//! and diff status of the ids it touched and reports the combined fields
//! that changed. A record whose diff status or server placement moved
//! without a visible field change is reported through its `id`.

use crate::collection_store::{ClientEntry, CollectionStore, ServerEntry};
use crate::edit::{decode_server_fields, validate_edit, ClientEdit, ServerWrite};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::schema::Schema;
use strata_core::{is_new_id, ChangeMap, DiffStatus, Error, Record, RecordId, Result};

/// State of a touched record, captured before a batch applies.
#[derive(Debug)]
struct Before {
    combined: Option<Record>,
    server: Option<ServerEntry>,
    diff: Option<DiffStatus>,
}

type Snapshot = BTreeMap<(String, RecordId), Before>;

/// Record store holding server, client and combined tiers of every
/// collection.
#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    collections: BTreeMap<String, CollectionStore>,
}

impl RecordStore {
    /// Creates an empty record store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the store of one collection.
    pub fn collection(&self, name: &str) -> Option<&CollectionStore> {
        self.collections.get(name)
    }

    /// Returns the server entry of a record.
    pub fn server(&self, collection: &str, id: &str) -> Option<&ServerEntry> {
        self.collections.get(collection)?.server(id)
    }

    /// Returns the server record if the server returned one.
    pub fn server_record(&self, collection: &str, id: &str) -> Option<&Record> {
        self.server(collection, id)?.record()
    }

    /// Returns the local overlay of a record.
    pub fn client(&self, collection: &str, id: &str) -> Option<&ClientEntry> {
        self.collections.get(collection)?.client(id)
    }

    /// Returns the combined record if it is visible.
    pub fn combined(&self, collection: &str, id: &str) -> Option<&Record> {
        self.collections.get(collection)?.combined(id)
    }

    /// Returns the diff status of a record.
    pub fn diff(&self, collection: &str, id: &str) -> Option<DiffStatus> {
        self.collections.get(collection)?.diff(id)
    }

    /// Returns the diff map of a collection in id order.
    pub fn diffs<'a>(&'a self, collection: &str) -> impl Iterator<Item = (&'a RecordId, DiffStatus)> {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|c| c.diffs())
    }

    /// Returns every visible record of a collection.
    pub fn combined_records<'a>(
        &'a self,
        collection: &str,
    ) -> impl Iterator<Item = (&'a RecordId, &'a Record)> {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|c| c.combined_records())
    }

    /// Merges authoritative records into the server tier.
    ///
    /// Fields are merged into existing server records. Every write is decoded
    /// against the schema before anything is stored.
    pub fn set_server(&mut self, schema: &Schema, writes: Vec<ServerWrite>) -> Result<ChangeMap> {
        let mut decoded = Vec::with_capacity(writes.len());
        for write in writes {
            match write {
                ServerWrite::Present {
                    collection,
                    id,
                    fields,
                    requested,
                } => {
                    let fields = decode_server_fields(schema, &collection, fields, &requested)?;
                    decoded.push((collection, id, Some(fields)));
                }
                ServerWrite::Deleted { collection, id } => {
                    schema.collection(&collection)?;
                    decoded.push((collection, id, None));
                }
            }
        }

        let mut snapshot = Snapshot::new();
        for (collection, id, fields) in decoded {
            self.capture(&mut snapshot, &collection, &id);
            let store = self.collections.entry(collection).or_default();
            match fields {
                Some(fields) => store.merge_server(&id, fields),
                None => store.delete_server(&id),
            }
        }
        let changes = self.commit(snapshot);
        tracing::debug!(records = changes.record_count(), "merged server records");
        debug_assert!(self.check_invariants().is_ok(), "{:?}", self.check_invariants());
        Ok(changes)
    }

    /// Applies a batch of local edits.
    ///
    /// The whole batch is validated first; on error nothing is applied.
    pub fn set_client(&mut self, schema: &Schema, edits: Vec<ClientEdit>) -> Result<ChangeMap> {
        let edits = edits
            .into_iter()
            .map(|edit| validate_edit(schema, edit))
            .collect::<Result<Vec<_>>>()?;

        let mut snapshot = Snapshot::new();
        for edit in edits {
            match edit {
                ClientEdit::SetField {
                    collection,
                    id,
                    field,
                    value,
                } => {
                    self.capture(&mut snapshot, &collection, &id);
                    let store = self.collections.entry(collection).or_default();
                    match value {
                        Some(value) => store.set_client_field(&id, &field, value),
                        None => store.clear_client_field(&id, &field),
                    }
                }
                ClientEdit::DeleteRecord { collection, id } => {
                    self.capture(&mut snapshot, &collection, &id);
                    self.collections
                        .entry(collection)
                        .or_default()
                        .delete_client(&id);
                }
                ClientEdit::ClearRecord { collection, id } => {
                    self.capture(&mut snapshot, &collection, &id);
                    if let Some(store) = self.collections.get_mut(&collection) {
                        store.take_client(&id);
                    }
                }
                ClientEdit::ClearCollection { collection } => {
                    let ids = self
                        .collections
                        .get(&collection)
                        .map(|store| store.client_ids())
                        .unwrap_or_default();
                    for id in &ids {
                        self.capture(&mut snapshot, &collection, id);
                    }
                    if let Some(store) = self.collections.get_mut(&collection) {
                        for id in &ids {
                            store.take_client(id);
                        }
                    }
                }
            }
        }
        let changes = self.commit(snapshot);
        tracing::debug!(records = changes.record_count(), "applied local edits");
        debug_assert!(self.check_invariants().is_ok(), "{:?}", self.check_invariants());
        Ok(changes)
    }

    /// Moves the local overlay of a new record to its server-assigned id and
    /// rewrites every local reference to it.
    ///
    /// Local fields win over an overlay already present on `server_id`.
    pub fn remap_id(
        &mut self,
        schema: &Schema,
        collection: &str,
        local_id: &str,
        server_id: &str,
    ) -> Result<ChangeMap> {
        schema.collection(collection)?;
        if !is_new_id(local_id) {
            return Err(Error::invalid_edit(format!(
                "{} is not a locally created id",
                local_id
            )));
        }
        if is_new_id(server_id) || server_id.is_empty() {
            return Err(Error::invalid_edit(format!(
                "{} is not a server id",
                server_id
            )));
        }

        let mut snapshot = Snapshot::new();
        self.capture(&mut snapshot, collection, local_id);
        self.capture(&mut snapshot, collection, server_id);
        if let Some(store) = self.collections.get_mut(collection) {
            if let Some(entry) = store.take_client(local_id) {
                let merged = match (store.take_client(server_id), entry) {
                    (Some(ClientEntry::Override(mut existing)), ClientEntry::Override(local)) => {
                        existing.extend(local);
                        ClientEntry::Override(existing)
                    }
                    (_, entry) => entry,
                };
                store.put_client(server_id, merged);
            }
        }

        let names: Vec<String> = self.collections.keys().cloned().collect();
        for name in names {
            let touched = self
                .collections
                .get(&name)
                .map(|store| store.referencing(local_id))
                .unwrap_or_default();
            for id in &touched {
                self.capture(&mut snapshot, &name, id);
            }
            if let Some(store) = self.collections.get_mut(&name) {
                store.rewrite_references(local_id, server_id);
            }
        }

        let changes = self.commit(snapshot);
        tracing::debug!(
            collection,
            local_id,
            server_id,
            records = changes.record_count(),
            "remapped local id"
        );
        debug_assert!(self.check_invariants().is_ok(), "{:?}", self.check_invariants());
        Ok(changes)
    }

    /// Checks the combined and diff invariants of every collection.
    pub fn check_invariants(&self) -> Result<()> {
        for (name, store) in &self.collections {
            store.check_invariants(name)?;
        }
        Ok(())
    }

    /// Records the state of an id before its first mutation in a batch.
    fn capture(&self, snapshot: &mut Snapshot, collection: &str, id: &str) {
        let key = (String::from(collection), RecordId::from(id));
        if !snapshot.contains_key(&key) {
            let before = Before {
                combined: self.combined(collection, id).cloned(),
                server: self.server(collection, id).cloned(),
                diff: self.diff(collection, id),
            };
            snapshot.insert(key, before);
        }
    }

    /// Re-derives every captured id and reports the combined fields that
    /// changed.
    fn commit(&mut self, snapshot: Snapshot) -> ChangeMap {
        let mut changes = ChangeMap::new();
        for ((collection, id), before) in snapshot {
            let Some(store) = self.collections.get_mut(&collection) else {
                continue;
            };
            let (after, diff) = store.derive(&id);
            // Windows count diffed ids by their server placement, so these
            // moves are structural even when nothing visible changed.
            let diff_moved = before.diff != diff && before.combined == after;
            let server_moved = diff.is_some() && before.server.as_ref() != store.server(&id);
            if diff_moved || server_moved {
                changes.mark_visibility(&collection, &id);
            }
            match (&before.combined, &after) {
                (None, None) => {}
                (Some(old), Some(new)) => {
                    for field in old.keys().chain(new.keys()) {
                        if old.get(field) != new.get(field) {
                            changes.mark(&collection, &id, field);
                        }
                    }
                }
                (Some(record), None) | (None, Some(record)) => {
                    changes.mark_visibility(&collection, &id);
                    for field in record.keys() {
                        changes.mark(&collection, &id, field);
                    }
                }
            }
            store.store_derived(&id, after, diff);
        }
        changes
    }
}
