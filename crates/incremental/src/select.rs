//! Row selection.
//!
//! Selecting the rows of one layer for one parent is shared by the planner,
//! which needs the visible parents of every child layer, and the
//! materializer, which builds nodes from them.
//!
//! For windowed layers the selection locates the requested slice inside the
//! sorted combined candidates using the anchor of the last window response:
//! the server key `K` of the first returned record and the set `B` of
//! server records the store already placed before `K` when the response
//! arrived. With `p` the server skip of that response, the `U = p - |B|`
//! records still unknown all sort before `K`, so the slice starts at
//! candidate `skip - U`. A server record that shows up before `K` outside
//! `B` cannot be told apart from one of the unknown ones, so the window is
//! fetched again.

use crate::book::{Window, WindowAnchor, WindowBook, WindowKey};
use alloc::vec::Vec;
use core::cmp::Ordering;
use strata_core::{is_new_id, Record, RecordId, Value};
use strata_query::{Layer, RelationKind, SortValue};
use strata_store::{ClientEntry, RecordStore, ServerEntry};

/// The parent a layer's rows are selected for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parent<'a> {
    /// The root layer.
    Root,
    /// A visible row of the parent layer.
    Row { collection: &'a str, id: &'a str },
}

impl<'a> Parent<'a> {
    /// Returns the parent id.
    pub fn id(&self) -> Option<&'a str> {
        match *self {
            Parent::Root => None,
            Parent::Row { id, .. } => Some(id),
        }
    }

    /// Returns the window key of a layer under this parent.
    pub fn key(&self, layer: &Layer) -> WindowKey {
        WindowKey::new(&layer.path, self.id())
    }
}

/// Why a selection cannot be computed from the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MissReason {
    /// No window response has arrived.
    NoAnchor,
    /// The server record of the anchor is unknown or deleted.
    AnchorUnknown,
    /// A changed record's server state is unknown.
    ServerDataMissing,
    /// Known server records contradict the anchor position.
    AnchorMoved,
    /// The slice reaches past what the last fetch returned.
    BeyondFetched,
    /// A referenced record is unknown.
    RecordUnknown,
}

/// A selection that needs server data first.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Unsatisfied {
    pub key: WindowKey,
    pub reason: MissReason,
}

impl Unsatisfied {
    fn new(key: WindowKey, reason: MissReason) -> Self {
        Self { key, reason }
    }
}

/// Returns true if a record belongs under the parent of a foreign layer.
/// Other layers accept every record.
pub fn links(layer: &Layer, parent: Parent<'_>, record: &Record) -> bool {
    match (layer.target.kind, &layer.target.inverse, parent.id()) {
        (RelationKind::Foreign, Some(inverse), Some(parent_id)) => {
            matches!(record.get(inverse), Some(Value::Ref(id)) if id == parent_id)
        }
        _ => true,
    }
}

/// Returns true if a combined record is a candidate of a windowed layer.
///
/// Local records are placed with whatever fields they have; server records
/// must be decidable.
pub fn is_candidate(layer: &Layer, parent: Parent<'_>, id: &str, record: &Record) -> bool {
    (is_new_id(id) || layer.is_decidable(record))
        && layer.matches(id, record)
        && links(layer, parent, record)
}

/// Returns true if a server record belongs to the server's sequence of a
/// windowed layer.
pub fn in_server_sequence(layer: &Layer, parent: Parent<'_>, id: &str, record: &Record) -> bool {
    layer.is_decidable(record) && layer.matches(id, record) && links(layer, parent, record)
}

/// Returns true if the server state of a record is not known well enough
/// to place it.
pub fn server_unknown(store: &RecordStore, layer: &Layer, id: &str) -> bool {
    if is_new_id(id) {
        return false;
    }
    match store.server(layer.collection(), id) {
        None => true,
        Some(ServerEntry::Deleted) => false,
        Some(ServerEntry::Present(record)) => !layer.is_decidable(record),
    }
}

/// Returns true if a record must be fetched by id before it can be shown:
/// its server state is unknown or lacks a field the layer reads.
pub fn needs_fetch(store: &RecordStore, layer: &Layer, id: &str) -> bool {
    if is_new_id(id) {
        return false;
    }
    let collection = layer.collection();
    match store.server(collection, id) {
        Some(ServerEntry::Deleted) => false,
        Some(ServerEntry::Present(record)) => layer
            .fetch_fields()
            .iter()
            .skip(1)
            .any(|field| !record.contains_key(field)),
        None => !matches!(store.client(collection, id), Some(ClientEntry::Deleted)),
    }
}

/// Returns the combined candidates of a windowed layer in layer order.
pub fn candidates<'s>(
    layer: &Layer,
    parent: Parent<'_>,
    store: &'s RecordStore,
) -> Vec<(SortValue, &'s RecordId)> {
    let mut rows: Vec<_> = store
        .combined_records(layer.collection())
        .filter(|(id, record)| is_candidate(layer, parent, id, record))
        .map(|(id, record)| (layer.sort.key(id, record), id))
        .collect();
    rows.sort_by(|a, b| layer.sort.compare_keys(&a.0, &b.0));
    rows
}

/// Selects the visible row ids of a layer under one parent.
pub fn select_ids(
    layer: &Layer,
    parent: Parent<'_>,
    store: &RecordStore,
    book: &WindowBook,
) -> Result<Vec<RecordId>, Unsatisfied> {
    match layer.target.kind {
        RelationKind::Root | RelationKind::Foreign => locate_window(layer, parent, store, book),
        RelationKind::Single | RelationKind::List => select_direct(layer, parent, store),
    }
}

/// Locates the requested slice of a windowed layer.
pub fn locate_window(
    layer: &Layer,
    parent: Parent<'_>,
    store: &RecordStore,
    book: &WindowBook,
) -> Result<Vec<RecordId>, Unsatisfied> {
    let rows = candidates(layer, parent, store);

    // Nothing of a local parent exists on the server yet.
    if parent.id().is_some_and(is_new_id) {
        return Ok(slice(&rows, layer.skip, layer.show));
    }

    let key = parent.key(layer);
    let miss = |reason| Err(Unsatisfied::new(key.clone(), reason));
    let Some(anchor) = book.anchor(&key) else {
        return miss(MissReason::NoAnchor);
    };
    let Some(bound) = anchor_key(layer, store, anchor.first_id.as_deref()) else {
        return miss(MissReason::AnchorUnknown);
    };
    let before = |key: &SortValue| {
        bound
            .as_ref()
            .map_or(true, |k| layer.sort.compare_keys(key, k) == Ordering::Less)
    };

    for (id, _) in store.diffs(layer.collection()) {
        if server_unknown(store, layer, id) {
            return miss(MissReason::ServerDataMissing);
        }
    }

    // Records of the response's prefix that were not in the store stay
    // unknown; everything known now is among the candidates.
    let p = anchor.window.skip;
    let Some(unknown) = p.checked_sub(anchor.before.len()) else {
        return miss(MissReason::AnchorMoved);
    };
    if unknown > 0 && moved_before(layer, parent, store, anchor, bound.as_ref()) {
        return miss(MissReason::AnchorMoved);
    }
    let below = rows.iter().take_while(|(k, _)| before(k)).count();
    let unknown = unknown as isize;
    let start = layer.skip as isize - unknown;

    if bound.is_none() {
        // The fetch came back empty: everything sorts before it.
        if rows.len() as isize + unknown <= layer.skip as isize {
            return Ok(Vec::new());
        }
        if unknown > 0 {
            return miss(MissReason::BeyondFetched);
        }
    }
    if start < 0 {
        return miss(MissReason::AnchorMoved);
    }
    let start = start as usize;
    if unknown > 0 && start < below {
        return miss(MissReason::AnchorMoved);
    }

    let selected = slice(&rows, start, layer.show);
    if !anchor.exhausted {
        if layer.show.map_or(true, |show| selected.len() < show) {
            return miss(MissReason::BeyondFetched);
        }
        if let Some(last) = selected.len().checked_sub(1) {
            if !within_fetched(layer, store, anchor, &rows[start + last].0) {
                return miss(MissReason::BeyondFetched);
            }
        }
    }
    Ok(selected)
}

/// Known server records of a window's sequence that sort before `bound`.
fn known_before<'s>(
    layer: &Layer,
    parent: Parent<'_>,
    store: &'s RecordStore,
    bound: Option<&SortValue>,
) -> Vec<&'s RecordId> {
    let Some(collection) = store.collection(layer.collection()) else {
        return Vec::new();
    };
    collection
        .server_entries()
        .filter_map(|(id, entry)| entry.record().map(|record| (id, record)))
        .filter(|(id, record)| in_server_sequence(layer, parent, id, record))
        .filter(|(id, record)| {
            bound.map_or(true, |k| layer.sort.compare_keys(&layer.sort.key(id, record), k) == Ordering::Less)
        })
        .map(|(id, _)| id)
        .collect()
}

/// Returns true if a server record now sorts before the anchor that was not
/// known there when the window was answered. With unknown records in the
/// prefix it cannot be placed among them.
fn moved_before(
    layer: &Layer,
    parent: Parent<'_>,
    store: &RecordStore,
    anchor: &WindowAnchor,
    bound: Option<&SortValue>,
) -> bool {
    known_before(layer, parent, store, bound)
        .into_iter()
        .any(|id| !anchor.before.contains(id))
}

/// Returns true if an answered window can no longer locate its slice
/// because the server side of its prefix changed.
pub fn anchor_is_stale(layer: &Layer, parent: Parent<'_>, store: &RecordStore, anchor: &WindowAnchor) -> bool {
    let Some(bound) = anchor_key(layer, store, anchor.first_id.as_deref()) else {
        return true;
    };
    match anchor.window.skip.checked_sub(anchor.before.len()) {
        None => true,
        Some(0) => false,
        Some(_) => moved_before(layer, parent, store, anchor, bound.as_ref()),
    }
}

/// Builds the anchor of a window response once its records are merged.
///
/// Returns `None` when the key does not name a windowed layer of `root`.
pub fn anchor_response(
    root: &Layer,
    key: &WindowKey,
    store: &RecordStore,
    window: Window,
    ids: &[RecordId],
) -> Option<WindowAnchor> {
    let layer = root.find(&key.path)?;
    let parent = match (&key.parent, key.path.rsplit_once('.')) {
        (Some(id), Some((parent_path, _))) => Parent::Row {
            collection: root.find(parent_path)?.collection(),
            id,
        },
        _ => Parent::Root,
    };
    let mut anchor = WindowAnchor::from_response(window, ids);
    let bound = anchor_key(layer, store, anchor.first_id.as_deref()).flatten();
    anchor.before = known_before(layer, parent, store, bound.as_ref())
        .into_iter()
        .cloned()
        .collect();
    Some(anchor)
}

/// Server sort key of an anchor record. `Some(None)` stands for an empty
/// response, which bounds nothing.
fn anchor_key(layer: &Layer, store: &RecordStore, first_id: Option<&str>) -> Option<Option<SortValue>> {
    match first_id {
        None => Some(None),
        Some(id) => store
            .server_record(layer.collection(), id)
            .map(|record| Some(layer.sort.key(id, record))),
    }
}

/// Returns true if the last selected row sorts no later than the last
/// record of the response.
fn within_fetched(
    layer: &Layer,
    store: &RecordStore,
    anchor: &WindowAnchor,
    row_key: &SortValue,
) -> bool {
    let Some(last_id) = anchor.last_id.as_deref() else {
        return false;
    };
    store
        .server_record(layer.collection(), last_id)
        .is_some_and(|record| {
            layer.sort.compare_keys(row_key, &layer.sort.key(last_id, record)) != Ordering::Greater
        })
}

fn slice(rows: &[(SortValue, &RecordId)], skip: usize, show: Option<usize>) -> Vec<RecordId> {
    let rows = rows.get(skip..).unwrap_or(&[]);
    let take = show.unwrap_or(rows.len()).min(rows.len());
    rows[..take].iter().map(|(_, id)| (*id).clone()).collect()
}

/// Selects the rows of a direct relation from the parent's stored ids.
fn select_direct(
    layer: &Layer,
    parent: Parent<'_>,
    store: &RecordStore,
) -> Result<Vec<RecordId>, Unsatisfied> {
    let Parent::Row { collection, id: parent_id } = parent else {
        return Ok(Vec::new());
    };
    let Some(parent_record) = store.combined(collection, parent_id) else {
        return Ok(Vec::new());
    };
    let ids = parent_record
        .get(&layer.target.field)
        .map(Value::ref_ids)
        .unwrap_or(&[]);

    let target = layer.collection();
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        match store.combined(target, id) {
            Some(record) => {
                if !is_new_id(id) && !layer.is_decidable(record) {
                    return Err(Unsatisfied::new(parent.key(layer), MissReason::ServerDataMissing));
                }
                if layer.matches(id, record) {
                    rows.push((id, record));
                }
            }
            None if hidden(store, target, id) => {}
            None => return Err(Unsatisfied::new(parent.key(layer), MissReason::RecordUnknown)),
        }
    }

    if layer.explicit_sort {
        rows.sort_by(|a, b| layer.sort.compare(a.0, a.1, b.0, b.1));
    }
    let (skip, show) = match layer.target.kind {
        RelationKind::Single => (0, Some(1)),
        _ => (layer.skip, layer.show),
    };
    Ok(rows
        .into_iter()
        .skip(skip)
        .take(show.unwrap_or(usize::MAX))
        .map(|(id, _)| id.clone())
        .collect())
}

/// Returns true if a record is known to be gone.
fn hidden(store: &RecordStore, collection: &str, id: &str) -> bool {
    matches!(store.client(collection, id), Some(ClientEntry::Deleted))
        || matches!(store.server(collection, id), Some(ServerEntry::Deleted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Window, WindowAnchor};
    use alloc::string::String;
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
            .build();
        Schema::new(vec![people]).unwrap()
    }

    fn person(id: &str, name: Option<&str>) -> ServerWrite {
        let mut fields = Record::new();
        fields.insert("firstName".into(), Value::from(name));
        ServerWrite::present("people", id, fields)
    }

    fn layer(skip: usize, show: usize) -> Layer {
        let query = QueryNode::new("people")
            .sort(SortKey::asc("firstName"))
            .skip(skip)
            .show(show)
            .select(&["firstName"]);
        compile(&schema(), &query, &Variables::new()).unwrap()
    }

    fn anchored(skip: usize, show: usize, ids: &[&str]) -> WindowBook {
        let ids: Vec<String> = ids.iter().map(|s| String::from(*s)).collect();
        let mut book = WindowBook::new();
        book.set_anchor(
            WindowKey::root("people"),
            WindowAnchor::from_response(Window::new(skip, Some(show)), &ids),
        );
        book
    }

    fn store() -> RecordStore {
        let mut store = RecordStore::new();
        store
            .set_server(
                &schema(),
                vec![person("b", Some("Delphia")), person("c", Some("Ena")), person("d", Some("Esperanza"))],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_window_without_anchor() {
        let err = select_ids(&layer(0, 2), Parent::Root, &store(), &WindowBook::new()).unwrap_err();
        assert_eq!(err.reason, MissReason::NoAnchor);
    }

    #[test]
    fn test_window_with_unknown_prefix() {
        // Only [c, d] was fetched at server offset 1; b is not known here.
        let mut store = RecordStore::new();
        store
            .set_server(&schema(), vec![person("c", Some("Ena")), person("d", Some("Esperanza"))])
            .unwrap();
        let book = anchored(1, 2, &["c", "d"]);
        let ids = select_ids(&layer(1, 2), Parent::Root, &store, &book).unwrap();
        assert_eq!(ids, ["c", "d"]);
    }

    #[test]
    fn test_pushed_record_before_anchor() {
        let mut store = RecordStore::new();
        store
            .set_server(&schema(), vec![person("c", Some("Ena")), person("d", Some("Esperanza"))])
            .unwrap();
        let book = anchored(1, 2, &["c", "d"]);
        store.set_server(&schema(), vec![person("z", Some("Aaron"))]).unwrap();

        let err = select_ids(&layer(1, 2), Parent::Root, &store, &book).unwrap_err();
        assert_eq!(err.reason, MissReason::AnchorMoved);
        let anchor = book.anchor(&WindowKey::root("people")).unwrap();
        assert!(anchor_is_stale(&layer(1, 2), Parent::Root, &store, anchor));
    }

    #[test]
    fn test_anchor_remembers_known_prefix() {
        let layer = layer(2, 2);
        let ids: Vec<RecordId> = vec!["d".into()];
        let anchor = anchor_response(&layer, &WindowKey::root("people"), &store(), Window::new(2, Some(2)), &ids).unwrap();
        assert_eq!(anchor.before.iter().collect::<Vec<_>>(), ["b", "c"]);
        assert!(anchor.exhausted);

        // A server delete inside the prefix keeps the count of unknown records.
        let mut store = store();
        store.set_server(&schema(), vec![ServerWrite::deleted("people", "b")]).unwrap();
        let mut book = WindowBook::new();
        book.set_anchor(WindowKey::root("people"), anchor);
        let ids = select_ids(&layer, Parent::Root, &store, &book).unwrap();
        assert!(ids.is_empty());
        assert_eq!(select_ids(&self::layer(1, 2), Parent::Root, &store, &book).unwrap(), ["d"]);
    }

    #[test]
    fn test_window_needs_changed_record() {
        let mut store = RecordStore::new();
        store
            .set_server(&schema(), vec![person("c", Some("Ena")), person("d", Some("Esperanza"))])
            .unwrap();
        store
            .set_client(&schema(), vec![ClientEdit::set("people", "b", "firstName", "Faye")])
            .unwrap();
        let book = anchored(1, 2, &["c", "d"]);
        let err = select_ids(&layer(1, 2), Parent::Root, &store, &book).unwrap_err();
        assert_eq!(err.reason, MissReason::ServerDataMissing);
    }

    #[test]
    fn test_short_window_not_exhausted() {
        let book = anchored(0, 2, &["b", "c"]);
        let err = select_ids(&layer(0, 3), Parent::Root, &store(), &book).unwrap_err();
        assert_eq!(err.reason, MissReason::BeyondFetched);
    }

    #[test]
    fn test_empty_response_past_end() {
        let book = anchored(5, 2, &[]);
        let ids = select_ids(&layer(5, 2), Parent::Root, &RecordStore::new(), &book).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_deleted_anchor() {
        let mut store = store();
        store
            .set_server(&schema(), vec![ServerWrite::deleted("people", "b")])
            .unwrap();
        let book = anchored(0, 3, &["b", "c", "d"]);
        let err = select_ids(&layer(0, 2), Parent::Root, &store, &book).unwrap_err();
        assert_eq!(err.reason, MissReason::AnchorUnknown);
    }
}
