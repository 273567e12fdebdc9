//! Window planner.
//!
//! Decides what to ask the server for so every layer of a live query can be
//! materialized from the store. Windowed layers widen the caller's slice by
//! the local changes that may shift it; direct relations fetch the ids they
//! reference but do not hold.

use crate::book::{Window, WindowBook, WindowKey};
use crate::select::{
    anchor_is_stale, in_server_sequence, is_candidate, needs_fetch, select_ids, server_unknown,
    Parent,
};
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{is_new_id, DiffStatus, RecordId};
use strata_query::{Layer, RelationKind};
use strata_store::RecordStore;

/// How far local changes may shift a window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extra {
    /// Local records that may sort before the slice, up to the caller skip.
    pub skip: usize,
    /// Server records that may have left the slice.
    pub show: usize,
}

/// What a request asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// A sorted, filtered server slice of a windowed layer.
    Window { key: WindowKey, window: Window },
    /// Specific records by id.
    Ids(Vec<RecordId>),
}

/// One request of a plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Path of the layer the request serves.
    pub path: String,
    pub collection: String,
    /// Fields to return, id first.
    pub fields: Vec<String>,
    pub kind: RequestKind,
}

impl FetchRequest {
    /// Returns the window key of a window request.
    pub fn window_key(&self) -> Option<&WindowKey> {
        match &self.kind {
            RequestKind::Window { key, .. } => Some(key),
            RequestKind::Ids(_) => None,
        }
    }
}

/// The requests needed to materialize a live query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub requests: Vec<FetchRequest>,
    /// Extra widening per planned window.
    pub extras: BTreeMap<WindowKey, Extra>,
}

impl Plan {
    /// Returns true if nothing needs fetching.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Returns the widening planned for a window.
    pub fn extra(&self, key: &WindowKey) -> Option<&Extra> {
        self.extras.get(key)
    }
}

/// Plans the fetches of a compiled query.
///
/// Planning twice without a store change in between yields an empty plan
/// the second time, provided the first plan was recorded in the book.
pub fn plan(layer: &Layer, store: &RecordStore, book: &WindowBook, margin: usize) -> Plan {
    let mut planner = Planner {
        store,
        book,
        margin,
        plan: Plan::default(),
        pending: BTreeMap::new(),
    };
    planner.visit(layer, None, &[None]);
    planner.finish()
}

struct Planner<'a> {
    store: &'a RecordStore,
    book: &'a WindowBook,
    margin: usize,
    plan: Plan,
    /// Ids to fetch per layer path, with the collection and fields.
    pending: BTreeMap<String, (String, Vec<String>, BTreeSet<RecordId>)>,
}

impl<'a> Planner<'a> {
    /// Plans a layer for each parent row, then its children for the rows
    /// it shows.
    fn visit(&mut self, layer: &Layer, parent_collection: Option<&str>, parents: &[Option<RecordId>]) {
        let mut rows = Vec::new();
        for parent_id in parents {
            let parent = match (parent_collection, parent_id) {
                (Some(collection), Some(id)) => Parent::Row { collection, id },
                _ => Parent::Root,
            };
            match layer.target.kind {
                RelationKind::Root | RelationKind::Foreign => {
                    if !parent.id().is_some_and(is_new_id) {
                        self.plan_window(layer, parent);
                    }
                }
                RelationKind::Single | RelationKind::List => self.plan_direct(layer, parent),
            }
            if let Ok(ids) = select_ids(layer, parent, self.store, self.book) {
                for id in &ids {
                    if needs_fetch(self.store, layer, id) {
                        self.fetch(layer, id);
                    }
                }
                rows.extend(ids.into_iter().map(Some));
            }
        }
        if rows.is_empty() {
            return;
        }
        for child in &layer.children {
            self.visit(child, Some(layer.collection()), &rows);
        }
    }

    fn plan_window(&mut self, layer: &Layer, parent: Parent<'_>) {
        let store = self.store;
        let collection = layer.collection();
        let mut extra = Extra::default();
        let mut needs_ids = false;

        for (id, status) in store.diffs(collection) {
            let combined_in = store
                .combined(collection, id)
                .is_some_and(|r| is_candidate(layer, parent, id, r));
            let unknown = server_unknown(store, layer, id);
            let server_in = store
                .server_record(collection, id)
                .is_some_and(|r| in_server_sequence(layer, parent, id, r));

            if combined_in && status != DiffStatus::Deleted {
                extra.skip += 1;
            }
            if status == DiffStatus::Created {
                continue;
            }
            if unknown {
                needs_ids |= self.fetch(layer, id);
                extra.show += 1;
            } else if server_in {
                extra.show += 1;
            }
        }

        let skip = layer.skip;
        extra.skip = extra.skip.min(skip);
        let start = (skip - extra.skip).saturating_sub(self.margin);
        let window = Window::new(
            start,
            layer
                .show
                .map(|show| show + (skip - start) + extra.show + self.margin),
        );

        let key = parent.key(layer);
        let stale_anchor = !self.book.is_in_flight(&key)
            && self
                .book
                .anchor(&key)
                .is_some_and(|anchor| anchor_is_stale(layer, parent, store, anchor));
        let satisfied = !needs_ids
            && !stale_anchor
            && self
                .book
                .requested(&key)
                .is_some_and(|requested| requested.contains(&window));

        tracing::trace!(
            path = %layer.path,
            parent = ?parent.id(),
            skip = window.skip,
            show = ?window.show,
            extra_skip = extra.skip,
            extra_show = extra.show,
            satisfied,
            "planned window"
        );

        self.plan.extras.insert(key.clone(), extra);
        if !satisfied {
            self.plan.requests.push(FetchRequest {
                path: layer.path.clone(),
                collection: collection.into(),
                fields: layer.fetch_fields(),
                kind: RequestKind::Window { key, window },
            });
        }
    }

    fn plan_direct(&mut self, layer: &Layer, parent: Parent<'_>) {
        let Parent::Row { collection, id } = parent else {
            return;
        };
        let store = self.store;
        let Some(value) = store
            .combined(collection, id)
            .and_then(|record| record.get(&layer.target.field))
        else {
            return;
        };
        for target in value.ref_ids() {
            if needs_fetch(store, layer, target) {
                self.fetch(layer, target);
            }
        }
    }

    /// Queues an id fetch. Returns true if the id was not requested before.
    fn fetch(&mut self, layer: &Layer, id: &str) -> bool {
        if self.book.is_fetched(&layer.path, id) {
            return false;
        }
        let (_, _, ids) = self
            .pending
            .entry(layer.path.clone())
            .or_insert_with(|| (layer.collection().into(), layer.fetch_fields(), BTreeSet::new()));
        ids.insert(id.into());
        true
    }

    fn finish(mut self) -> Plan {
        for (path, (collection, fields, ids)) in self.pending {
            self.plan.requests.push(FetchRequest {
                path,
                collection,
                fields,
                kind: RequestKind::Ids(ids.into_iter().collect()),
            });
        }
        if !self.plan.is_empty() {
            tracing::debug!(requests = self.plan.requests.len(), "planned fetches");
        }
        self.plan
    }
}
