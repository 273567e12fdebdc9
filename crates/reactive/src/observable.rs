//! Live queries.
//!
//! A `LiveQuery` owns everything one registered query needs between
//! fetches: the compiled layer tree, the window book of what was asked for,
//! the tracker of what is shown, the current state and the subscribers.
//! It never owns the store; every operation reads the snapshot it is given.

use crate::differ::{diff_node, Patch};
use crate::state::{Notification, QueryId, QueryState};
use crate::subscription::{Subscribers, SubscriptionId};
use alloc::collections::BTreeSet;
use alloc::string::String;
use strata_core::schema::Schema;
use strata_core::{ChangeMap, Error, RecordId, Result};
use strata_incremental::{
    anchor_response, materialize, plan, refresh_scalars, FetchRequest, Plan, RequestKind, Tracker,
    Unsatisfied, UpdateKind, Window, WindowBook, WindowKey,
};
use strata_query::{compile, fingerprint, Layer, QueryNode, Variables};
use strata_store::RecordStore;

/// A query kept up to date against a record store.
///
/// # Example
///
/// ```
/// use strata_core::schema::{CollectionBuilder, Schema};
/// use strata_core::ScalarType;
/// use strata_query::{QueryNode, Variables};
/// use strata_reactive::LiveQuery;
/// use strata_store::RecordStore;
///
/// let people = CollectionBuilder::new("people")
///     .unwrap()
///     .scalar("firstName", ScalarType::String)
///     .unwrap()
///     .build();
/// let schema = Schema::new(vec![people]).unwrap();
///
/// let mut query = LiveQuery::new(1, &schema, QueryNode::new("people").select(&["firstName"]), Variables::new())
///     .unwrap();
/// assert!(query.state().is_loading());
///
/// // Nothing was fetched yet, so the root window is planned.
/// let store = RecordStore::new();
/// assert_eq!(query.plan(&store, 0).requests.len(), 1);
/// ```
pub struct LiveQuery {
    id: QueryId,
    query: QueryNode,
    variables: Variables,
    fingerprint: u64,
    layer: Layer,
    generation: u64,
    book: WindowBook,
    tracker: Tracker,
    state: QueryState,
    subscriptions: Subscribers,
}

impl LiveQuery {
    /// Compiles a query. Fails without side effects on a bad query.
    pub fn new(id: QueryId, schema: &Schema, query: QueryNode, variables: Variables) -> Result<Self> {
        let layer = compile(schema, &query, &variables)?;
        let fingerprint = fingerprint(&query, &variables);
        Ok(Self {
            id,
            query,
            variables,
            fingerprint,
            layer,
            generation: 0,
            book: WindowBook::new(),
            tracker: Tracker::new(),
            state: QueryState::Loading,
            subscriptions: Subscribers::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> QueryId {
        self.id
    }

    /// Returns the shape generation; it grows with every reshape.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    #[inline]
    pub fn query(&self) -> &QueryNode {
        &self.query
    }

    #[inline]
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    #[inline]
    pub fn book(&self) -> &WindowBook {
        &self.book
    }

    #[inline]
    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// Collections any layer of the query reads.
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut collections = BTreeSet::new();
        self.layer.walk(&mut |layer| {
            collections.insert(String::from(layer.collection()));
        });
        collections
    }

    /// Replaces the query shape.
    ///
    /// Returns false when the new shape equals the current one. Otherwise
    /// the generation advances, the window book is dropped and the query is
    /// loading again. A compile error leaves the query untouched.
    pub fn reshape(&mut self, schema: &Schema, query: QueryNode, variables: Variables) -> Result<bool> {
        let fingerprint = fingerprint(&query, &variables);
        if fingerprint == self.fingerprint && query == self.query && variables == self.variables {
            return Ok(false);
        }
        let layer = compile(schema, &query, &variables)?;

        self.query = query;
        self.variables = variables;
        self.fingerprint = fingerprint;
        self.layer = layer;
        self.generation += 1;
        self.book.clear();
        self.tracker = Tracker::new();
        tracing::debug!(query = self.id, generation = self.generation, "reshaped live query");
        self.transition(QueryState::Loading, None);
        Ok(true)
    }

    /// Plans the fetches the current shape still needs.
    pub fn plan(&self, store: &RecordStore, margin: usize) -> Plan {
        plan(&self.layer, store, &self.book, margin)
    }

    /// Marks a plan as sent.
    pub fn record(&mut self, plan: &Plan) {
        self.book.record(plan);
    }

    /// Drops the bookkeeping of a window so it is planned again.
    pub fn forget(&mut self, key: &WindowKey) {
        self.book.forget(key);
    }

    /// Stores the anchor of a window response. The returned records and
    /// every other response of the same round must already be in `store`.
    ///
    /// Responses for an older generation are ignored; returns false for
    /// them.
    pub fn on_window_response(
        &mut self,
        store: &RecordStore,
        generation: u64,
        key: WindowKey,
        window: Window,
        ids: &[RecordId],
    ) -> bool {
        if generation != self.generation {
            tracing::debug!(
                query = self.id,
                generation,
                current = self.generation,
                "ignored window response of an older shape"
            );
            return false;
        }
        match anchor_response(&self.layer, &key, store, window, ids) {
            Some(anchor) => {
                self.book.set_anchor(key, anchor);
                true
            }
            None => {
                tracing::warn!(query = self.id, path = %key.path, "window response for an unknown layer");
                false
            }
        }
    }

    /// Records a failed request. The request is forgotten so the next plan
    /// asks again, and the query reports the error.
    pub fn on_failure(&mut self, generation: u64, request: &FetchRequest, error: Error) {
        if generation != self.generation {
            return;
        }
        match &request.kind {
            RequestKind::Window { key, .. } => self.book.forget(key),
            RequestKind::Ids(ids) => self.book.forget_ids(&request.path, ids),
        }
        tracing::warn!(query = self.id, path = %request.path, %error, "fetch failed");
        self.transition(QueryState::Failed(error), None);
    }

    /// Brings the result up to date after a store change.
    ///
    /// Changes to shown scalars are patched in place; anything that may move
    /// rows rematerializes. Returns the miss when the cached data no longer
    /// covers the query; see [`LiveQuery::refresh`].
    pub fn on_change(&mut self, store: &RecordStore, changes: &ChangeMap) -> core::result::Result<(), Unsatisfied> {
        let kind = self.tracker.update(&self.layer, changes);
        match (kind, &self.state) {
            (UpdateKind::None, _) => Ok(()),
            (UpdateKind::Shallow, QueryState::Ready(old)) => {
                let mut node = old.clone();
                if refresh_scalars(&self.layer, &mut node, store, changes) {
                    let patch = diff_node(old, &node);
                    self.transition(QueryState::Ready(node), patch);
                }
                Ok(())
            }
            _ => self.refresh(store),
        }
    }

    /// Rematerializes the query and notifies subscribers of any difference.
    ///
    /// When the store no longer covers the query a ready result is dropped
    /// and the query is loading until the missing data arrives. A failed
    /// query keeps its error.
    pub fn refresh(&mut self, store: &RecordStore) -> core::result::Result<(), Unsatisfied> {
        let node = match materialize(&self.layer, store, &self.book) {
            Ok(node) => node,
            Err(miss) => {
                tracing::trace!(
                    query = self.id,
                    path = %miss.key.path,
                    reason = ?miss.reason,
                    state = self.state.name(),
                    "live query not satisfied"
                );
                if self.state.is_ready() {
                    self.transition(QueryState::Loading, None);
                }
                return Err(miss);
            }
        };
        self.tracker.observe(&self.layer, &node);
        match &self.state {
            QueryState::Ready(old) => {
                if let Some(patch) = diff_node(old, &node) {
                    self.transition(QueryState::Ready(node), Some(patch));
                }
            }
            _ => self.transition(QueryState::Ready(node), None),
        }
        Ok(())
    }

    /// Subscribes to state notifications.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + 'static,
    {
        self.subscriptions.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.unsubscribe(id)
    }

    #[inline]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn transition(&mut self, state: QueryState, patch: Option<Patch>) {
        if state.is_loading() && self.state.is_loading() {
            return;
        }
        tracing::debug!(
            query = self.id,
            from = self.state.name(),
            to = state.name(),
            patched = patch.is_some(),
            "live query state"
        );
        self.state = state;
        let notification = Notification {
            query: self.id,
            generation: self.generation,
            state: self.state.clone(),
            patch,
        };
        self.subscriptions.notify(&notification);
    }
}

impl core::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("id", &self.id)
            .field("path", &self.layer.path)
            .field("generation", &self.generation)
            .field("state", &self.state.name())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
