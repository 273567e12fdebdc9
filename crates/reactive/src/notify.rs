//! Query registry and change routing.
//!
//! The registry owns the live queries of a session and routes store
//! changes to the queries whose layers read a touched collection.

use crate::observable::LiveQuery;
use crate::state::QueryId;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use strata_core::schema::Schema;
use strata_core::{ChangeMap, Error, Result};
use strata_incremental::Unsatisfied;
use strata_query::{QueryNode, Variables};
use strata_store::RecordStore;

/// A registry of live queries keyed by id.
#[derive(Debug)]
pub struct QueryRegistry {
    /// Collection name -> queries reading it
    by_collection: HashMap<String, BTreeSet<QueryId>>,
    queries: BTreeMap<QueryId, LiveQuery>,
    next_id: QueryId,
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            by_collection: HashMap::new(),
            queries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Compiles and registers a query. Ids are never reused.
    pub fn register(&mut self, schema: &Schema, query: QueryNode, variables: Variables) -> Result<QueryId> {
        let id = self.next_id;
        let live = LiveQuery::new(id, schema, query, variables)?;
        self.next_id += 1;
        self.route(&live);
        tracing::debug!(query = id, path = %live.layer().path, "registered live query");
        self.queries.insert(id, live);
        Ok(id)
    }

    /// Replaces the shape of a registered query.
    ///
    /// Returns false when the shape is unchanged.
    pub fn reshape(&mut self, id: QueryId, schema: &Schema, query: QueryNode, variables: Variables) -> Result<bool> {
        let live = self
            .queries
            .get_mut(&id)
            .ok_or_else(|| Error::bad_query(format!("unknown query {}", id)))?;
        if !live.reshape(schema, query, variables)? {
            return Ok(false);
        }
        self.unroute(id);
        if let Some(live) = self.queries.get(&id) {
            for collection in live.dependencies() {
                self.by_collection.entry(collection).or_default().insert(id);
            }
        }
        Ok(true)
    }

    /// Drops a query with its windows and subscriptions.
    ///
    /// Returns true if the query was registered.
    pub fn unregister(&mut self, id: QueryId) -> bool {
        if self.queries.remove(&id).is_none() {
            return false;
        }
        self.unroute(id);
        tracing::debug!(query = id, "unregistered live query");
        true
    }

    pub fn get(&self, id: QueryId) -> Option<&LiveQuery> {
        self.queries.get(&id)
    }

    pub fn get_mut(&mut self, id: QueryId) -> Option<&mut LiveQuery> {
        self.queries.get_mut(&id)
    }

    /// Returns the registered ids in registration order.
    pub fn ids(&self) -> Vec<QueryId> {
        self.queries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveQuery> {
        self.queries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LiveQuery> {
        self.queries.values_mut()
    }

    /// Returns the queries reading a collection.
    pub fn queries_for(&self, collection: &str) -> Vec<QueryId> {
        self.by_collection
            .get(collection)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Routes a store change to every query reading a touched collection.
    ///
    /// Returns the queries the change left unsatisfied.
    pub fn on_change(&mut self, store: &RecordStore, changes: &ChangeMap) -> Vec<(QueryId, Unsatisfied)> {
        let affected: BTreeSet<QueryId> = changes
            .collections()
            .filter_map(|collection| self.by_collection.get(collection))
            .flatten()
            .copied()
            .collect();

        let mut misses = Vec::new();
        for id in affected {
            if let Some(live) = self.queries.get_mut(&id) {
                if let Err(miss) = live.on_change(store, changes) {
                    misses.push((id, miss));
                }
            }
        }
        misses
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Drops every query.
    pub fn clear(&mut self) {
        self.by_collection.clear();
        self.queries.clear();
    }

    fn route(&mut self, live: &LiveQuery) {
        for collection in live.dependencies() {
            self.by_collection.entry(collection).or_default().insert(live.id());
        }
    }

    fn unroute(&mut self, id: QueryId) {
        for ids in self.by_collection.values_mut() {
            ids.remove(&id);
        }
        self.by_collection.retain(|_, ids| !ids.is_empty());
    }
}
