//! The session: one record store, the live queries reading it and the sync
//! loop feeding it.

use crate::config::SessionConfig;
use crate::transport::{Outgoing, Response, Transport};
use crate::wire::{decode_record, RawRecord, WireRequest};
use std::collections::BTreeSet;
use strata_core::schema::Schema;
use strata_core::{ChangeMap, Error, RecordId, Result};
use strata_incremental::{FetchRequest, Plan, RequestKind};
use strata_query::{QueryNode, Variables};
use strata_reactive::{LiveQuery, Notification, QueryId, QueryRegistry, QueryState, SubscriptionId};
use strata_store::{ClientEdit, RecordStore, ServerWrite};

/// What one `sync` call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Batches sent to the transport.
    pub rounds: usize,
    pub requests: usize,
    /// Requests that failed or could not be merged.
    pub failures: usize,
    /// True when no query needed anything more at the end.
    pub settled: bool,
}

/// A client-side cache session.
///
/// The session owns the only mutable state: the record store. Live queries
/// are refreshed after every store mutation, and `sync` runs plan, fetch and
/// merge rounds until every query is satisfied.
pub struct Session {
    schema: Schema,
    store: RecordStore,
    registry: QueryRegistry,
    config: SessionConfig,
}

impl Session {
    /// Creates a session with the default configuration.
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, SessionConfig::default())
    }

    pub fn with_config(schema: Schema, config: SessionConfig) -> Self {
        Self {
            schema,
            store: RecordStore::new(),
            registry: QueryRegistry::new(),
            config,
        }
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn query(&self, id: QueryId) -> Option<&LiveQuery> {
        self.registry.get(id)
    }

    /// Returns the state of a registered query.
    pub fn state(&self, id: QueryId) -> Option<&QueryState> {
        self.registry.get(id).map(LiveQuery::state)
    }

    /// Registers a live query. A query the cache already covers is ready
    /// right away.
    pub fn register(&mut self, query: QueryNode, variables: Variables) -> Result<QueryId> {
        let id = self.registry.register(&self.schema, query, variables)?;
        let margin = self.config.window_margin;
        if let Some(live) = self.registry.get_mut(id) {
            settle(live, &self.store, margin);
        }
        Ok(id)
    }

    /// Replaces the shape of a live query. Returns false when nothing
    /// changed.
    pub fn reshape(&mut self, id: QueryId, query: QueryNode, variables: Variables) -> Result<bool> {
        let changed = self.registry.reshape(id, &self.schema, query, variables)?;
        let margin = self.config.window_margin;
        if let (true, Some(live)) = (changed, self.registry.get_mut(id)) {
            settle(live, &self.store, margin);
        }
        Ok(changed)
    }

    /// Drops a live query. Nothing is delivered to its subscribers after
    /// this returns.
    pub fn unregister(&mut self, id: QueryId) -> bool {
        self.registry.unregister(id)
    }

    /// Subscribes to a live query. Returns `None` for an unknown query.
    pub fn subscribe<F>(&mut self, id: QueryId, callback: F) -> Option<SubscriptionId>
    where
        F: Fn(&Notification) + 'static,
    {
        self.registry.get_mut(id).map(|live| live.subscribe(callback))
    }

    pub fn unsubscribe(&mut self, id: QueryId, subscription: SubscriptionId) -> bool {
        self.registry
            .get_mut(id)
            .is_some_and(|live| live.unsubscribe(subscription))
    }

    /// Applies a batch of local edits.
    pub fn set_client(&mut self, edits: Vec<ClientEdit>) -> Result<()> {
        let changes = self.store.set_client(&self.schema, edits)?;
        self.apply(changes)
    }

    /// Merges authoritative records pushed outside of a sync.
    pub fn set_server(&mut self, writes: Vec<ServerWrite>) -> Result<()> {
        let changes = self.store.set_server(&self.schema, writes)?;
        self.apply(changes)
    }

    /// Merges raw records of one collection pushed outside of a sync.
    pub fn merge_raw(&mut self, collection: &str, records: &[RawRecord]) -> Result<()> {
        let writes = records
            .iter()
            .map(|raw| {
                decode_record(&self.schema, collection, raw)
                    .map(|fields| ServerWrite::present(collection, &raw.id, fields))
            })
            .collect::<Result<Vec<_>>>()?;
        self.set_server(writes)
    }

    /// Moves a committed record from its local id to the id the server
    /// assigned.
    pub fn remap_id(&mut self, collection: &str, local_id: &str, server_id: &str) -> Result<()> {
        let changes = self
            .store
            .remap_id(&self.schema, collection, local_id, server_id)?;
        self.apply(changes)
    }

    /// Returns what every live query needs fetched now, without marking
    /// anything as sent.
    pub fn pending_requests(&self) -> Result<Vec<Outgoing>> {
        let margin = self.config.window_margin;
        let mut batch = Vec::new();
        for live in self.registry.iter() {
            for request in live.plan(&self.store, margin).requests {
                batch.push(outgoing(live, request)?);
            }
        }
        Ok(batch)
    }

    /// Runs plan, fetch and merge rounds until every query is satisfied or
    /// `max_sync_rounds` is reached.
    ///
    /// A query whose request fails reports `Failed` and sits out the rest
    /// of the call; the next `sync` asks again.
    pub fn sync<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut failed = BTreeSet::new();

        loop {
            if report.rounds == self.config.max_sync_rounds {
                let margin = self.config.window_margin;
                let store = &self.store;
                report.settled = true;
                for live in self.registry.iter_mut().filter(|live| !failed.contains(&live.id())) {
                    if !live.plan(store, margin).is_empty() || live.refresh(store).is_err() {
                        report.settled = false;
                    }
                }
                if !report.settled {
                    tracing::warn!(rounds = report.rounds, "sync stopped before every query settled");
                }
                break;
            }

            let batch = self.next_batch(&failed)?;
            if batch.is_empty() {
                report.settled = true;
                break;
            }
            report.rounds += 1;
            report.requests += batch.len();
            tracing::debug!(round = report.rounds, requests = batch.len(), "sync round");

            let mut responses = transport.fetch(&batch);
            if responses.len() != batch.len() {
                tracing::warn!(expected = batch.len(), got = responses.len(), "transport answered a partial batch");
                responses.resize(batch.len(), None);
            }

            let mut changes = ChangeMap::new();
            let mut answered = Vec::new();
            for (outgoing, response) in batch.iter().zip(responses) {
                match self.merge(outgoing, response, &mut answered) {
                    Ok(merged) => changes.merge(merged),
                    Err(error) => {
                        report.failures += 1;
                        failed.insert(outgoing.query);
                        if let Some(live) = self.registry.get_mut(outgoing.query) {
                            live.on_failure(outgoing.generation, &outgoing.request, error);
                        }
                    }
                }
            }
            // Windows are anchored once the whole round is in the store, so
            // records fetched alongside them count as known.
            for (outgoing, returned) in answered {
                if let (RequestKind::Window { key, window }, Some(live)) =
                    (&outgoing.request.kind, self.registry.get_mut(outgoing.query))
                {
                    live.on_window_response(&self.store, outgoing.generation, key.clone(), *window, &returned);
                }
            }
            self.apply(changes)?;
        }
        Ok(report)
    }

    /// Plans every live query that has not failed in this sync and marks
    /// the requests as sent.
    fn next_batch(&mut self, failed: &BTreeSet<QueryId>) -> Result<Vec<Outgoing>> {
        let margin = self.config.window_margin;
        let store = &self.store;
        let mut batch = Vec::new();
        for live in self.registry.iter_mut() {
            if failed.contains(&live.id()) {
                continue;
            }
            let plan = settle(live, store, margin);
            if plan.is_empty() {
                continue;
            }
            live.record(&plan);
            for request in plan.requests {
                batch.push(outgoing(live, request)?);
            }
        }
        Ok(batch)
    }

    /// Merges one response into the store. The ids a window returned are
    /// pushed to `answered` in server order.
    fn merge<'b>(
        &mut self,
        outgoing: &'b Outgoing,
        response: Response,
        answered: &mut Vec<(&'b Outgoing, Vec<RecordId>)>,
    ) -> Result<ChangeMap> {
        let request = &outgoing.request;
        let records = response.ok_or_else(|| {
            Error::transport(format!("no response for {} of {}", request.collection, request.path))
        })?;

        let mut writes = Vec::with_capacity(records.len());
        let mut returned = Vec::with_capacity(records.len());
        for raw in &records {
            let fields = decode_record(&self.schema, &request.collection, raw)?;
            writes.push(ServerWrite::fetched(
                &request.collection,
                &raw.id,
                fields,
                request.fields.clone(),
            ));
            returned.push(raw.id.clone());
        }
        if let RequestKind::Ids(ids) = &request.kind {
            // Requested ids the server did not return no longer exist.
            let seen: BTreeSet<&String> = returned.iter().collect();
            writes.extend(
                ids.iter()
                    .filter(|id| !seen.contains(id))
                    .map(|id| ServerWrite::deleted(&request.collection, id)),
            );
        }

        let changes = self.store.set_server(&self.schema, writes)?;
        tracing::trace!(
            query = outgoing.query,
            path = %request.path,
            records = returned.len(),
            changed = changes.record_count(),
            "merged response"
        );
        if matches!(request.kind, RequestKind::Window { .. }) {
            answered.push((outgoing, returned));
        }
        Ok(changes)
    }

    /// Verifies the store and routes a change to the live queries.
    fn apply(&mut self, changes: ChangeMap) -> Result<()> {
        if self.config.check_invariants {
            self.store.check_invariants()?;
        }
        if changes.is_empty() {
            return Ok(());
        }
        for (id, miss) in self.registry.on_change(&self.store, &changes) {
            tracing::debug!(query = id, path = %miss.key.path, reason = ?miss.reason, "live query needs a fetch");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("queries", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Plans a live query, refreshing it when nothing is left to fetch.
///
/// A window that does not resolve although everything planned for it was
/// answered moved on the server; its bookkeeping is dropped and it is
/// planned afresh.
fn settle(live: &mut LiveQuery, store: &RecordStore, margin: usize) -> Plan {
    let plan = live.plan(store, margin);
    if !plan.is_empty() {
        return plan;
    }
    match live.refresh(store) {
        Ok(()) => plan,
        Err(miss) => {
            tracing::debug!(
                query = live.id(),
                path = %miss.key.path,
                reason = ?miss.reason,
                "replanning window"
            );
            live.forget(&miss.key);
            live.plan(store, margin)
        }
    }
}

fn outgoing(live: &LiveQuery, request: FetchRequest) -> Result<Outgoing> {
    let layer = live
        .layer()
        .find(&request.path)
        .ok_or_else(|| Error::invariant(format!("planned path {} is not in the query", request.path)))?;
    let variables = WireRequest::from_request(layer, &request).to_json()?;
    Ok(Outgoing {
        query: live.id(),
        generation: live.generation(),
        request,
        variables,
    })
}
