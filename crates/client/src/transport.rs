//! The boundary to the network.
//!
//! A session hands the transport one batch per sync round and expects one
//! response per request, in order. How the batch travels (one HTTP call,
//! several, throttled or not) is the transport's business.

use crate::wire::RawRecord;
use serde_json::Value as Json;
use strata_incremental::FetchRequest;
use strata_reactive::QueryId;

/// A request on its way to the server.
#[derive(Clone, Debug, PartialEq)]
pub struct Outgoing {
    /// Query the request serves.
    pub query: QueryId,
    /// Shape generation of that query when the request was planned.
    pub generation: u64,
    pub request: FetchRequest,
    /// The request as a JSON `variables` document.
    pub variables: Json,
}

/// The records returned for one request, or `None` when it failed.
pub type Response = Option<Vec<RawRecord>>;

/// Fetches batches of requests.
pub trait Transport {
    /// Answers a batch. Missing trailing responses count as failures.
    fn fetch(&mut self, batch: &[Outgoing]) -> Vec<Response>;
}

impl<F> Transport for F
where
    F: FnMut(&[Outgoing]) -> Vec<Response>,
{
    fn fetch(&mut self, batch: &[Outgoing]) -> Vec<Response> {
        self(batch)
    }
}
