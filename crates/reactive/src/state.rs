//! Live query states and the notifications subscribers receive.

use crate::differ::Patch;
use strata_core::Error;
use strata_incremental::Node;

/// Unique identifier for a registered query.
pub type QueryId = u64;

/// What a live query currently shows.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum QueryState {
    /// The first result has not been materialized yet.
    #[default]
    Loading,
    Ready(Node),
    /// A fetch for the current shape failed.
    Failed(Error),
}

impl QueryState {
    #[inline]
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, QueryState::Ready(_))
    }

    /// Returns the result of a ready query.
    pub fn node(&self) -> Option<&Node> {
        match self {
            QueryState::Ready(node) => Some(node),
            _ => None,
        }
    }

    /// Returns the error of a failed query.
    pub fn error(&self) -> Option<&Error> {
        match self {
            QueryState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Returns a short state name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            QueryState::Loading => "loading",
            QueryState::Ready(_) => "ready",
            QueryState::Failed(_) => "failed",
        }
    }
}

/// A state change of a live query.
///
/// `patch` is set when a ready result changed into another ready result;
/// applying it to the previous node yields the node in `state`.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub query: QueryId,
    /// Shape generation the state belongs to.
    pub generation: u64,
    pub state: QueryState,
    pub patch: Option<Patch>,
}
