//! Window bookkeeping.
//!
//! A `WindowBook` remembers, per layer path and parent record, which server
//! window was last requested and where the returned slice started and
//! ended. It also remembers which ids were requested directly so they are
//! not requested twice.

use crate::planner::{Plan, RequestKind};
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use strata_core::RecordId;

/// Identifies one window: a layer path and, for foreign relations, the
/// parent record the window belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowKey {
    pub path: String,
    pub parent: Option<RecordId>,
}

impl WindowKey {
    /// Creates a window key.
    pub fn new(path: &str, parent: Option<&str>) -> Self {
        Self {
            path: path.into(),
            parent: parent.map(Into::into),
        }
    }

    /// Creates the key of a root window.
    pub fn root(path: &str) -> Self {
        Self::new(path, None)
    }
}

/// A server-side slice `[skip, skip + show)`; `show = None` is unbounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Window {
    pub skip: usize,
    pub show: Option<usize>,
}

impl Window {
    /// Creates a window.
    pub fn new(skip: usize, show: Option<usize>) -> Self {
        Self { skip, show }
    }

    /// Returns the exclusive end, `None` when unbounded.
    #[inline]
    pub fn end(&self) -> Option<usize> {
        self.show.map(|show| self.skip + show)
    }

    /// Returns true if `other` lies entirely within this window.
    pub fn contains(&self, other: &Window) -> bool {
        if other.skip < self.skip {
            return false;
        }
        match (self.end(), other.end()) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => theirs <= mine,
        }
    }
}

/// What a window fetch returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowAnchor {
    /// The window that was fetched.
    pub window: Window,
    /// First record of the returned slice, `None` if it was empty.
    pub first_id: Option<RecordId>,
    /// Last record of the returned slice.
    pub last_id: Option<RecordId>,
    /// True when the server returned fewer records than asked for, so
    /// nothing follows `last_id`.
    pub exhausted: bool,
    /// Server records already known to sort before `first_id` when the
    /// response arrived.
    pub before: BTreeSet<RecordId>,
}

impl WindowAnchor {
    /// Builds the anchor of a window response from the returned ids in
    /// server order.
    pub fn from_response(window: Window, ids: &[RecordId]) -> Self {
        Self {
            window,
            first_id: ids.first().cloned(),
            last_id: ids.last().cloned(),
            exhausted: window.show.map_or(true, |show| ids.len() < show),
            before: BTreeSet::new(),
        }
    }
}

/// Requested windows, anchors and directly fetched ids of one live query.
#[derive(Clone, Debug, Default)]
pub struct WindowBook {
    requested: HashMap<WindowKey, Window>,
    anchors: HashMap<WindowKey, WindowAnchor>,
    in_flight: HashSet<WindowKey>,
    fetched: HashMap<String, HashSet<RecordId>>,
}

impl WindowBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the window last requested for a key.
    pub fn requested(&self, key: &WindowKey) -> Option<&Window> {
        self.requested.get(key)
    }

    /// Returns the anchor of the last response for a key.
    pub fn anchor(&self, key: &WindowKey) -> Option<&WindowAnchor> {
        self.anchors.get(key)
    }

    /// Stores the anchor of a window response.
    pub fn set_anchor(&mut self, key: WindowKey, anchor: WindowAnchor) {
        self.in_flight.remove(&key);
        self.anchors.insert(key, anchor);
    }

    /// Returns true if a window was requested and its response has not
    /// arrived.
    pub fn is_in_flight(&self, key: &WindowKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Returns true if an id of a path was already requested directly.
    pub fn is_fetched(&self, path: &str, id: &str) -> bool {
        self.fetched.get(path).is_some_and(|ids| ids.contains(id))
    }

    /// Registers every request of a plan so an unchanged store plans
    /// nothing the next time.
    pub fn record(&mut self, plan: &Plan) {
        for request in &plan.requests {
            match &request.kind {
                RequestKind::Window { key, window } => {
                    self.requested.insert(key.clone(), *window);
                    self.in_flight.insert(key.clone());
                }
                RequestKind::Ids(ids) => {
                    self.fetched
                        .entry(request.path.clone())
                        .or_default()
                        .extend(ids.iter().cloned());
                }
            }
        }
    }

    /// Drops everything known about a window so the next plan requests it
    /// again.
    pub fn forget(&mut self, key: &WindowKey) {
        self.requested.remove(key);
        self.anchors.remove(key);
        self.in_flight.remove(key);
    }

    /// Drops directly fetched ids of a path.
    pub fn forget_ids(&mut self, path: &str, ids: &[RecordId]) {
        if let Some(fetched) = self.fetched.get_mut(path) {
            for id in ids {
                fetched.remove(id);
            }
        }
    }

    /// Returns every key with a requested window.
    pub fn keys(&self) -> Vec<&WindowKey> {
        let mut keys: Vec<_> = self.requested.keys().collect();
        keys.sort();
        keys
    }

    /// Returns the number of tracked windows.
    pub fn len(&self) -> usize {
        self.requested.len()
    }

    /// Returns true if no window is tracked.
    pub fn is_empty(&self) -> bool {
        self.requested.is_empty() && self.anchors.is_empty()
    }

    /// Drops all bookkeeping.
    pub fn clear(&mut self) {
        self.requested.clear();
        self.anchors.clear();
        self.in_flight.clear();
        self.fetched.clear();
    }
}
