//! Change classification for live queries.

use crate::materialize::Node;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use strata_core::{ChangeMap, RecordId};
use strata_query::Layer;

/// How much of a live query a change invalidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum UpdateKind {
    /// Nothing the query shows changed.
    #[default]
    None = 0,
    /// Only requested scalars of shown records changed.
    Shallow = 1,
    /// Rows may have moved, appeared or disappeared.
    Recompute = 2,
}

/// Remembers which records a live query currently shows, per layer.
#[derive(Clone, Debug, Default)]
pub struct Tracker {
    visible: BTreeMap<String, BTreeSet<RecordId>>,
}

impl Tracker {
    /// Creates a tracker that shows nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records what a freshly materialized result shows.
    pub fn observe(&mut self, layer: &Layer, node: &Node) {
        self.visible.clear();
        self.collect(layer, node);
    }

    fn collect(&mut self, layer: &Layer, node: &Node) {
        match node {
            Node::List(items) => {
                for item in items {
                    self.collect(layer, item);
                }
            }
            Node::Record { id, fields } => {
                self.visible
                    .entry(layer.path.clone())
                    .or_default()
                    .insert(id.clone());
                for child in &layer.children {
                    if let Some(nested) = fields.get(&child.target.field) {
                        self.collect(child, nested);
                    }
                }
            }
            Node::Null | Node::Scalar(_) => {}
        }
    }

    /// Returns true if a layer shows a record.
    pub fn is_visible(&self, path: &str, id: &str) -> bool {
        self.visible.get(path).is_some_and(|ids| ids.contains(id))
    }

    /// Classifies a change against the query.
    ///
    /// A structural field of any record of a layer's collection forces a
    /// recompute. A requested scalar of a shown record is shallow.
    pub fn update(&self, layer: &Layer, changes: &ChangeMap) -> UpdateKind {
        let mut kind = UpdateKind::None;
        let mut stop = false;
        layer.walk(&mut |layer| {
            if stop {
                return;
            }
            let Some(records) = changes.records(layer.collection()) else {
                return;
            };
            for (id, fields) in records {
                if fields.iter().any(|f| layer.is_structural(f)) {
                    kind = UpdateKind::Recompute;
                    stop = true;
                    return;
                }
                if self.is_visible(&layer.path, id) && fields.iter().any(|f| layer.scalars.contains(f)) {
                    kind = kind.max(UpdateKind::Shallow);
                }
            }
        });
        kind
    }
}
