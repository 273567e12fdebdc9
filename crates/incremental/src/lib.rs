//! Strata Incremental - Window planning and incremental materialization.
//!
//! This crate turns a compiled query and the record store into server
//! requests and live results. Only a slice of each server-side sequence is
//! ever held locally; local edits are folded into it without a round trip
//! whenever the fetched slice is wide enough.
//!
//! # Core Concepts
//!
//! - `WindowBook`: requested windows and response anchors per layer and parent
//! - `plan`: the window and id fetches a query needs, widened by local changes
//! - `materialize`: the result tree, or the window that cannot be resolved yet
//! - `Tracker`: classifies a change as none, shallow or recompute
//!
//! # Example
//!
//! ```rust
//! use strata_core::schema::{CollectionBuilder, Schema};
//! use strata_core::{Record, ScalarType, Value};
//! use strata_incremental::{materialize, plan, RequestKind, WindowAnchor, WindowBook};
//! use strata_query::{compile, QueryNode, SortKey, Variables};
//! use strata_store::{RecordStore, ServerWrite};
//!
//! let people = CollectionBuilder::new("people")
//!     .unwrap()
//!     .scalar("firstName", ScalarType::String)
//!     .unwrap()
//!     .build();
//! let schema = Schema::new(vec![people]).unwrap();
//! let query = QueryNode::new("people")
//!     .sort(SortKey::asc("firstName"))
//!     .show(2)
//!     .select(&["firstName"]);
//! let layer = compile(&schema, &query, &Variables::new()).unwrap();
//!
//! let mut store = RecordStore::new();
//! let mut book = WindowBook::new();
//! let fetches = plan(&layer, &store, &book, 0);
//! book.record(&fetches);
//!
//! // The server answers the window request.
//! let RequestKind::Window { key, window } = &fetches.requests[0].kind else {
//!     unreachable!()
//! };
//! let mut fields = Record::new();
//! fields.insert("firstName".into(), Value::from("Delphia"));
//! store
//!     .set_server(&schema, vec![ServerWrite::present("people", "b", fields)])
//!     .unwrap();
//! book.set_anchor(key.clone(), WindowAnchor::from_response(*window, &["b".into()]));
//!
//! let result = materialize(&layer, &store, &book).unwrap();
//! assert_eq!(result.ids(), ["b"]);
//! assert!(plan(&layer, &store, &book, 0).is_empty());
//! ```

#![no_std]

extern crate alloc;

pub mod book;
pub mod materialize;
pub mod planner;
pub mod select;
pub mod tracker;

pub use book::{Window, WindowAnchor, WindowBook, WindowKey};
pub use materialize::{materialize, refresh_scalars, Node};
pub use planner::{plan, Extra, FetchRequest, Plan, RequestKind};
pub use select::{anchor_response, select_ids, MissReason, Parent, Unsatisfied};
pub use tracker::{Tracker, UpdateKind};
