//! Strata Store - Three-tier record store for the Strata reactive cache.
//!
//! This crate provides:
//!
//! - `RecordStore`: server, client overlay and combined tiers of every
//!   collection, with per-record diff status
//! - `CollectionStore`: the tiers of a single collection
//! - `ServerWrite` / `ClientEdit`: the writes the store accepts
//!
//! # Example
//!
//! ```rust
//! use strata_core::schema::{CollectionBuilder, Schema};
//! use strata_core::{DiffStatus, Record, ScalarType, Value};
//! use strata_store::{ClientEdit, RecordStore, ServerWrite};
//!
//! let people = CollectionBuilder::new("people")
//!     .unwrap()
//!     .scalar("firstName", ScalarType::String)
//!     .unwrap()
//!     .build();
//! let schema = Schema::new(vec![people]).unwrap();
//!
//! let mut store = RecordStore::new();
//! let mut fields = Record::new();
//! fields.insert("firstName".into(), Value::from("Delphia"));
//! store
//!     .set_server(&schema, vec![ServerWrite::present("people", "b", fields)])
//!     .unwrap();
//!
//! let changes = store
//!     .set_client(&schema, vec![ClientEdit::set("people", "b", "firstName", "Faye")])
//!     .unwrap();
//!
//! assert!(changes.contains("people", "b", "firstName"));
//! assert_eq!(store.diff("people", "b"), Some(DiffStatus::Modified));
//! ```

#![no_std]

extern crate alloc;

pub mod collection_store;
pub mod edit;
pub mod store;

pub use collection_store::{ClientEntry, CollectionStore, ServerEntry};
pub use edit::{ClientEdit, ServerWrite};
pub use store::RecordStore;
