//! Strata Client - The session object of the Strata reactive cache.
//!
//! A `Session` owns one record store and the live queries reading it. Local
//! edits apply immediately and update every affected query; `sync` fetches
//! what the queries still miss through a caller-supplied `Transport`.
//!
//! # Example
//!
//! ```rust
//! use strata_client::{Outgoing, RawRecord, Response, Session};
//! use strata_core::schema::{CollectionBuilder, Schema};
//! use strata_core::ScalarType;
//! use strata_query::{QueryNode, SortKey, Variables};
//! use strata_store::ClientEdit;
//!
//! let people = CollectionBuilder::new("people")
//!     .unwrap()
//!     .scalar("firstName", ScalarType::String)
//!     .unwrap()
//!     .build();
//! let mut session = Session::new(Schema::new(vec![people]).unwrap());
//!
//! let query = QueryNode::new("people")
//!     .sort(SortKey::asc("firstName"))
//!     .select(&["firstName"]);
//! let id = session.register(query, Variables::new()).unwrap();
//!
//! // A transport answering every request with one record.
//! let mut server = |batch: &[Outgoing]| -> Vec<Response> {
//!     batch
//!         .iter()
//!         .map(|_| Some(vec![RawRecord::new("b").with("firstName", "Delphia")]))
//!         .collect()
//! };
//! session.sync(&mut server).unwrap();
//!
//! // A local insert shows up without another round trip.
//! session
//!     .set_client(vec![ClientEdit::set("people", "$1", "firstName", "Aaron")])
//!     .unwrap();
//! assert_eq!(session.state(id).unwrap().node().unwrap().ids(), ["$1", "b"]);
//! ```

pub mod config;
pub mod session;
pub mod transport;
pub mod wire;

pub use config::SessionConfig;
pub use session::{Session, SyncReport};
pub use transport::{Outgoing, Response, Transport};
pub use wire::{RawRecord, WireRequest};
