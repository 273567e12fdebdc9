//! Strata Core - Core types and schema definitions for the Strata reactive cache.
//!
//! This crate provides the foundational types shared by every Strata crate:
//!
//! - `Value`: values a record field can hold (scalars and foreign-key ids)
//! - `Record`, `RecordId`, `DiffStatus`: records and their local/server status
//! - `schema`: collection and field definitions with scalar codecs
//! - `ChangeMap`: field-level change bookkeeping
//! - `Error`: the shared error type
//!
//! # Example
//!
//! ```rust
//! use strata_core::{ScalarType, Value};
//! use strata_core::schema::{CollectionBuilder, Schema};
//!
//! let people = CollectionBuilder::new("people")
//!     .unwrap()
//!     .scalar("firstName", ScalarType::String)
//!     .unwrap()
//!     .build();
//! let schema = Schema::new(vec![people]).unwrap();
//!
//! let field = schema.collection("people").unwrap().field("firstName").unwrap();
//! assert_eq!(field.decode(Value::from("Ena")).unwrap(), Value::from("Ena"));
//! ```

#![no_std]

extern crate alloc;

mod changes;
mod error;
mod record;
pub mod schema;
mod types;
mod value;

pub use changes::ChangeMap;
pub use error::{Error, Result};
pub use record::{
    field_value, is_new_id, DiffStatus, FieldRef, Record, RecordId, CREATED_AT_FIELD, ID_FIELD,
    NEW_ID_PREFIX,
};
pub use types::ScalarType;
pub use value::Value;
