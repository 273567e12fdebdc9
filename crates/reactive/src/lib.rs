//! Strata Reactive - Live queries and result patches.
//!
//! This crate keeps registered queries up to date as the record store
//! changes and tells subscribers what changed.
//!
//! # Core Concepts
//!
//! - `LiveQuery`: a compiled query with its window book, tracker and state
//! - `QueryRegistry`: owns live queries and routes store changes to them
//! - `QueryState`: loading, ready with a result, or failed
//! - `Patch`: the difference between two results, from an LCS alignment
//!
//! # Example
//!
//! ```rust
//! use strata_incremental::Node;
//! use strata_reactive::{apply_patch, diff_node};
//! use strata_core::Value;
//!
//! let old = Node::List(vec![Node::Scalar(Value::Int(1)), Node::Scalar(Value::Int(2))]);
//! let new = Node::List(vec![Node::Scalar(Value::Int(2)), Node::Scalar(Value::Int(3))]);
//!
//! let patch = diff_node(&old, &new).unwrap();
//! let mut node = old.clone();
//! apply_patch(&mut node, &patch);
//! assert_eq!(node, new);
//! ```

#![no_std]

extern crate alloc;

pub mod differ;
pub mod notify;
pub mod observable;
pub mod state;
pub mod subscription;

pub use differ::{apply_ops, apply_patch, diff_node, diff_sequence, Patch, SeqOp};
pub use notify::QueryRegistry;
pub use observable::LiveQuery;
pub use state::{Notification, QueryId, QueryState};
pub use subscription::{Subscribers, SubscriptionId};

// Re-export commonly used types from dependencies
pub use strata_incremental::{Node, Unsatisfied};
