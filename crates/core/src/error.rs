//! Error types for Strata.

use alloc::string::String;
use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types shared by every Strata crate.
///
/// Errors are cheap to clone so that a failed query can hand the same value
/// to every subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Invalid schema definition.
    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },
    /// A collection name is not part of the schema.
    #[error("Unknown collection: {name}")]
    UnknownCollection { name: String },
    /// A field name is not part of a collection.
    #[error("Unknown field {field} in collection {collection}")]
    UnknownField { collection: String, field: String },
    /// A query description could not be compiled.
    #[error("Bad query: {message}")]
    BadQuery { message: String },
    /// A raw value could not be decoded for its field.
    #[error("Cannot decode field {field}: {message}")]
    Decode { field: String, message: String },
    /// A local edit batch was rejected before it was applied.
    #[error("Invalid edit: {message}")]
    InvalidEdit { message: String },
    /// A network request failed or returned no data.
    #[error("Transport error: {message}")]
    Transport { message: String },
    /// An internal invariant does not hold. Always a logic defect.
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },
}

impl Error {
    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an unknown collection error.
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Error::UnknownCollection { name: name.into() }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Error::UnknownField {
            collection: collection.into(),
            field: field.into(),
        }
    }

    /// Creates a bad query error.
    pub fn bad_query(message: impl Into<String>) -> Self {
        Error::BadQuery {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decode {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid edit error.
    pub fn invalid_edit(message: impl Into<String>) -> Self {
        Error::InvalidEdit {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Error::InvariantViolation {
            message: message.into(),
        }
    }

    /// Returns true for errors raised while compiling a query.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownCollection { .. } | Error::UnknownField { .. } | Error::BadQuery { .. }
        )
    }
}
