//! Writes accepted by the record store and their validation.
//!
//! Both server writes and local edits are decoded against the schema before
//! the store is touched, so a rejected batch leaves no trace.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::schema::Schema;
use strata_core::{Error, Record, RecordId, Result, Value, ID_FIELD};

/// One authoritative record delivered by the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerWrite {
    /// The server returned these raw fields.
    Present {
        collection: String,
        id: RecordId,
        fields: Record,
        /// Fields the request asked for. Any of them missing from `fields`
        /// is stored as `Null`.
        requested: Vec<String>,
    },
    /// The server confirmed the record does not exist.
    Deleted { collection: String, id: RecordId },
}

impl ServerWrite {
    /// Creates a write for a returned record.
    pub fn present(collection: &str, id: &str, fields: Record) -> Self {
        ServerWrite::Present {
            collection: collection.into(),
            id: id.into(),
            fields,
            requested: Vec::new(),
        }
    }

    /// Creates a write for a returned record along with the requested fields.
    pub fn fetched(collection: &str, id: &str, fields: Record, requested: Vec<String>) -> Self {
        ServerWrite::Present {
            collection: collection.into(),
            id: id.into(),
            fields,
            requested,
        }
    }

    /// Creates a confirmed deletion.
    pub fn deleted(collection: &str, id: &str) -> Self {
        ServerWrite::Deleted {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        match self {
            ServerWrite::Present { collection, .. } | ServerWrite::Deleted { collection, .. } => {
                collection
            }
        }
    }

    /// Returns the record id.
    pub fn id(&self) -> &str {
        match self {
            ServerWrite::Present { id, .. } | ServerWrite::Deleted { id, .. } => id,
        }
    }
}

/// A local edit.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEdit {
    /// Overrides a field; `None` drops the override so the server value shows.
    SetField {
        collection: String,
        id: RecordId,
        field: String,
        value: Option<Value>,
    },
    /// Hides the record locally.
    DeleteRecord { collection: String, id: RecordId },
    /// Drops every local edit of one record.
    ClearRecord { collection: String, id: RecordId },
    /// Drops every local edit of one collection.
    ClearCollection { collection: String },
}

impl ClientEdit {
    /// Creates a field override.
    pub fn set(collection: &str, id: &str, field: &str, value: impl Into<Value>) -> Self {
        ClientEdit::SetField {
            collection: collection.into(),
            id: id.into(),
            field: field.into(),
            value: Some(value.into()),
        }
    }

    /// Creates an edit that reverts a field to its server value.
    pub fn unset(collection: &str, id: &str, field: &str) -> Self {
        ClientEdit::SetField {
            collection: collection.into(),
            id: id.into(),
            field: field.into(),
            value: None,
        }
    }

    /// Creates a local delete.
    pub fn delete(collection: &str, id: &str) -> Self {
        ClientEdit::DeleteRecord {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates an edit dropping the local overlay of one record.
    pub fn clear(collection: &str, id: &str) -> Self {
        ClientEdit::ClearRecord {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates an edit dropping every local overlay of a collection.
    pub fn clear_collection(collection: &str) -> Self {
        ClientEdit::ClearCollection {
            collection: collection.into(),
        }
    }

    /// Returns the collection name.
    pub fn collection(&self) -> &str {
        match self {
            ClientEdit::SetField { collection, .. }
            | ClientEdit::DeleteRecord { collection, .. }
            | ClientEdit::ClearRecord { collection, .. }
            | ClientEdit::ClearCollection { collection } => collection,
        }
    }
}

/// Decodes the raw fields of a server write.
///
/// The id field is dropped (the record is keyed by it) and requested fields
/// the payload omits become `Null`.
pub(crate) fn decode_server_fields(
    schema: &Schema,
    collection: &str,
    fields: Record,
    requested: &[String],
) -> Result<Record> {
    let def = schema.collection(collection)?;
    let mut decoded = Record::new();
    for (name, raw) in fields {
        if name == ID_FIELD {
            continue;
        }
        let field = def.field(&name)?;
        decoded.insert(name, field.decode(raw)?);
    }
    for name in requested {
        if name == ID_FIELD || decoded.contains_key(name) {
            continue;
        }
        let field = def.field(name)?;
        if field.is_stored() {
            decoded.insert(name.clone(), Value::Null);
        }
    }
    Ok(decoded)
}

/// Validates a local edit, decoding the value of a field override.
pub(crate) fn validate_edit(schema: &Schema, edit: ClientEdit) -> Result<ClientEdit> {
    let def = schema.collection(edit.collection())?;
    match edit {
        ClientEdit::SetField {
            collection,
            id,
            field,
            value,
        } => {
            if id.is_empty() {
                return Err(Error::invalid_edit("record id cannot be empty"));
            }
            if field == ID_FIELD {
                return Err(Error::invalid_edit(format!(
                    "cannot override the id of {}/{}",
                    collection, id
                )));
            }
            let def_field = def.field(&field)?;
            if !def_field.is_stored() {
                return Err(Error::invalid_edit(format!(
                    "{}.{} is derived from its inverse and cannot be set",
                    collection, field
                )));
            }
            let value = value.map(|v| def_field.decode(v)).transpose()?;
            Ok(ClientEdit::SetField {
                collection,
                id,
                field,
                value,
            })
        }
        ClientEdit::DeleteRecord { ref id, .. } | ClientEdit::ClearRecord { ref id, .. }
            if id.is_empty() =>
        {
            Err(Error::invalid_edit("record id cannot be empty"))
        }
        other => Ok(other),
    }
}
