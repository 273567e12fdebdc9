//! Records, record ids and diff status.

use crate::value::Value;
use alloc::collections::BTreeMap;
use alloc::string::String;

/// Identifier of a record within its collection.
pub type RecordId = String;

/// Reserved prefix of ids minted locally for records the server has not
/// seen yet.
pub const NEW_ID_PREFIX: &str = "$";

/// Field name holding the record id.
pub const ID_FIELD: &str = "id";

/// Field name of the creation timestamp every collection carries.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Returns true if `id` was minted locally and is not known to the server.
#[inline]
pub fn is_new_id(id: &str) -> bool {
    id.starts_with(NEW_ID_PREFIX)
}

/// A record: field name to value.
///
/// The id is not stored inside the map; it is the key the record is stored
/// under.
pub type Record = BTreeMap<String, Value>;

/// Relationship between the local overlay and the server value of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiffStatus {
    /// Exists only locally.
    Created,
    /// Edited locally; exists on both sides.
    Modified,
    /// Deleted locally.
    Deleted,
}

impl DiffStatus {
    /// Returns the numeric code (`1`, `0`, `-1`).
    #[inline]
    pub fn code(&self) -> i8 {
        match self {
            DiffStatus::Created => 1,
            DiffStatus::Modified => 0,
            DiffStatus::Deleted => -1,
        }
    }
}

/// Reads a field of a record, treating the id as a regular field.
pub fn field_value<'a>(id: &'a str, record: &'a Record, field: &str) -> FieldRef<'a> {
    if field == ID_FIELD {
        FieldRef::Id(id)
    } else {
        match record.get(field) {
            Some(v) => FieldRef::Value(v),
            None => FieldRef::Missing,
        }
    }
}

/// Borrowed view of a record field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldRef<'a> {
    /// The record id.
    Id(&'a str),
    /// A stored value.
    Value(&'a Value),
    /// The field is not present in the record.
    Missing,
}

impl FieldRef<'_> {
    /// Returns true unless the field is missing.
    #[inline]
    pub fn is_present(&self) -> bool {
        !matches!(self, FieldRef::Missing)
    }

    /// Returns an owned value; the id becomes a string and a missing field
    /// becomes `Null`.
    pub fn to_value(&self) -> Value {
        match self {
            FieldRef::Id(id) => Value::String((*id).into()),
            FieldRef::Value(v) => (*v).clone(),
            FieldRef::Missing => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_new_id() {
        assert!(is_new_id("$1"));
        assert!(!is_new_id("a1"));
        assert!(!is_new_id(""));
    }

    #[test]
    fn test_diff_status_codes() {
        assert_eq!(DiffStatus::Created.code(), 1);
        assert_eq!(DiffStatus::Modified.code(), 0);
        assert_eq!(DiffStatus::Deleted.code(), -1);
    }

    #[test]
    fn test_field_value() {
        let mut record = Record::new();
        record.insert("name".into(), Value::from("Ena"));

        assert_eq!(field_value("p1", &record, "id"), FieldRef::Id("p1"));
        assert_eq!(field_value("p1", &record, "name").to_value(), Value::from("Ena"));
        assert!(!field_value("p1", &record, "age").is_present());
        assert!(field_value("p1", &record, "age").to_value().is_null());
    }
}
