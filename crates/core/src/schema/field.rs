//! Field definition for Strata collections.

use crate::error::{Error, Result};
use crate::types::ScalarType;
use crate::value::Value;
use alloc::format;
use alloc::string::String;

/// A relation from one collection to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    /// Target collection.
    pub target: String,
    /// Field on the target pointing back at the owner. Set for one-to-many
    /// "foreign" relations whose ids are not stored on the owner.
    pub inverse: Option<String>,
    /// Whether the relation yields a list of records.
    pub list: bool,
}

impl Relation {
    /// Returns true for relations resolved through the inverse field.
    #[inline]
    pub fn is_foreign(&self) -> bool {
        self.inverse.is_some()
    }
}

/// What a field holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// A scalar value.
    Scalar(ScalarType),
    /// A relation to another collection.
    Relation(Relation),
}

/// A field definition in a collection schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    name: String,
    /// Field kind.
    kind: FieldKind,
}

impl Field {
    /// Creates a scalar field.
    pub fn scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar(ty),
        }
    }

    /// Creates a single-record relation stored as one id.
    pub fn single(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Relation(Relation {
                target: target.into(),
                inverse: None,
                list: false,
            }),
        }
    }

    /// Creates a list relation stored as an ordered list of ids.
    pub fn list(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Relation(Relation {
                target: target.into(),
                inverse: None,
                list: true,
            }),
        }
    }

    /// Creates a one-to-many relation resolved through `inverse` on the target.
    pub fn foreign(
        name: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Relation(Relation {
                target: target.into(),
                inverse: Some(inverse.into()),
                list: true,
            }),
        }
    }

    /// Returns the field name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field kind.
    #[inline]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Returns the relation if this field is one.
    pub fn relation(&self) -> Option<&Relation> {
        match &self.kind {
            FieldKind::Relation(rel) => Some(rel),
            FieldKind::Scalar(_) => None,
        }
    }

    /// Returns true for scalar fields.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, FieldKind::Scalar(_))
    }

    /// Returns true if values of this field live on the record itself.
    ///
    /// Foreign relations are derived from the target's inverse field.
    #[inline]
    pub fn is_stored(&self) -> bool {
        !matches!(&self.kind, FieldKind::Relation(rel) if rel.is_foreign())
    }

    /// Decodes a raw value for this field.
    ///
    /// Relations accept ids as strings or references; single relations take
    /// one id, list relations a list.
    pub fn decode(&self, raw: Value) -> Result<Value> {
        match &self.kind {
            FieldKind::Scalar(ty) => ty.decode(&self.name, raw),
            FieldKind::Relation(rel) if !self.is_stored() => Err(Error::decode(
                &self.name,
                format!("foreign relation to {} is not stored on the record", rel.target),
            )),
            FieldKind::Relation(rel) => match (rel.list, raw) {
                (_, Value::Null) => Ok(Value::Null),
                (false, Value::Ref(id)) | (false, Value::String(id)) => Ok(Value::Ref(id)),
                (true, Value::RefList(ids)) => Ok(Value::RefList(ids)),
                (list, other) => Err(Error::decode(
                    &self.name,
                    format!(
                        "expected {} to {}, got {}",
                        if list { "id list" } else { "id" },
                        rel.target,
                        other.kind_name()
                    ),
                )),
            },
        }
    }
}
