//! Scalar type definitions and their codecs.
//!
//! Raw values arrive from the transport in a loosely typed form. Each scalar
//! field declares a `ScalarType` which normalizes the raw value on the way in
//! (`decode`) and renders it back for the wire (`encode`).

use crate::error::{Error, Result};
use crate::value::Value;
use alloc::format;

/// Scalar types a collection field can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Pass-through: any scalar value is accepted unchanged.
    Any,
    /// Boolean type
    Boolean,
    /// 64-bit signed integer
    Int,
    /// 64-bit floating point number
    Float,
    /// UTF-8 string
    String,
    /// Date and time stored as Unix timestamp (milliseconds)
    DateTime,
}

impl ScalarType {
    /// Returns the type name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Any => "any",
            ScalarType::Boolean => "boolean",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::String => "string",
            ScalarType::DateTime => "datetime",
        }
    }

    /// Decodes a raw value for a field of this type.
    ///
    /// `Null` is accepted for every type. Integers widen to floats, and
    /// date-times accept epoch milliseconds given as integers or floats.
    pub fn decode(&self, field: &str, raw: Value) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match (self, raw) {
            (ScalarType::Any, v) if !v.is_reference() => Ok(v),
            (ScalarType::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(b)),
            (ScalarType::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (ScalarType::Int, Value::Float(f)) if (f as i64) as f64 == f => Ok(Value::Int(f as i64)),
            (ScalarType::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (ScalarType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ScalarType::String, Value::String(s)) => Ok(Value::String(s)),
            (ScalarType::DateTime, Value::DateTime(ms)) => Ok(Value::DateTime(ms)),
            (ScalarType::DateTime, Value::Int(ms)) => Ok(Value::DateTime(ms)),
            (ScalarType::DateTime, Value::Float(ms)) => Ok(Value::DateTime(ms as i64)),
            (ty, other) => Err(Error::decode(
                field,
                format!("expected {}, got {}", ty.name(), other.kind_name()),
            )),
        }
    }

    /// Encodes a stored value for the wire.
    ///
    /// Date-times leave the cache as epoch milliseconds.
    pub fn encode(&self, value: &Value) -> Value {
        match (self, value) {
            (ScalarType::DateTime, Value::DateTime(ms)) => Value::Int(*ms),
            (_, v) => v.clone(),
        }
    }
}
