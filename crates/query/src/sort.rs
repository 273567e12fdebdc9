//! Record comparator for compiled layers.

use crate::ast::{SortKey, SortOrder};
use alloc::vec::Vec;
use core::cmp::Ordering;
use strata_core::{field_value, Record, Value};

/// Values of the sort keys of one record, in key order.
pub type SortValue = Vec<Value>;

/// Compares records by a list of sort keys.
///
/// Nulls sort after every value in ascending order and before every value
/// in descending order. Compiled layers always end with `id asc`, so the
/// order is total.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Comparator {
    keys: Vec<SortKey>,
}

impl Comparator {
    /// Creates a comparator.
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    /// Returns the sort keys.
    #[inline]
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Returns the sorted-on field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.field.as_str())
    }

    /// Extracts the sort values of a record. Missing fields read as `Null`.
    pub fn key(&self, id: &str, record: &Record) -> SortValue {
        self.keys
            .iter()
            .map(|k| field_value(id, record, &k.field).to_value())
            .collect()
    }

    /// Compares two records.
    pub fn compare(&self, a_id: &str, a: &Record, b_id: &str, b: &Record) -> Ordering {
        for key in &self.keys {
            let av = field_value(a_id, a, &key.field).to_value();
            let bv = field_value(b_id, b, &key.field).to_value();
            let cmp = compare_values(&av, &bv, key.order);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    }

    /// Compares two extracted sort values.
    pub fn compare_keys(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((key, av), bv) in self.keys.iter().zip(a).zip(b) {
            let cmp = compare_values(av, bv, key.order);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    }
}

fn compare_values(a: &Value, b: &Value, order: SortOrder) -> Ordering {
    let cmp = match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    };
    match order {
        SortOrder::Asc => cmp,
        SortOrder::Desc => cmp.reverse(),
    }
}
