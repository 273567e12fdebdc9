//! Normalized filters and their evaluation against records.

use crate::ast::expr::{Argument, CmpOp};
use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use strata_core::{field_value, FieldRef, Record, Value};

/// A comparison of one record field against a bound argument.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub field: String,
    pub op: CmpOp,
    pub arg: Argument,
}

impl Predicate {
    /// Creates a new predicate.
    pub fn new(field: impl Into<String>, op: CmpOp, arg: impl Into<Argument>) -> Self {
        Self {
            field: field.into(),
            op,
            arg: arg.into(),
        }
    }

    /// Evaluates the predicate against a record. A missing field reads as
    /// `Null`.
    pub fn eval(&self, id: &str, record: &Record) -> bool {
        match field_value(id, record, &self.field) {
            FieldRef::Id(id) => self.test(&Value::String(id.into())),
            FieldRef::Value(v) => self.test(v),
            FieldRef::Missing => self.test(&Value::Null),
        }
    }

    fn test(&self, value: &Value) -> bool {
        match (&self.op, &self.arg) {
            (CmpOp::Eq, Argument::One(arg)) => value == arg,
            (CmpOp::Ne, Argument::One(arg)) => value != arg,
            (CmpOp::Lt, Argument::One(arg)) => ordered(value, arg) == Some(Ordering::Less),
            (CmpOp::Le, Argument::One(arg)) => {
                matches!(ordered(value, arg), Some(Ordering::Less | Ordering::Equal))
            }
            (CmpOp::Gt, Argument::One(arg)) => ordered(value, arg) == Some(Ordering::Greater),
            (CmpOp::Ge, Argument::One(arg)) => {
                matches!(ordered(value, arg), Some(Ordering::Greater | Ordering::Equal))
            }
            (CmpOp::In, Argument::Many(values)) => values.contains(value),
            (CmpOp::Like, Argument::One(Value::String(pattern))) => {
                value.as_str().is_some_and(|s| like(s, pattern))
            }
            _ => false,
        }
    }
}

/// Orders two values of comparable kinds. Nulls and mismatched kinds do not
/// compare.
fn ordered(a: &Value, b: &Value) -> Option<Ordering> {
    let comparable = match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => true,
        _ => core::mem::discriminant(a) == core::mem::discriminant(b),
    };
    comparable.then(|| a.cmp(b))
}

/// Case-sensitive LIKE matching: `%` matches any run of characters, `_`
/// exactly one.
pub fn like(value: &str, pattern: &str) -> bool {
    let text: Vec<char> = value.chars().collect();
    let pat: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    // Position of the last `%` seen and the text index it was retried from.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pat.get(p) {
            Some('%') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '_' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pat[p..].iter().all(|&c| c == '%')
}

/// A normalized filter tree.
///
/// Connectives are flattened (no `And` directly under `And`, no `Or` under
/// `Or`), single-child connectives are collapsed and double negations are
/// removed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(alloc::boxed::Box<Filter>),
    Leaf(Predicate),
}

impl Filter {
    /// Builds a conjunction, flattening nested conjunctions.
    pub fn all(children: Vec<Filter>) -> Filter {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Filter::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(Filter::And(Vec::new()))
        } else {
            Filter::And(flat)
        }
    }

    /// Builds a disjunction, flattening nested disjunctions.
    pub fn any(children: Vec<Filter>) -> Filter {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Filter::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.pop().unwrap_or(Filter::Or(Vec::new()))
        } else {
            Filter::Or(flat)
        }
    }

    /// Builds a negation, removing a double negation.
    pub fn negate(inner: Filter) -> Filter {
        match inner {
            Filter::Not(inner) => *inner,
            other => Filter::Not(alloc::boxed::Box::new(other)),
        }
    }

    /// Evaluates the filter against a record.
    pub fn eval(&self, id: &str, record: &Record) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|c| c.eval(id, record)),
            Filter::Or(children) => children.iter().any(|c| c.eval(id, record)),
            Filter::Not(inner) => !inner.eval(id, record),
            Filter::Leaf(pred) => pred.eval(id, record),
        }
    }

    /// Collects the fields the filter reads.
    pub fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Filter::Not(inner) => inner.collect_fields(out),
            Filter::Leaf(pred) => {
                out.insert(pred.field.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn person(name: Option<&str>, age: i64) -> Record {
        let mut r = Record::new();
        r.insert("firstName".into(), Value::from(name));
        r.insert("age".into(), Value::Int(age));
        r
    }

    #[test]
    fn test_predicate_comparisons() {
        let ena = person(Some("Ena"), 30);
        assert!(Predicate::new("firstName", CmpOp::Eq, "Ena").eval("c", &ena));
        assert!(Predicate::new("age", CmpOp::Ge, 30).eval("c", &ena));
        assert!(Predicate::new("age", CmpOp::Lt, 30.5).eval("c", &ena));
        assert!(!Predicate::new("age", CmpOp::Gt, "30").eval("c", &ena));
        assert!(Predicate::new("id", CmpOp::Eq, "c").eval("c", &ena));
        assert!(Predicate::new(
            "firstName",
            CmpOp::In,
            vec![Value::from("Ena"), Value::from("Ida")]
        )
        .eval("c", &ena));
    }

    #[test]
    fn test_null_never_orders() {
        let nameless = person(None, 30);
        assert!(!Predicate::new("firstName", CmpOp::Lt, "Z").eval("a", &nameless));
        assert!(!Predicate::new("firstName", CmpOp::Gt, "A").eval("a", &nameless));
        assert!(Predicate::new("firstName", CmpOp::Eq, Value::Null).eval("a", &nameless));
        assert!(Predicate::new("nickname", CmpOp::Eq, Value::Null).eval("a", &nameless));
    }

    #[test]
    fn test_like() {
        assert!(like("Esperanza", "Esp%"));
        assert!(like("Esperanza", "%anza"));
        assert!(like("Esperanza", "E_per%a"));
        assert!(like("", "%"));
        assert!(like("abcabc", "%abc"));
        assert!(like("aXbXc", "a%b%c"));
        assert!(!like("Esperanza", "esp%"));
        assert!(!like("Ena", "E_"));
        assert!(!like("", "_"));
    }

    #[test]
    fn test_filter_normalization() {
        let a = Filter::Leaf(Predicate::new("a", CmpOp::Eq, 1));
        let b = Filter::Leaf(Predicate::new("b", CmpOp::Eq, 2));
        let c = Filter::Leaf(Predicate::new("c", CmpOp::Eq, 3));

        let nested = Filter::all(vec![a.clone(), Filter::all(vec![b.clone(), c.clone()])]);
        assert_eq!(nested, Filter::And(vec![a.clone(), b.clone(), c.clone()]));

        assert_eq!(Filter::any(vec![a.clone()]), a);
        assert_eq!(Filter::negate(Filter::negate(b.clone())), b);
    }

    #[test]
    fn test_filter_eval_and_fields() {
        let filter = Filter::any(vec![
            Filter::Leaf(Predicate::new("firstName", CmpOp::Like, "E%")),
            Filter::negate(Filter::Leaf(Predicate::new("age", CmpOp::Lt, 40))),
        ]);
        assert!(filter.eval("c", &person(Some("Ena"), 30)));
        assert!(filter.eval("e", &person(Some("Griffin"), 41)));
        assert!(!filter.eval("b", &person(Some("Delphia"), 22)));

        let mut fields = BTreeSet::new();
        filter.collect_fields(&mut fields);
        assert_eq!(fields.into_iter().collect::<Vec<_>>(), ["age", "firstName"]);
    }
}
