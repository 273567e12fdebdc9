//! Property-based tests for filter normalization and layer ordering.
//!
//! These tests verify that normalizing a filter never changes which records
//! it accepts, and that the comparator of a compiled layer is a total order
//! consistent with the extracted sort keys.

use proptest::prelude::*;
use std::cmp::Ordering;
use strata_core::schema::{CollectionBuilder, Schema};
use strata_core::{Record, ScalarType, Value};
use strata_query::{compile, CmpOp, FilterExpr, QueryNode, SortKey, Variables};

fn schema() -> Schema {
    let people = CollectionBuilder::new("people")
        .unwrap()
        .scalar("name", ScalarType::String)
        .unwrap()
        .scalar("age", ScalarType::Int)
        .unwrap()
        .build();
    Schema::new(vec![people]).unwrap()
}

/// Strategy for generating a record with optional (null) fields.
fn record_strategy() -> impl Strategy<Value = (String, Record)> {
    (
        "[a-e]",
        prop::option::of(prop::sample::select(vec!["Ada", "Bo", "Cy", "Di"])),
        prop::option::of(0i64..5),
    )
        .prop_map(|(id, name, age)| {
            let mut record = Record::new();
            record.insert("name".into(), Value::from(name));
            record.insert("age".into(), Value::from(age));
            (id, record)
        })
}

fn leaf_strategy() -> impl Strategy<Value = FilterExpr> {
    prop_oneof![
        (0i64..5).prop_map(|v| FilterExpr::eq("age", v)),
        (0i64..5).prop_map(|v| FilterExpr::lt("age", v)),
        (0i64..5).prop_map(|v| FilterExpr::ge("age", v)),
        prop::sample::select(vec!["Ada", "Bo", "Cy"]).prop_map(|v| FilterExpr::ne("name", v)),
        prop::sample::select(vec!["A%", "%o", "_y", "%"]).prop_map(|p| FilterExpr::like("name", p)),
    ]
}

/// Strategy for generating nested filter expressions.
fn expr_strategy() -> impl Strategy<Value = FilterExpr> {
    leaf_strategy().prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(FilterExpr::And),
            prop::collection::vec(inner.clone(), 1..4).prop_map(FilterExpr::Or),
            inner.prop_map(FilterExpr::not),
        ]
    })
}

/// Reference evaluation straight off the caller's expression.
fn reference_eval(expr: &FilterExpr, record: &Record) -> bool {
    match expr {
        FilterExpr::And(children) => children.iter().all(|c| reference_eval(c, record)),
        FilterExpr::Or(children) => children.iter().any(|c| reference_eval(c, record)),
        FilterExpr::Not(inner) => !reference_eval(inner, record),
        FilterExpr::Compare { field, op, operand } => {
            let value = record.get(field).cloned().unwrap_or(Value::Null);
            let arg = match operand {
                strata_query::Operand::Literal(arg) => arg.as_value().cloned().unwrap(),
                strata_query::Operand::Variable(_) => unreachable!(),
            };
            match op {
                CmpOp::Eq => value == arg,
                CmpOp::Ne => value != arg,
                CmpOp::Lt => !value.is_null() && value < arg,
                CmpOp::Ge => !value.is_null() && value >= arg,
                CmpOp::Like => match (value.as_str(), arg.as_str()) {
                    (Some(s), Some(p)) => like_reference(s, p),
                    _ => false,
                },
                _ => unreachable!(),
            }
        }
    }
}

/// Exponential but obviously correct LIKE matcher.
fn like_reference(s: &str, p: &str) -> bool {
    match p.chars().next() {
        None => s.is_empty(),
        Some('%') => {
            let rest = &p[1..];
            (0..=s.len())
                .filter(|i| s.is_char_boundary(*i))
                .any(|i| like_reference(&s[i..], rest))
        }
        Some(c) => match s.chars().next() {
            Some(sc) if c == '_' || c == sc => {
                like_reference(&s[sc.len_utf8()..], &p[c.len_utf8()..])
            }
            _ => false,
        },
    }
}

proptest! {
    /// Property: the normalized filter accepts exactly the records the
    /// original expression accepts.
    #[test]
    fn normalization_preserves_semantics(
        expr in expr_strategy(),
        records in prop::collection::vec(record_strategy(), 1..10),
    ) {
        let query = QueryNode::new("people").filter(expr.clone());
        let layer = compile(&schema(), &query, &Variables::new()).unwrap();
        for (id, record) in &records {
            prop_assert_eq!(layer.matches(id, record), reference_eval(&expr, record));
        }
    }

    /// Property: LIKE agrees with the reference matcher.
    #[test]
    fn like_matches_reference(s in "[ab]{0,6}", p in "[ab%_]{0,5}") {
        prop_assert_eq!(strata_query::ast::like(&s, &p), like_reference(&s, &p));
    }

    /// Property: comparing records and comparing their keys agree, and
    /// distinct ids never compare equal.
    #[test]
    fn comparator_is_total_and_consistent(
        a in record_strategy(),
        b in record_strategy(),
        desc in any::<bool>(),
    ) {
        let key = if desc { SortKey::desc("name") } else { SortKey::asc("name") };
        let query = QueryNode::new("people").sort(key).sort(SortKey::asc("age"));
        let layer = compile(&schema(), &query, &Variables::new()).unwrap();
        let cmp = &layer.sort;

        let by_record = cmp.compare(&a.0, &a.1, &b.0, &b.1);
        let by_key = cmp.compare_keys(&cmp.key(&a.0, &a.1), &cmp.key(&b.0, &b.1));
        prop_assert_eq!(by_record, by_key);
        prop_assert_eq!(by_record, cmp.compare(&b.0, &b.1, &a.0, &a.1).reverse());
        if a.0 != b.0 {
            prop_assert_ne!(by_record, Ordering::Equal);
        }
    }
}
