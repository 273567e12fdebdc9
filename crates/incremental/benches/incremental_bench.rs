//! Benchmarks for strata-incremental.
//!
//! Measures planning, materialization and the edit-then-rematerialize loop
//! against stores of growing size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::schema::{CollectionBuilder, Schema};
use strata_core::{Record, ScalarType, Value};
use strata_incremental::{materialize, plan, Tracker, Window, WindowAnchor, WindowBook, WindowKey};
use strata_query::{compile, Layer, QueryNode, SortKey, Variables};
use strata_store::{ClientEdit, RecordStore, ServerWrite};

fn schema() -> Schema {
    let people = CollectionBuilder::new("people")
        .unwrap()
        .scalar("firstName", ScalarType::String)
        .unwrap()
        .scalar("age", ScalarType::Int)
        .unwrap()
        .build();
    Schema::new(vec![people]).unwrap()
}

fn layer() -> Layer {
    let query = QueryNode::new("people")
        .sort(SortKey::asc("age"))
        .skip(10)
        .show(20)
        .select(&["firstName", "age"]);
    compile(&schema(), &query, &Variables::new()).unwrap()
}

/// A store holding `size` server records, all returned by one unbounded
/// window fetch.
fn setup(size: usize) -> (Schema, Layer, RecordStore, WindowBook) {
    let schema = schema();
    let layer = layer();
    let mut store = RecordStore::new();
    let writes = (0..size)
        .map(|i| {
            let mut fields = Record::new();
            fields.insert("firstName".into(), Value::from(format!("name{}", i)));
            fields.insert("age".into(), Value::Int(i as i64));
            ServerWrite::present("people", &format!("p{:06}", i), fields)
        })
        .collect();
    store.set_server(&schema, writes).unwrap();

    let ids: Vec<String> = (0..size).map(|i| format!("p{:06}", i)).collect();
    let mut book = WindowBook::new();
    let first = plan(&layer, &store, &book, 5);
    book.record(&first);
    book.set_anchor(
        WindowKey::root("people"),
        WindowAnchor::from_response(Window::new(0, None), &ids),
    );
    (schema, layer, store, book)
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");

    for size in [100, 1000, 10000] {
        let (_, layer, store, book) = setup(size);
        group.bench_with_input(BenchmarkId::new("satisfied", size), &size, |b, _| {
            b.iter(|| plan(black_box(&layer), &store, &book, 5))
        });
    }

    group.finish();
}

fn bench_materialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize");

    for size in [100, 1000, 10000] {
        let (_, layer, store, book) = setup(size);
        group.bench_with_input(BenchmarkId::new("window_20", size), &size, |b, _| {
            b.iter(|| materialize(black_box(&layer), &store, &book).unwrap())
        });
    }

    group.finish();
}

fn bench_local_edit(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_edit");

    for size in [100, 1000, 10000] {
        let (schema, layer, mut store, book) = setup(size);
        let mut tracker = Tracker::new();
        tracker.observe(&layer, &materialize(&layer, &store, &book).unwrap());
        let mut age = 0i64;

        group.bench_with_input(BenchmarkId::new("move_and_rematerialize", size), &size, |b, _| {
            b.iter(|| {
                age = (age + 7) % size as i64;
                let changes = store
                    .set_client(&schema, vec![ClientEdit::set("people", "p000015", "age", age)])
                    .unwrap();
                black_box(tracker.update(&layer, &changes));
                materialize(&layer, &store, &book).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan, bench_materialize, bench_local_edit);
criterion_main!(benches);
