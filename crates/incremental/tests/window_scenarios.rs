//! End-to-end planning and materialization against an in-memory server.

use std::collections::BTreeMap;
use strata_core::schema::{CollectionBuilder, Schema};
use strata_core::{Record, ScalarType, Value};
use strata_incremental::select::in_server_sequence;
use strata_incremental::{
    anchor_response, materialize, plan, MissReason, Node, Parent, Plan, RequestKind, Tracker,
    UpdateKind, WindowBook, WindowKey,
};
use strata_query::{compile, Layer, QueryNode, SortKey, Variables};
use strata_store::{ClientEdit, RecordStore, ServerWrite};

fn schema() -> Schema {
    let people = CollectionBuilder::new("people")
        .unwrap()
        .scalar("firstName", ScalarType::String)
        .unwrap()
        .foreign("posts", "posts", "author")
        .unwrap()
        .build();
    let posts = CollectionBuilder::new("posts")
        .unwrap()
        .scalar("title", ScalarType::String)
        .unwrap()
        .single("author", "people")
        .unwrap()
        .build();
    Schema::new(vec![people, posts]).unwrap()
}

/// Authoritative records, answering requests the way a server would.
struct Server {
    tables: BTreeMap<String, BTreeMap<String, Record>>,
}

impl Server {
    fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    fn person(mut self, id: &str, name: Option<&str>) -> Self {
        let mut record = Record::new();
        record.insert("firstName".into(), Value::from(name));
        self.tables
            .entry("people".into())
            .or_default()
            .insert(id.into(), record);
        self
    }

    fn post(mut self, id: &str, author: &str, title: &str) -> Self {
        let mut record = Record::new();
        record.insert("title".into(), Value::from(title));
        record.insert("author".into(), Value::Ref(author.into()));
        self.tables
            .entry("posts".into())
            .or_default()
            .insert(id.into(), record);
        self
    }

    fn answer(&self, root: &Layer, plan: &Plan, store: &mut RecordStore, book: &mut WindowBook) {
        let empty = BTreeMap::new();
        let mut responses = Vec::new();
        for request in &plan.requests {
            let layer = root.find(&request.path).unwrap();
            let table = self.tables.get(&request.collection).unwrap_or(&empty);
            let project = |record: &Record| -> Record {
                record
                    .iter()
                    .filter(|(k, _)| request.fields.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            };
            match &request.kind {
                RequestKind::Window { key, window } => {
                    let parent = match &key.parent {
                        Some(id) => Parent::Row {
                            collection: "people",
                            id,
                        },
                        None => Parent::Root,
                    };
                    let mut rows: Vec<_> = table
                        .iter()
                        .filter(|(id, r)| in_server_sequence(layer, parent, id, r))
                        .collect();
                    rows.sort_by(|a, b| layer.sort.compare(a.0, a.1, b.0, b.1));
                    let rows: Vec<_> = rows
                        .into_iter()
                        .skip(window.skip)
                        .take(window.show.unwrap_or(usize::MAX))
                        .collect();
                    let writes = rows
                        .iter()
                        .map(|(id, r)| {
                            ServerWrite::fetched(&request.collection, id, project(r), request.fields.clone())
                        })
                        .collect();
                    store.set_server(&schema(), writes).unwrap();
                    let ids: Vec<String> = rows.iter().map(|(id, _)| (*id).clone()).collect();
                    responses.push((key.clone(), *window, ids));
                }
                RequestKind::Ids(ids) => {
                    let writes = ids
                        .iter()
                        .map(|id| match table.get(id) {
                            Some(r) => ServerWrite::fetched(
                                &request.collection,
                                id,
                                project(r),
                                request.fields.clone(),
                            ),
                            None => ServerWrite::deleted(&request.collection, id),
                        })
                        .collect();
                    store.set_server(&schema(), writes).unwrap();
                }
            }
        }
        for (key, window, ids) in responses {
            let anchor = anchor_response(root, &key, store, window, &ids).unwrap();
            book.set_anchor(key, anchor);
        }
    }
}

/// Plans and answers until the query needs nothing more.
fn sync(server: &Server, layer: &Layer, store: &mut RecordStore, book: &mut WindowBook, margin: usize) {
    for _ in 0..5 {
        let plan = plan(layer, store, book, margin);
        if plan.is_empty() {
            return;
        }
        book.record(&plan);
        server.answer(layer, &plan, store, book);
    }
    panic!("planning did not settle");
}

fn people() -> Server {
    Server::new()
        .person("a", None)
        .person("b", Some("Delphia"))
        .person("c", Some("Ena"))
        .person("d", Some("Esperanza"))
        .person("e", Some("Griffin"))
}

fn names_query() -> Layer {
    let query = QueryNode::new("people")
        .sort(SortKey::asc("firstName"))
        .skip(1)
        .show(2)
        .select(&["firstName"]);
    compile(&schema(), &query, &Variables::new()).unwrap()
}

fn names(node: &Node) -> Vec<String> {
    node.as_list()
        .unwrap()
        .iter()
        .map(|row| {
            row.get("firstName")
                .and_then(Node::as_value)
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string()
        })
        .collect()
}

/// A synced cache holding people `[0, 4)` for the window `[1, 3)`.
fn synced() -> (Layer, RecordStore, WindowBook) {
    let layer = names_query();
    let mut store = RecordStore::new();
    let mut book = WindowBook::new();
    sync(&people(), &layer, &mut store, &mut book, 1);
    (layer, store, book)
}

fn edit(store: &mut RecordStore, edits: Vec<ClientEdit>) -> strata_core::ChangeMap {
    store.set_client(&schema(), edits).unwrap()
}

#[test]
fn test_margin_window_is_fetched() {
    let layer = names_query();
    let first = plan(&layer, &RecordStore::new(), &WindowBook::new(), 1);
    match &first.requests[0].kind {
        RequestKind::Window { window, .. } => {
            assert_eq!((window.skip, window.show), (0, Some(4)));
        }
        other => panic!("unexpected request {:?}", other),
    }

    let (layer, store, book) = synced();
    let node = materialize(&layer, &store, &book).unwrap();
    assert_eq!(names(&node), ["Ena", "Esperanza"]);
    let anchor = book.anchor(&WindowKey::root("people")).unwrap();
    assert_eq!(anchor.first_id.as_deref(), Some("b"));
    assert!(!anchor.exhausted);
}

#[test]
fn test_rename_moves_record_into_window() {
    let (layer, mut store, book) = synced();
    let mut tracker = Tracker::new();
    tracker.observe(&layer, &materialize(&layer, &store, &book).unwrap());

    let changes = edit(&mut store, vec![ClientEdit::set("people", "b", "firstName", "Faye")]);
    assert_eq!(tracker.update(&layer, &changes), UpdateKind::Recompute);

    let node = materialize(&layer, &store, &book).unwrap();
    assert_eq!(names(&node), ["Esperanza", "Faye"]);
}

#[test]
fn test_delete_shifts_window() {
    let (layer, mut store, book) = synced();
    edit(&mut store, vec![ClientEdit::delete("people", "b")]);
    let node = materialize(&layer, &store, &book).unwrap();
    assert_eq!(names(&node), ["Esperanza", "Griffin"]);
}

#[test]
fn test_insert_before_window() {
    let (layer, mut store, book) = synced();
    edit(&mut store, vec![ClientEdit::set("people", "$1", "firstName", "Aaron")]);

    let node = materialize(&layer, &store, &book).unwrap();
    assert_eq!(names(&node), ["Delphia", "Ena"]);

    let next = plan(&layer, &store, &book, 1);
    assert_eq!(next.extra(&WindowKey::root("people")).unwrap().skip, 1);
}

#[test]
fn test_insert_inside_window() {
    let (layer, mut store, book) = synced();
    edit(&mut store, vec![ClientEdit::set("people", "$1", "firstName", "Eric")]);
    let node = materialize(&layer, &store, &book).unwrap();
    assert_eq!(names(&node), ["Ena", "Eric"]);
}

#[test]
fn test_unknown_record_is_fetched_without_margin() {
    let server = people();
    let layer = names_query();
    let mut store = RecordStore::new();
    let mut book = WindowBook::new();
    sync(&server, &layer, &mut store, &mut book, 0);
    assert_eq!(names(&materialize(&layer, &store, &book).unwrap()), ["Ena", "Esperanza"]);

    edit(&mut store, vec![ClientEdit::set("people", "b", "firstName", "Faye")]);
    let err = materialize(&layer, &store, &book).unwrap_err();
    assert_eq!(err.reason, MissReason::ServerDataMissing);

    let next = plan(&layer, &store, &book, 0);
    assert!(next
        .requests
        .iter()
        .any(|r| matches!(&r.kind, RequestKind::Ids(ids) if ids == &["b".to_string()])));

    sync(&server, &layer, &mut store, &mut book, 0);
    assert_eq!(names(&materialize(&layer, &store, &book).unwrap()), ["Esperanza", "Faye"]);
}

#[test]
fn test_foreign_relation_windows_per_parent() {
    let server = Server::new()
        .person("b", Some("Delphia"))
        .person("c", Some("Ena"))
        .post("p1", "b", "Alpha")
        .post("p2", "b", "Beta")
        .post("p3", "c", "Gamma");
    let query = QueryNode::new("people")
        .sort(SortKey::asc("firstName"))
        .select(&["firstName"])
        .relation(
            QueryNode::new("posts")
                .sort(SortKey::asc("title"))
                .show(1)
                .select(&["title"]),
        );
    let layer = compile(&schema(), &query, &Variables::new()).unwrap();
    let mut store = RecordStore::new();
    let mut book = WindowBook::new();
    sync(&server, &layer, &mut store, &mut book, 0);

    let titles = |node: &Node| -> Vec<Vec<String>> {
        node.as_list()
            .unwrap()
            .iter()
            .map(|person| {
                person
                    .get("posts")
                    .unwrap()
                    .as_list()
                    .unwrap()
                    .iter()
                    .map(|post| post.get("title").unwrap().as_value().unwrap().as_str().unwrap().to_string())
                    .collect()
            })
            .collect()
    };

    let node = materialize(&layer, &store, &book).unwrap();
    assert_eq!(titles(&node), [vec!["Alpha"], vec!["Gamma"]]);
    assert!(book.anchor(&WindowKey::new("people.posts", Some("b"))).is_some());

    edit(
        &mut store,
        vec![
            ClientEdit::set("posts", "$n", "title", "Aardvark"),
            ClientEdit::set("posts", "$n", "author", Value::Ref("b".into())),
        ],
    );
    let node = materialize(&layer, &store, &book).unwrap();
    assert_eq!(titles(&node), [vec!["Aardvark"], vec!["Gamma"]]);
}

#[test]
fn test_local_parent_needs_no_fetch() {
    let query = QueryNode::new("people")
        .sort(SortKey::asc("firstName"))
        .select(&["firstName"])
        .relation(QueryNode::new("posts").sort(SortKey::asc("title")).select(&["title"]));
    let layer = compile(&schema(), &query, &Variables::new()).unwrap();
    let mut store = RecordStore::new();
    let mut book = WindowBook::new();
    sync(&Server::new(), &layer, &mut store, &mut book, 0);

    edit(
        &mut store,
        vec![
            ClientEdit::set("people", "$p", "firstName", "Nova"),
            ClientEdit::set("posts", "$q", "title", "Hello"),
            ClientEdit::set("posts", "$q", "author", Value::Ref("$p".into())),
        ],
    );
    let node = materialize(&layer, &store, &book).unwrap();
    let nova = &node.as_list().unwrap()[0];
    assert_eq!(nova.get("posts").unwrap().ids(), ["$q"]);
    assert!(plan(&layer, &store, &book, 0).is_empty());
}
