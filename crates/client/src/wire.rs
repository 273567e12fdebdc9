//! JSON wire codec.
//!
//! Raw records arrive as JSON objects keyed by field name; requests leave as
//! a JSON `variables` document describing the window or the ids to fetch.
//! Values are converted loosely here and decoded against the schema by the
//! record store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};
use strata_core::schema::{Collection, FieldKind, Schema};
use strata_core::{Error, Record, Result, Value, ID_FIELD};
use strata_incremental::{FetchRequest, RequestKind};
use strata_query::{Argument, CmpOp, Comparator, Filter, Layer, Predicate, SortKey, SortOrder};

/// One record as the server returns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Json>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Adds a field.
    pub fn with(mut self, field: &str, value: impl Into<Json>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

/// Converts a stored value to JSON. Date-times leave as epoch milliseconds
/// and references as id strings.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Int(i) | Value::DateTime(i) => Json::Number((*i).into()),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) | Value::Ref(s) => Json::String(s.clone()),
        Value::RefList(ids) => Json::Array(ids.iter().cloned().map(Json::String).collect()),
    }
}

/// Reads an id from a string or from an object carrying an `id`.
fn json_id(field: &str, json: &Json) -> Result<String> {
    match json {
        Json::String(id) => Ok(id.clone()),
        Json::Object(obj) => match obj.get(ID_FIELD) {
            Some(Json::String(id)) => Ok(id.clone()),
            _ => Err(Error::decode(field, "nested record without a string id")),
        },
        other => Err(Error::decode(field, format!("expected an id, got {}", other))),
    }
}

/// Converts a JSON value for a field into an undecoded value.
pub fn json_to_value(kind: &FieldKind, field: &str, json: &Json) -> Result<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    match kind {
        FieldKind::Relation(rel) if rel.list => match json {
            Json::Array(items) => items
                .iter()
                .map(|item| json_id(field, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::RefList),
            other => Err(Error::decode(field, format!("expected an id list, got {}", other))),
        },
        FieldKind::Relation(_) => json_id(field, json).map(Value::Ref),
        FieldKind::Scalar(_) => match json {
            Json::Bool(b) => Ok(Value::Boolean(*b)),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .ok_or_else(|| Error::decode(field, format!("number {} out of range", n))),
            Json::String(s) => Ok(Value::String(s.clone())),
            other => Err(Error::decode(field, format!("expected a scalar, got {}", other))),
        },
    }
}

/// Converts the fields of a raw record. Fields the schema does not know are
/// skipped.
pub fn decode_record(schema: &Schema, collection: &str, raw: &RawRecord) -> Result<Record> {
    let def = schema.collection(collection)?;
    let mut record = Record::new();
    for (name, json) in &raw.fields {
        if name == ID_FIELD {
            continue;
        }
        match def.get_field(name) {
            Some(field) if field.is_stored() => {
                record.insert(name.clone(), json_to_value(field.kind(), name, json)?);
            }
            Some(_) => {}
            None => tracing::trace!(collection, field = %name, "skipped unknown field"),
        }
    }
    Ok(record)
}

/// Renders a stored record, limited to `fields`.
pub fn encode_record(schema: &Schema, collection: &str, id: &str, record: &Record, fields: &[String]) -> Result<RawRecord> {
    let def = schema.collection(collection)?;
    let mut raw = RawRecord::new(id);
    for name in fields.iter().filter(|f| *f != ID_FIELD) {
        let field = def.field(name)?;
        let value = record.get(name).cloned().unwrap_or(Value::Null);
        let value = match field.kind() {
            FieldKind::Scalar(ty) => ty.encode(&value),
            FieldKind::Relation(_) => value,
        };
        raw.fields.insert(name.clone(), value_to_json(&value));
    }
    Ok(raw)
}

/// A filter as sent over the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WireFilter {
    And(Vec<WireFilter>),
    Or(Vec<WireFilter>),
    Not(Box<WireFilter>),
    Compare { field: String, op: String, value: Json },
}

fn parse_op(name: &str) -> Result<CmpOp> {
    Ok(match name {
        "eq" => CmpOp::Eq,
        "ne" => CmpOp::Ne,
        "lt" => CmpOp::Lt,
        "le" => CmpOp::Le,
        "gt" => CmpOp::Gt,
        "ge" => CmpOp::Ge,
        "in" => CmpOp::In,
        "like" => CmpOp::Like,
        other => return Err(Error::bad_query(format!("unknown operator {}", other))),
    })
}

/// Encodes a normalized filter.
pub fn encode_filter(filter: &Filter) -> WireFilter {
    match filter {
        Filter::And(children) => WireFilter::And(children.iter().map(encode_filter).collect()),
        Filter::Or(children) => WireFilter::Or(children.iter().map(encode_filter).collect()),
        Filter::Not(inner) => WireFilter::Not(Box::new(encode_filter(inner))),
        Filter::Leaf(predicate) => WireFilter::Compare {
            field: predicate.field.clone(),
            op: predicate.op.name().into(),
            value: match &predicate.arg {
                Argument::One(value) => value_to_json(value),
                Argument::Many(values) => Json::Array(values.iter().map(value_to_json).collect()),
            },
        },
    }
}

/// Decodes a wire filter, typing its operands by the fields they compare.
pub fn decode_filter(collection: &Collection, wire: &WireFilter) -> Result<Filter> {
    let decode_all = |children: &[WireFilter]| {
        children
            .iter()
            .map(|child| decode_filter(collection, child))
            .collect::<Result<Vec<_>>>()
    };
    Ok(match wire {
        WireFilter::And(children) => Filter::all(decode_all(children)?),
        WireFilter::Or(children) => Filter::any(decode_all(children)?),
        WireFilter::Not(inner) => Filter::negate(decode_filter(collection, inner)?),
        WireFilter::Compare { field, op, value } => {
            let def = collection.field(field)?;
            let operand = |json: &Json| def.decode(json_to_value(def.kind(), field, json)?);
            let op = parse_op(op)?;
            let arg = match (op, value) {
                (CmpOp::In, Json::Array(items)) => {
                    Argument::Many(items.iter().map(operand).collect::<Result<Vec<_>>>()?)
                }
                (CmpOp::In, other) => {
                    return Err(Error::bad_query(format!("`in` on {} needs a list, got {}", field, other)))
                }
                (_, json) => Argument::One(operand(json)?),
            };
            Filter::Leaf(Predicate::new(field.clone(), op, arg))
        }
    })
}

/// One sort key as sent over the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSortKey {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

/// The parent a foreign window belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireParent {
    /// Field on the fetched records pointing at the parent.
    pub field: String,
    pub id: String,
}

/// The `variables` document of a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub collection: String,
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<WireFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<WireSortKey>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub show: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<WireParent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
}

impl WireRequest {
    /// Describes a planned request of `layer`.
    pub fn from_request(layer: &Layer, request: &FetchRequest) -> Self {
        let mut wire = WireRequest {
            collection: request.collection.clone(),
            fields: request.fields.clone(),
            filter: None,
            sort: Vec::new(),
            skip: 0,
            show: None,
            parent: None,
            ids: None,
        };
        match &request.kind {
            RequestKind::Window { key, window } => {
                wire.filter = layer.filter.as_ref().map(encode_filter);
                wire.sort = layer
                    .sort
                    .keys()
                    .iter()
                    .map(|k| WireSortKey {
                        field: k.field.clone(),
                        descending: k.order == SortOrder::Desc,
                    })
                    .collect();
                wire.skip = window.skip;
                wire.show = window.show;
                wire.parent = match (&key.parent, &layer.target.inverse) {
                    (Some(id), Some(inverse)) => Some(WireParent {
                        field: inverse.clone(),
                        id: id.clone(),
                    }),
                    _ => None,
                };
            }
            RequestKind::Ids(ids) => wire.ids = Some(ids.clone()),
        }
        wire
    }

    /// Renders the document.
    pub fn to_json(&self) -> Result<Json> {
        serde_json::to_value(self).map_err(|e| Error::decode("variables", e.to_string()))
    }

    /// Parses a document.
    pub fn from_json(json: &Json) -> Result<Self> {
        WireRequest::deserialize(json).map_err(|e| Error::decode("variables", e.to_string()))
    }

    /// Rebuilds the comparator of a window request.
    pub fn comparator(&self) -> Comparator {
        Comparator::new(
            self.sort
                .iter()
                .map(|k| {
                    if k.descending {
                        SortKey::desc(k.field.clone())
                    } else {
                        SortKey::asc(k.field.clone())
                    }
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::schema::CollectionBuilder;
    use strata_core::ScalarType;
    use strata_incremental::{Window, WindowKey};

    fn schema() -> Schema {
        let people = CollectionBuilder::new("people")
            .unwrap()
            .scalar("firstName", ScalarType::String)
            .unwrap()
            .scalar("age", ScalarType::Int)
            .unwrap()
            .single("employer", "companies")
            .unwrap()
            .list("friends", "people")
            .unwrap()
            .build();
        let companies = CollectionBuilder::new("companies")
            .unwrap()
            .scalar("name", ScalarType::String)
            .unwrap()
            .build();
        Schema::new(vec![people, companies]).unwrap()
    }

    #[test]
    fn test_decode_record_by_field_kind() {
        let raw: RawRecord = serde_json::from_value(json!({
            "id": "p1",
            "firstName": "Delphia",
            "age": 31,
            "employer": { "id": "c1", "name": "Acme" },
            "friends": ["p2", { "id": "p3" }],
            "createdAt": 1700000000000i64,
            "__typename": "Person"
        }))
        .unwrap();
        assert_eq!(raw.id, "p1");

        let record = decode_record(&schema(), "people", &raw).unwrap();
        assert_eq!(record["firstName"], Value::from("Delphia"));
        assert_eq!(record["age"], Value::Int(31));
        assert_eq!(record["employer"], Value::Ref("c1".into()));
        assert_eq!(record["friends"], Value::RefList(vec!["p2".into(), "p3".into()]));
        assert_eq!(record["createdAt"], Value::Int(1_700_000_000_000));
        assert!(!record.contains_key("__typename"));
    }

    #[test]
    fn test_decode_record_rejects_bad_shapes() {
        let raw = RawRecord::new("p1").with("friends", "p2");
        assert!(decode_record(&schema(), "people", &raw).is_err());
        let raw = RawRecord::new("p1").with("age", json!({ "years": 3 }));
        assert!(decode_record(&schema(), "people", &raw).is_err());
    }

    #[test]
    fn test_encode_record_projects_fields() {
        let mut record = Record::new();
        record.insert("firstName".into(), Value::from("Ena"));
        record.insert("age".into(), Value::Int(40));
        record.insert("createdAt".into(), Value::DateTime(5));
        let fields = vec!["id".to_string(), "firstName".to_string(), "createdAt".to_string()];

        let raw = encode_record(&schema(), "people", "p1", &record, &fields).unwrap();
        assert_eq!(
            serde_json::to_value(&raw).unwrap(),
            json!({ "id": "p1", "firstName": "Ena", "createdAt": 5 })
        );
    }

    #[test]
    fn test_filter_round_trip_types_operands() {
        let schema = schema();
        let people = schema.collection("people").unwrap();
        let filter = Filter::all(vec![
            Filter::Leaf(Predicate::new("age", CmpOp::Ge, Value::Int(18))),
            Filter::negate(Filter::Leaf(Predicate::new(
                "employer",
                CmpOp::In,
                Argument::Many(vec![Value::Ref("c1".into())]),
            ))),
        ]);

        let wire = encode_filter(&filter);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["and"][0]["compare"]["op"], "ge");

        let back: WireFilter = serde_json::from_value(json).unwrap();
        assert_eq!(decode_filter(people, &back).unwrap(), filter);
    }

    #[test]
    fn test_window_request_document() {
        let schema = schema();
        let query = strata_query::QueryNode::new("people")
            .sort(SortKey::desc("age"))
            .skip(2)
            .show(5)
            .select(&["firstName"]);
        let layer = strata_query::compile(&schema, &query, &strata_query::Variables::new()).unwrap();
        let request = FetchRequest {
            path: "people".into(),
            collection: "people".into(),
            fields: layer.fetch_fields(),
            kind: RequestKind::Window {
                key: WindowKey::root("people"),
                window: Window::new(1, Some(7)),
            },
        };

        let wire = WireRequest::from_request(&layer, &request);
        let json = wire.to_json().unwrap();
        assert_eq!(json["skip"], 1);
        assert_eq!(json["show"], 7);
        assert_eq!(json["sort"][0], json!({ "field": "age", "descending": true }));
        assert!(json.get("ids").is_none());
        assert_eq!(WireRequest::from_json(&json).unwrap(), wire);
        assert_eq!(wire.comparator(), layer.sort);
    }
}
