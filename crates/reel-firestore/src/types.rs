//! Firestore REST wire types and value conversions.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Firestore typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    /// Integers travel as decimal strings.
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, Value>>,
}

impl Value {
    /// Convert plain JSON into a Firestore value.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::NullValue(()),
            Json::Bool(b) => Value::BooleanValue(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::IntegerValue(i.to_string()),
                None => Value::DoubleValue(n.as_f64().unwrap_or_default()),
            },
            Json::String(s) => Value::StringValue(s.clone()),
            Json::Array(items) => Value::ArrayValue(ArrayValue {
                values: Some(items.iter().map(Value::from_json).collect()),
            }),
            Json::Object(map) => Value::MapValue(MapValue {
                fields: Some(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect()),
            }),
        }
    }

    /// Convert back to plain JSON. Timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::NullValue(()) => Json::Null,
            Value::BooleanValue(b) => Json::Bool(*b),
            Value::IntegerValue(s) => s
                .parse::<i64>()
                .map(Json::from)
                .unwrap_or_else(|_| Json::String(s.clone())),
            Value::DoubleValue(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::TimestampValue(s)
            | Value::StringValue(s)
            | Value::BytesValue(s)
            | Value::ReferenceValue(s) => Json::String(s.clone()),
            Value::ArrayValue(array) => Json::Array(
                array
                    .values
                    .iter()
                    .flatten()
                    .map(Value::to_json)
                    .collect(),
            ),
            Value::MapValue(map) => Json::Object(
                map.fields
                    .iter()
                    .flatten()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Firestore document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Used as the optimistic-concurrency version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            fields: Some(fields),
            ..Default::default()
        }
    }

    /// Last path segment of the resource name.
    pub fn id(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.rsplit('/').next())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.as_ref()?.get(name)
    }

    /// Build a document from any serializable struct.
    pub fn from_serde<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(fields_from_serde(value)?))
    }

    /// Decode the fields into `T`. `id_field`, when given, is filled from the
    /// resource name if the document does not store it.
    pub fn to_serde<T: serde::de::DeserializeOwned>(&self, id_field: Option<&str>) -> Result<T, serde_json::Error> {
        let mut object: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        if let (Some(field), Some(id)) = (id_field, self.id()) {
            object
                .entry(field.to_string())
                .or_insert_with(|| serde_json::Value::String(id.to_string()));
        }
        serde_json::from_value(serde_json::Value::Object(object))
    }
}

/// Top-level fields of a serializable struct as Firestore values.
pub fn fields_from_serde<T: Serialize>(value: &T) -> Result<HashMap<String, Value>, serde_json::Error> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect()),
        other => Err(serde::ser::Error::custom(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Convert a Rust value to a Firestore value.
pub trait ToFirestoreValue {
    fn to_firestore_value(&self) -> Value;
}

impl ToFirestoreValue for str {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.to_string())
    }
}

impl ToFirestoreValue for String {
    fn to_firestore_value(&self) -> Value {
        Value::StringValue(self.clone())
    }
}

impl ToFirestoreValue for bool {
    fn to_firestore_value(&self) -> Value {
        Value::BooleanValue(*self)
    }
}

impl ToFirestoreValue for u64 {
    fn to_firestore_value(&self) -> Value {
        Value::IntegerValue(self.to_string())
    }
}

impl ToFirestoreValue for DateTime<Utc> {
    fn to_firestore_value(&self) -> Value {
        Value::TimestampValue(self.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

impl<T: ToFirestoreValue> ToFirestoreValue for Option<T> {
    fn to_firestore_value(&self) -> Value {
        match self {
            Some(v) => v.to_firestore_value(),
            None => Value::NullValue(()),
        }
    }
}

/// Convert a Firestore value to a Rust value.
pub trait FromFirestoreValue: Sized {
    fn from_firestore_value(value: &Value) -> Option<Self>;
}

impl FromFirestoreValue for String {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::StringValue(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromFirestoreValue for DateTime<Utc> {
    fn from_firestore_value(value: &Value) -> Option<Self> {
        match value {
            Value::TimestampValue(s) | Value::StringValue(s) => {
                DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
            }
            _ => None,
        }
    }
}

// ============================================================================
// Structured queries
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl StructuredQuery {
    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self {
            from: vec![CollectionSelector {
                collection_id: collection_id.into(),
            }],
            ..Default::default()
        }
    }

    /// Add an equality-style filter; several filters are ANDed.
    pub fn filter(mut self, field: &str, op: FieldOp, value: Value) -> Self {
        let next = Filter::FieldFilter(FieldFilter {
            field: FieldReference::new(field),
            op,
            value,
        });
        self.filter = Some(match self.filter.take() {
            None => next,
            Some(Filter::CompositeFilter(mut composite)) => {
                composite.filters.push(next);
                Filter::CompositeFilter(composite)
            }
            Some(single) => Filter::CompositeFilter(CompositeFilter {
                op: "AND".to_string(),
                filters: vec![single, next],
            }),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push(Order {
            field: FieldReference::new(field),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

impl FieldReference {
    pub fn new(path: &str) -> Self {
        Self {
            field_path: path.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    FieldFilter(FieldFilter),
    CompositeFilter(CompositeFilter),
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: FieldOp,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeFilter {
    pub op: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldOp {
    Equal,
    In,
    GreaterThanOrEqual,
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub field: FieldReference,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Ascending,
    Descending,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_keeps_structure() {
        let original = json!({
            "title": "Night shift",
            "duration_ms": 31500,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "nested": {"ok": true, "none": null}
        });
        let value = Value::from_json(&original);
        assert!(matches!(
            &value,
            Value::MapValue(MapValue { fields: Some(f) }) if f.get("duration_ms") == Some(&Value::IntegerValue("31500".into()))
        ));
        assert_eq!(value.to_json(), original);
    }

    #[test]
    fn test_document_to_serde_fills_id() {
        #[derive(Deserialize)]
        struct Row {
            id: String,
            name: String,
        }

        let mut doc = Document::new(HashMap::from([(
            "name".to_string(),
            Value::StringValue("n".into()),
        )]));
        doc.name = Some("projects/p/databases/(default)/documents/automations/auto-1".into());

        let row: Row = doc.to_serde(Some("id")).unwrap();
        assert_eq!(row.id, "auto-1");
        assert_eq!(row.name, "n");
    }

    #[test]
    fn test_query_serialization() {
        let query = StructuredQuery::collection("videos")
            .filter("user_id", FieldOp::Equal, "u1".to_firestore_value())
            .filter("status", FieldOp::Equal, "POSTED".to_firestore_value())
            .order_by("updated_at", Direction::Descending)
            .limit(10);
        let json = serde_json::to_value(&query).unwrap();

        assert_eq!(json["from"][0]["collectionId"], "videos");
        assert_eq!(json["where"]["compositeFilter"]["op"], "AND");
        assert_eq!(
            json["where"]["compositeFilter"]["filters"][1]["fieldFilter"]["value"]["stringValue"],
            "POSTED"
        );
        assert_eq!(json["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(json["limit"], 10);
    }

    #[test]
    fn test_timestamp_value_parses() {
        let value = Value::TimestampValue("2026-03-01T09:00:00Z".into());
        let parsed = DateTime::<Utc>::from_firestore_value(&value).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-03-01T09:00:00+00:00");
    }
}
