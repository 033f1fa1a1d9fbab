//! Document representation for indexed storage
//!
//! A document is an id plus a map of field values. A field that is absent
//! from the map has no value and contributes no index entry. On the wire and
//! in storage a document is a plain JSON object that carries the identifier
//! field alongside the other fields; decoding is driven by the entity type.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::error::ValidationError;
use super::geo::GeoPoint;
use super::schema::{EntityType, FieldSpec, ValueKind};

/// A typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    GeoPoint(GeoPoint),
    StringSet(BTreeSet<String>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldValue::String(_) => ValueKind::String,
            FieldValue::Integer(_) => ValueKind::Integer,
            FieldValue::Float(_) => ValueKind::Float,
            FieldValue::GeoPoint(_) => ValueKind::GeoPoint,
            FieldValue::StringSet(_) => ValueKind::StringSet,
            FieldValue::Object(_) => ValueKind::Object,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldValue::StringSet(items.into_iter().map(Into::into).collect())
    }

    pub fn object<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldValue)>,
        S: Into<String>,
    {
        FieldValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(n) => Value::from(*n),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::GeoPoint(p) => serde_json::json!({ "lon": p.lon, "lat": p.lat }),
            FieldValue::StringSet(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            FieldValue::Object(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<GeoPoint> for FieldValue {
    fn from(p: GeoPoint) -> Self {
        FieldValue::GeoPoint(p)
    }
}

/// A stored entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Unique within its entity type; empty until assigned on first upsert
    pub id: String,

    pub fields: BTreeMap<String, FieldValue>,
}

impl Document {
    /// Create a document without an id (one is generated on upsert)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style setter
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Look up a value by dotted path (`address.city`)
    pub fn get_path(&self, path: &str) -> Option<&FieldValue> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            match current {
                FieldValue::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Assign a fresh id if the document has none
    pub fn ensure_id(&mut self) -> bool {
        if self.id.is_empty() {
            self.id = generate_id();
            true
        } else {
            false
        }
    }

    /// Encode as a plain JSON object, identifier included
    pub fn to_json(&self, entity: &EntityType) -> Value {
        let mut obj: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        obj.insert(entity.identifier_name().to_string(), Value::String(self.id.clone()));
        Value::Object(obj)
    }

    /// Decode a plain JSON object using the entity type's field table
    ///
    /// `null` values are treated as absent. Missing required fields are not
    /// checked here; `EntityType::validate` does that before a write.
    pub fn from_json(entity: &EntityType, value: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut obj) = value else {
            return Err(ValidationError::NotAnObject);
        };

        let id_name = entity.identifier_name();
        let id = match obj.remove(id_name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(ValidationError::KindMismatch {
                    path: id_name.to_string(),
                    expected: ValueKind::String,
                    found: json_kind(&other).to_string(),
                })
            }
        };

        let fields = decode_object(&entity.fields, obj, "")?;
        Ok(Self { id, fields })
    }
}

/// Generate a new document id
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn decode_object(
    specs: &[FieldSpec],
    obj: Map<String, Value>,
    prefix: &str,
) -> Result<BTreeMap<String, FieldValue>, ValidationError> {
    let mut fields = BTreeMap::new();
    for (name, value) in obj {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        let spec = specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ValidationError::UnknownField(path.clone()))?;
        if value.is_null() {
            continue;
        }
        fields.insert(name, decode_value(spec, value, &path)?);
    }
    Ok(fields)
}

fn decode_value(spec: &FieldSpec, value: Value, path: &str) -> Result<FieldValue, ValidationError> {
    let mismatch = |value: &Value| ValidationError::KindMismatch {
        path: path.to_string(),
        expected: spec.kind,
        found: json_kind(value).to_string(),
    };

    match spec.kind {
        ValueKind::String => match value {
            Value::String(s) => Ok(FieldValue::String(s)),
            other => Err(mismatch(&other)),
        },
        ValueKind::Integer => value
            .as_i64()
            .map(FieldValue::Integer)
            .ok_or_else(|| mismatch(&value)),
        ValueKind::Float => value
            .as_f64()
            .map(FieldValue::Float)
            .ok_or_else(|| mismatch(&value)),
        ValueKind::GeoPoint => match value {
            Value::Array(ref pair) if pair.len() == 2 => {
                match (pair[0].as_f64(), pair[1].as_f64()) {
                    (Some(lon), Some(lat)) => Ok(FieldValue::GeoPoint(GeoPoint::new(lon, lat))),
                    _ => Err(mismatch(&value)),
                }
            }
            Value::Object(_) => serde_json::from_value::<GeoPoint>(value)
                .map(FieldValue::GeoPoint)
                .map_err(|e| ValidationError::InvalidGeoPoint {
                    path: path.to_string(),
                    reason: e.to_string(),
                }),
            other => Err(mismatch(&other)),
        },
        ValueKind::StringSet => match value {
            Value::Array(items) => {
                let mut set = BTreeSet::new();
                for item in items {
                    match item {
                        Value::String(s) => {
                            set.insert(s);
                        }
                        other => return Err(mismatch(&other)),
                    }
                }
                Ok(FieldValue::StringSet(set))
            }
            other => Err(mismatch(&other)),
        },
        ValueKind::Object => match value {
            Value::Object(inner) => Ok(FieldValue::Object(decode_object(&spec.fields, inner, path)?)),
            other => Err(mismatch(&other)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::schema::IndexKind;
    use serde_json::json;

    fn entity() -> EntityType {
        EntityType::new(
            "people",
            vec![
                FieldSpec::id("id"),
                FieldSpec::new("name", ValueKind::String),
                FieldSpec::new("age", ValueKind::Integer).indexed(IndexKind::Range),
                FieldSpec::new("score", ValueKind::Float),
                FieldSpec::new("home", ValueKind::GeoPoint),
                FieldSpec::new("skills", ValueKind::StringSet),
                FieldSpec::object("address", vec![FieldSpec::new("city", ValueKind::String)]),
            ],
        )
    }

    #[test]
    fn test_document_creation() {
        let mut doc = Document::new().with("name", "test").with("age", 42i64);
        assert!(doc.id.is_empty());
        assert!(doc.ensure_id());
        assert!(!doc.id.is_empty());
        assert!(!doc.ensure_id());
        assert_eq!(doc.get("name"), Some(&FieldValue::from("test")));
    }

    #[test]
    fn test_id_uniqueness() {
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_get_path() {
        let doc = Document::with_id("a").with(
            "address",
            FieldValue::object([("city", FieldValue::from("New York"))]),
        );
        assert_eq!(doc.get_path("address.city"), Some(&FieldValue::from("New York")));
        assert_eq!(doc.get_path("address.zip"), None);
        assert_eq!(doc.get_path("name.first"), None);
    }

    #[test]
    fn test_json_round_trip() {
        let entity = entity();
        let body = json!({
            "id": "p1",
            "name": "Zoe",
            "age": 43,
            "score": 4,
            "home": {"x": -118.399968, "y": 34.073087},
            "skills": ["skills", "martial_arts"],
            "address": {"city": "Los Angeles"}
        });

        let doc = Document::from_json(&entity, body).unwrap();
        assert_eq!(doc.id, "p1");
        assert_eq!(doc.get("score"), Some(&FieldValue::Float(4.0)));
        assert_eq!(doc.get("skills"), Some(&FieldValue::set(["martial_arts", "skills"])));

        let again = Document::from_json(&entity, doc.to_json(&entity)).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        let entity = entity();
        assert_eq!(
            Document::from_json(&entity, json!([1, 2])),
            Err(ValidationError::NotAnObject)
        );
        assert_eq!(
            Document::from_json(&entity, json!({"nickname": "x"})),
            Err(ValidationError::UnknownField("nickname".to_string()))
        );
        assert!(matches!(
            Document::from_json(&entity, json!({"age": 4.5})),
            Err(ValidationError::KindMismatch { .. })
        ));
        assert!(matches!(
            Document::from_json(&entity, json!({"skills": ["a", 1]})),
            Err(ValidationError::KindMismatch { .. })
        ));

        let nulls = Document::from_json(&entity, json!({"name": null})).unwrap();
        assert!(nulls.fields.is_empty());
    }
}
