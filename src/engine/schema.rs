//! Schema registry for indexed entity types
//!
//! Entity types are explicit field tables registered once at startup
//! (usually from `docdex.config.json`). Each field declares the kind of
//! value it holds and the kind of index maintained for it; nested objects
//! carry their own field tables and are addressed by dotted path.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::document::{Document, FieldValue};
use super::error::{SchemaError, ValidationError};

/// Kind of value a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Integer,
    Float,
    GeoPoint,
    StringSet,
    Object,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::GeoPoint => "geo_point",
            ValueKind::StringSet => "string_set",
            ValueKind::Object => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Float)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural treatment of a field for querying
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    #[default]
    None,
    Exact,
    Range,
    FullText,
    Geo,
    SetMembership,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::None => "none",
            IndexKind::Exact => "exact",
            IndexKind::Range => "range",
            IndexKind::FullText => "full_text",
            IndexKind::Geo => "geo",
            IndexKind::SetMembership => "set_membership",
        }
    }

    /// Whether a field of `kind` can be indexed this way
    pub fn supports(&self, kind: ValueKind) -> bool {
        match self {
            IndexKind::None => true,
            IndexKind::Exact => matches!(
                kind,
                ValueKind::String | ValueKind::Integer | ValueKind::Float
            ),
            IndexKind::Range => kind.is_numeric(),
            IndexKind::FullText => kind == ValueKind::String,
            IndexKind::Geo => kind == ValueKind::GeoPoint,
            IndexKind::SetMembership => kind == ValueKind::StringSet,
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field definition in an entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    pub kind: ValueKind,

    #[serde(default)]
    pub index: IndexKind,

    #[serde(default)]
    pub required: bool,

    /// Marks the primary identifier; its value is the document id
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub identifier: bool,

    /// Sub-fields of a nested object
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSpec>,
}

impl FieldSpec {
    pub fn new(name: &str, kind: ValueKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            index: IndexKind::None,
            required: false,
            identifier: false,
            fields: Vec::new(),
        }
    }

    /// String identifier field
    pub fn id(name: &str) -> Self {
        let mut spec = Self::new(name, ValueKind::String);
        spec.identifier = true;
        spec
    }

    pub fn object(name: &str, fields: Vec<FieldSpec>) -> Self {
        let mut spec = Self::new(name, ValueKind::Object);
        spec.fields = fields;
        spec
    }

    pub fn indexed(mut self, index: IndexKind) -> Self {
        self.index = index;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A field that carries an index, addressed by its full dotted path
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedField {
    pub path: String,
    pub kind: ValueKind,
    pub index: IndexKind,
    pub identifier: bool,
}

/// A named document schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl EntityType {
    pub fn new(name: &str, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.to_string(),
            fields,
        }
    }

    /// The identifier field (present once the type passed `check`)
    pub fn identifier(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.identifier)
    }

    pub fn identifier_name(&self) -> &str {
        self.identifier().map(|f| f.name.as_str()).unwrap_or("id")
    }

    /// Resolve a dotted field path such as `address.city`
    pub fn resolve(&self, path: &str) -> Option<&FieldSpec> {
        let mut specs = &self.fields;
        let mut found = None;
        for segment in path.split('.') {
            let spec = specs.iter().find(|f| f.name == segment)?;
            specs = &spec.fields;
            found = Some(spec);
        }
        found
    }

    /// Every indexed field, depth first, in declaration order
    pub fn indexed_fields(&self) -> Vec<IndexedField> {
        let mut out = Vec::new();
        collect_indexed(&self.fields, "", &mut out);
        out
    }

    /// Check the registration invariants
    pub fn check(&self) -> Result<(), SchemaError> {
        let mut identifier: Option<&FieldSpec> = None;
        for field in &self.fields {
            if !field.identifier {
                continue;
            }
            if let Some(first) = identifier {
                return Err(SchemaError::MultipleIdentifiers {
                    entity: self.name.clone(),
                    first: first.name.clone(),
                    second: field.name.clone(),
                });
            }
            if field.kind != ValueKind::String {
                return Err(SchemaError::IdentifierKind {
                    field: field.name.clone(),
                    kind: field.kind,
                });
            }
            identifier = Some(field);
        }
        if identifier.is_none() {
            return Err(SchemaError::MissingIdentifier(self.name.clone()));
        }

        check_fields(&self.name, &self.fields, "")
    }

    /// Validate a document against this entity type
    pub fn validate(&self, doc: &Document) -> Result<(), ValidationError> {
        let id_name = self.identifier_name();
        if doc.fields.contains_key(id_name) {
            return Err(ValidationError::IdentifierInFields(id_name.to_string()));
        }
        validate_fields(&self.fields, &doc.fields, "")
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn collect_indexed(specs: &[FieldSpec], prefix: &str, out: &mut Vec<IndexedField>) {
    for spec in specs {
        let path = join_path(prefix, &spec.name);
        if spec.kind == ValueKind::Object {
            collect_indexed(&spec.fields, &path, out);
        } else if spec.index != IndexKind::None {
            out.push(IndexedField {
                path,
                kind: spec.kind,
                index: spec.index,
                identifier: spec.identifier,
            });
        }
    }
}

fn check_fields(entity: &str, specs: &[FieldSpec], prefix: &str) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for spec in specs {
        let path = join_path(prefix, &spec.name);
        if !seen.insert(spec.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                entity: entity.to_string(),
                field: path,
            });
        }
        if spec.identifier && !prefix.is_empty() {
            return Err(SchemaError::NestedIdentifier {
                entity: entity.to_string(),
                field: path,
            });
        }
        let index_ok = if spec.kind == ValueKind::Object {
            spec.index == IndexKind::None
        } else {
            spec.index.supports(spec.kind)
        };
        if !index_ok {
            return Err(SchemaError::IncompatibleIndex {
                field: path,
                value_kind: spec.kind,
                index_kind: spec.index,
            });
        }
        if spec.kind == ValueKind::Object {
            check_fields(entity, &spec.fields, &path)?;
        }
    }
    Ok(())
}

fn validate_fields(
    specs: &[FieldSpec],
    values: &BTreeMap<String, FieldValue>,
    prefix: &str,
) -> Result<(), ValidationError> {
    for name in values.keys() {
        if !specs.iter().any(|s| &s.name == name) {
            return Err(ValidationError::UnknownField(join_path(prefix, name)));
        }
    }

    for spec in specs.iter().filter(|s| !s.identifier) {
        let path = join_path(prefix, &spec.name);
        let value = match values.get(&spec.name) {
            Some(value) => value,
            None if spec.required => return Err(ValidationError::MissingField(path)),
            None => continue,
        };

        if value.kind() != spec.kind {
            return Err(ValidationError::KindMismatch {
                path,
                expected: spec.kind,
                found: value.kind().to_string(),
            });
        }

        match value {
            FieldValue::GeoPoint(point) => {
                point
                    .check()
                    .map_err(|reason| ValidationError::InvalidGeoPoint { path, reason })?;
            }
            FieldValue::Float(f) if !f.is_finite() => {
                return Err(ValidationError::KindMismatch {
                    path,
                    expected: spec.kind,
                    found: "non-finite float".to_string(),
                });
            }
            FieldValue::Object(inner) => validate_fields(&spec.fields, inner, &path)?,
            _ => {}
        }
    }

    Ok(())
}

/// Holds every registered entity type
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entities: RwLock<HashMap<String, Arc<EntityType>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type under `name`
    pub fn register(&self, name: &str, fields: Vec<FieldSpec>) -> Result<Arc<EntityType>, SchemaError> {
        self.register_entity(EntityType::new(name, fields))
    }

    pub fn register_entity(&self, entity: EntityType) -> Result<Arc<EntityType>, SchemaError> {
        entity.check()?;

        let mut entities = self.entities.write();
        if entities.contains_key(&entity.name) {
            return Err(SchemaError::AlreadyRegistered(entity.name));
        }
        let entity = Arc::new(entity);
        entities.insert(entity.name.clone(), Arc::clone(&entity));
        Ok(entity)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<EntityType>, SchemaError> {
        self.entities
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))
    }

    /// Registered entity type names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geo::GeoPoint;

    fn person_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::id("id").indexed(IndexKind::Exact),
            FieldSpec::new("name", ValueKind::String).indexed(IndexKind::Exact).required(),
            FieldSpec::new("age", ValueKind::Integer).indexed(IndexKind::Range),
            FieldSpec::new("home", ValueKind::GeoPoint).indexed(IndexKind::Geo),
            FieldSpec::object(
                "address",
                vec![FieldSpec::new("city", ValueKind::String).indexed(IndexKind::Exact)],
            ),
        ]
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = SchemaRegistry::new();
        registry.register("people", person_fields()).unwrap();

        let entity = registry.lookup("people").unwrap();
        assert_eq!(entity.identifier_name(), "id");
        assert_eq!(entity.resolve("address.city").unwrap().kind, ValueKind::String);
        assert!(entity.resolve("address.zip").is_none());

        assert_eq!(
            registry.lookup("robots"),
            Err(SchemaError::NotFound("robots".to_string()))
        );
        assert!(matches!(
            registry.register("people", person_fields()),
            Err(SchemaError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_register_rejects_bad_tables() {
        let registry = SchemaRegistry::new();

        let mut dup = person_fields();
        dup.push(FieldSpec::new("age", ValueKind::Integer));
        assert!(matches!(
            registry.register("dup", dup),
            Err(SchemaError::DuplicateField { .. })
        ));

        let no_id = vec![FieldSpec::new("name", ValueKind::String)];
        assert_eq!(
            registry.register("anon", no_id),
            Err(SchemaError::MissingIdentifier("anon".to_string()))
        );

        let nested_id = vec![
            FieldSpec::id("id"),
            FieldSpec::object("address", vec![FieldSpec::id("code").indexed(IndexKind::Exact)]),
        ];
        assert_eq!(
            registry.register("nested", nested_id),
            Err(SchemaError::NestedIdentifier {
                entity: "nested".to_string(),
                field: "address.code".to_string(),
            })
        );

        let bad_index = vec![
            FieldSpec::id("id"),
            FieldSpec::new("tags", ValueKind::StringSet).indexed(IndexKind::Range),
        ];
        assert!(matches!(
            registry.register("bad", bad_index),
            Err(SchemaError::IncompatibleIndex { .. })
        ));
    }

    #[test]
    fn test_indexed_fields_use_dotted_paths() {
        let entity = EntityType::new("people", person_fields());
        let paths: Vec<String> = entity.indexed_fields().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["id", "name", "age", "home", "address.city"]);
    }

    #[test]
    fn test_validate_document() {
        let entity = EntityType::new("people", person_fields());

        let doc = Document::with_id("p1")
            .with("name", "Alice")
            .with("age", 30i64)
            .with("home", GeoPoint::new(-0.12, 51.5));
        assert!(entity.validate(&doc).is_ok());

        let missing = Document::with_id("p2").with("age", 30i64);
        assert_eq!(
            entity.validate(&missing),
            Err(ValidationError::MissingField("name".to_string()))
        );

        let wrong = Document::with_id("p3").with("name", "Bob").with("age", "thirty");
        assert!(matches!(
            entity.validate(&wrong),
            Err(ValidationError::KindMismatch { .. })
        ));

        let off_map = Document::with_id("p4")
            .with("name", "Eve")
            .with("home", GeoPoint::new(10.0, 95.0));
        assert!(matches!(
            entity.validate(&off_map),
            Err(ValidationError::InvalidGeoPoint { .. })
        ));

        let with_id = Document::with_id("p5").with("name", "Mallory").with("id", "p5");
        assert_eq!(
            entity.validate(&with_id),
            Err(ValidationError::IdentifierInFields("id".to_string()))
        );
    }
}
