//! Index Store
//!
//! An arena of index buckets, one per indexed (entity type, field path).
//! Buckets are created when an entity type is registered and are shared
//! through `Arc` so lookups never hold a store-wide lock.

pub mod bucket;

pub use bucket::{GeoBucket, IndexBucket, KeyedBucket, RangeBucket};

use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

use super::document::{Document, FieldValue};
use super::error::{EngineError, Result};
use super::geo::{GeoGrid, GeoPoint};
use super::schema::{EntityType, IndexKind, IndexedField};
use super::text;

/// Numeric key of a range bucket
///
/// A bucket only ever holds one variant (its field's kind); the query
/// compiler coerces bounds to that variant.
#[derive(Debug, Clone, Copy)]
pub enum NumericKey {
    Int(i64),
    Float(f64),
}

impl NumericKey {
    /// Float key with `-0.0` folded into `0.0`
    pub fn float(f: f64) -> Self {
        NumericKey::Float(if f == 0.0 { 0.0 } else { f })
    }

    fn rank(&self) -> u8 {
        match self {
            NumericKey::Int(_) => 0,
            NumericKey::Float(_) => 1,
        }
    }
}

impl PartialEq for NumericKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumericKey {}

impl PartialOrd for NumericKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumericKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NumericKey::Int(a), NumericKey::Int(b)) => a.cmp(b),
            (NumericKey::Float(a), NumericKey::Float(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for NumericKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            NumericKey::Int(n) => (0u8, *n).hash(state),
            NumericKey::Float(f) => (1u8, f.to_bits()).hash(state),
        }
    }
}

impl fmt::Display for NumericKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericKey::Int(n) => write!(f, "{}", n),
            NumericKey::Float(x) => write!(f, "{}", x),
        }
    }
}

/// A geo point compared bit for bit
#[derive(Debug, Clone, Copy)]
pub struct PointKey(pub GeoPoint);

impl PartialEq for PointKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.bits() == other.0.bits()
    }
}

impl Eq for PointKey {}

impl Hash for PointKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.bits().hash(state);
    }
}

/// Key a field value produces in its bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Exact(String),
    Number(NumericKey),
    Token(String),
    Point(PointKey),
    Element(String),
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Exact(s) | IndexKey::Token(s) | IndexKey::Element(s) => f.write_str(s),
            IndexKey::Number(n) => write!(f, "{}", n),
            IndexKey::Point(p) => write!(f, "{}", p.0),
        }
    }
}

/// Canonical exact-match key of a scalar value
pub fn exact_key(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::String(s) => Some(s.clone()),
        FieldValue::Integer(n) => Some(n.to_string()),
        FieldValue::Float(f) if *f == 0.0 => Some("0".to_string()),
        FieldValue::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

/// Keys the document's value for `field` produces
///
/// An absent value produces no keys.
pub fn index_keys(field: &IndexedField, doc: &Document) -> HashSet<IndexKey> {
    let id_value;
    let value = if field.identifier {
        id_value = FieldValue::String(doc.id.clone());
        Some(&id_value)
    } else {
        doc.get_path(&field.path)
    };

    let Some(value) = value else {
        return HashSet::new();
    };

    match (field.index, value) {
        (IndexKind::Exact, v) => exact_key(v).map(IndexKey::Exact).into_iter().collect(),
        (IndexKind::Range, FieldValue::Integer(n)) => [IndexKey::Number(NumericKey::Int(*n))].into(),
        (IndexKind::Range, FieldValue::Float(f)) => [IndexKey::Number(NumericKey::float(*f))].into(),
        (IndexKind::FullText, FieldValue::String(s)) => text::unique_terms(s)
            .into_iter()
            .map(IndexKey::Token)
            .collect(),
        (IndexKind::Geo, FieldValue::GeoPoint(p)) => [IndexKey::Point(PointKey(*p))].into(),
        (IndexKind::SetMembership, FieldValue::StringSet(items)) => {
            items.iter().cloned().map(IndexKey::Element).collect()
        }
        _ => HashSet::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketId {
    entity: String,
    path: String,
}

/// Counts of bucket entries touched by one delta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexDelta {
    pub added: usize,
    pub removed: usize,
}

/// Expected or actual contents of one bucket, keyed for comparison
pub type BucketSnapshot = BTreeMap<String, BTreeSet<String>>;

/// The arena of index buckets
#[derive(Debug)]
pub struct IndexStore {
    buckets: DashMap<BucketId, Arc<IndexBucket>>,
    grid: GeoGrid,
}

impl IndexStore {
    pub fn new(geo_cell_degrees: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            grid: GeoGrid::new(geo_cell_degrees),
        }
    }

    /// Create an empty bucket for every indexed field of `entity`
    pub fn create_buckets(&self, entity: &EntityType) {
        for field in entity.indexed_fields() {
            if let Some(bucket) = IndexBucket::for_kind(field.index, self.grid) {
                debug!(entity = %entity.name, path = %field.path, kind = %field.index, "creating index bucket");
                self.buckets.insert(
                    BucketId {
                        entity: entity.name.clone(),
                        path: field.path,
                    },
                    Arc::new(bucket),
                );
            }
        }
    }

    pub fn bucket(&self, entity: &str, path: &str) -> Option<Arc<IndexBucket>> {
        self.buckets
            .get(&BucketId {
                entity: entity.to_string(),
                path: path.to_string(),
            })
            .map(|b| Arc::clone(b.value()))
    }

    fn require_bucket(&self, entity: &str, id: &str, path: &str) -> Result<Arc<IndexBucket>> {
        self.bucket(entity, path)
            .ok_or_else(|| EngineError::IndexInconsistency {
                entity: entity.to_string(),
                id: id.to_string(),
                detail: format!("no index bucket for field '{}'", path),
            })
    }

    /// Move `id` from the keys `old` produced to the keys `new` produces
    ///
    /// Keys produced by both versions are left alone. Removals run before
    /// additions so a geo point that moved is re-homed cleanly.
    pub fn apply(
        &self,
        entity: &EntityType,
        id: &str,
        old: Option<&Document>,
        new: Option<&Document>,
    ) -> Result<IndexDelta> {
        let mut delta = IndexDelta::default();

        for field in entity.indexed_fields() {
            let old_keys = old.map(|d| index_keys(&field, d)).unwrap_or_default();
            let new_keys = new.map(|d| index_keys(&field, d)).unwrap_or_default();
            if old_keys == new_keys {
                continue;
            }

            let bucket = self.require_bucket(&entity.name, id, &field.path)?;
            for key in old_keys.difference(&new_keys) {
                if !bucket.remove(key, id) {
                    return Err(self.key_mismatch(entity, id, &field, key));
                }
                delta.removed += 1;
            }
            for key in new_keys.difference(&old_keys) {
                if !bucket.insert(key, id) {
                    return Err(self.key_mismatch(entity, id, &field, key));
                }
                delta.added += 1;
            }
        }

        Ok(delta)
    }

    fn key_mismatch(&self, entity: &EntityType, id: &str, field: &IndexedField, key: &IndexKey) -> EngineError {
        EngineError::IndexInconsistency {
            entity: entity.name.clone(),
            id: id.to_string(),
            detail: format!("key {:?} does not fit the {} bucket of '{}'", key, field.index, field.path),
        }
    }

    /// Remove `id` from every bucket of `entity`, whatever key it sits under
    pub fn purge(&self, entity: &EntityType, id: &str) {
        for field in entity.indexed_fields() {
            if let Some(bucket) = self.bucket(&entity.name, &field.path) {
                bucket.purge(id);
            }
        }
    }

    /// Current contents of every bucket of `entity`, keyed by field path
    pub fn snapshot(&self, entity: &EntityType) -> BTreeMap<String, BucketSnapshot> {
        entity
            .indexed_fields()
            .into_iter()
            .map(|field| {
                let contents = self
                    .bucket(&entity.name, &field.path)
                    .map(|b| {
                        b.entries()
                            .into_iter()
                            .map(|(key, ids)| (key.to_string(), ids))
                            .collect()
                    })
                    .unwrap_or_default();
                (field.path, contents)
            })
            .collect()
    }

    /// Contents every bucket of `entity` should have for `docs`
    pub fn expected(entity: &EntityType, docs: &[Document]) -> BTreeMap<String, BucketSnapshot> {
        entity
            .indexed_fields()
            .into_iter()
            .map(|field| {
                let mut contents = BucketSnapshot::new();
                for doc in docs {
                    for key in index_keys(&field, doc) {
                        contents.entry(key.to_string()).or_default().insert(doc.id.clone());
                    }
                }
                (field.path, contents)
            })
            .collect()
    }

    /// True when no bucket of `entity` holds any key
    pub fn is_empty(&self, entity: &EntityType) -> bool {
        entity.indexed_fields().iter().all(|field| {
            self.bucket(&entity.name, &field.path)
                .map(|b| b.key_count() == 0)
                .unwrap_or(true)
        })
    }
}
