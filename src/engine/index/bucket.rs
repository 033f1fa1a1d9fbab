//! Index buckets: per-field maps from indexed key to the set of document ids
//!
//! Hashed buckets (exact, full-text, set-membership, geo cells) lock per
//! shard of keys, so writers touching unrelated keys do not contend. The
//! range bucket needs ordered traversal and takes a per-bucket read/write
//! lock instead.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::Hash;

use super::{IndexKey, NumericKey, PointKey};
use crate::engine::geo::{haversine, CellCover, GeoCell, GeoGrid, GeoPoint};
use crate::engine::schema::IndexKind;

/// Set-valued concurrent map
#[derive(Debug)]
pub struct KeyedBucket<K: Eq + Hash> {
    map: DashMap<K, HashSet<String>>,
}

impl<K: Eq + Hash + Clone> KeyedBucket<K> {
    pub fn new() -> Self {
        Self { map: DashMap::new() }
    }

    pub fn insert(&self, key: K, id: &str) {
        self.map.entry(key).or_default().insert(id.to_string());
    }

    pub fn remove(&self, key: &K, id: &str) {
        {
            let Some(mut ids) = self.map.get_mut(key) else {
                return;
            };
            ids.remove(id);
        }
        self.map.remove_if(key, |_, ids| ids.is_empty());
    }

    pub fn get(&self, key: &K) -> HashSet<String> {
        self.map
            .get(key)
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }

    /// Union of the id sets of several keys
    pub fn union<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> HashSet<String>
    where
        K: 'a,
    {
        let mut out = HashSet::new();
        for key in keys {
            if let Some(ids) = self.map.get(key) {
                out.extend(ids.iter().cloned());
            }
        }
        out
    }

    pub fn purge(&self, id: &str) {
        self.map.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn entries(&self) -> Vec<(K, BTreeSet<String>)> {
        self.map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().iter().cloned().collect()))
            .collect()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedBucket<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered numeric bucket
#[derive(Debug, Default)]
pub struct RangeBucket {
    map: RwLock<BTreeMap<NumericKey, HashSet<String>>>,
}

impl RangeBucket {
    pub fn insert(&self, key: NumericKey, id: &str) {
        self.map.write().entry(key).or_default().insert(id.to_string());
    }

    pub fn remove(&self, key: &NumericKey, id: &str) {
        let mut map = self.map.write();
        if let Some(ids) = map.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                map.remove(key);
            }
        }
    }

    /// Ids whose key lies in `[min, max]`
    pub fn range(&self, min: NumericKey, max: NumericKey) -> HashSet<String> {
        if min > max {
            return HashSet::new();
        }
        let map = self.map.read();
        map.range(min..=max)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    pub fn purge(&self, id: &str) {
        self.map.write().retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn entries(&self) -> Vec<(NumericKey, BTreeSet<String>)> {
        self.map
            .read()
            .iter()
            .map(|(key, ids)| (*key, ids.iter().cloned().collect()))
            .collect()
    }
}

/// Grid cells for the coarse phase plus stored points for the exact phase
#[derive(Debug)]
pub struct GeoBucket {
    grid: GeoGrid,
    cells: KeyedBucket<GeoCell>,
    points: DashMap<String, GeoPoint>,
}

impl GeoBucket {
    pub fn new(grid: GeoGrid) -> Self {
        Self {
            grid,
            cells: KeyedBucket::new(),
            points: DashMap::new(),
        }
    }

    pub fn insert(&self, point: GeoPoint, id: &str) {
        self.points.insert(id.to_string(), point);
        self.cells.insert(self.grid.cell(&point), id);
    }

    pub fn remove(&self, point: GeoPoint, id: &str) {
        self.cells.remove(&self.grid.cell(&point), id);
        self.points.remove_if(id, |_, stored| stored.bits() == point.bits());
    }

    /// Ids whose point lies within `radius_m` meters of `center`, boundary included
    pub fn within(&self, center: &GeoPoint, radius_m: f64) -> HashSet<String> {
        let candidates: Vec<String> = match self.grid.cover(center, radius_m) {
            CellCover::Cells(cells) => self.cells.union(cells.iter()).into_iter().collect(),
            CellCover::All => self.points.iter().map(|e| e.key().clone()).collect(),
        };

        candidates
            .into_iter()
            .filter(|id| {
                self.points
                    .get(id)
                    .map(|point| haversine(center, point.value()) <= radius_m)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn purge(&self, id: &str) {
        self.cells.purge(id);
        self.points.remove(id);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn entries(&self) -> Vec<(PointKey, BTreeSet<String>)> {
        let mut grouped: BTreeMap<(u64, u64), (GeoPoint, BTreeSet<String>)> = BTreeMap::new();
        for entry in self.points.iter() {
            let point = *entry.value();
            grouped
                .entry(point.bits())
                .or_insert_with(|| (point, BTreeSet::new()))
                .1
                .insert(entry.key().clone());
        }
        grouped
            .into_values()
            .map(|(point, ids)| (PointKey(point), ids))
            .collect()
    }
}

/// One index structure for one (entity type, field path)
#[derive(Debug)]
pub enum IndexBucket {
    Exact(KeyedBucket<String>),
    Range(RangeBucket),
    FullText(KeyedBucket<String>),
    Geo(GeoBucket),
    SetMembership(KeyedBucket<String>),
}

impl IndexBucket {
    pub fn for_kind(kind: IndexKind, grid: GeoGrid) -> Option<Self> {
        match kind {
            IndexKind::None => None,
            IndexKind::Exact => Some(IndexBucket::Exact(KeyedBucket::new())),
            IndexKind::Range => Some(IndexBucket::Range(RangeBucket::default())),
            IndexKind::FullText => Some(IndexBucket::FullText(KeyedBucket::new())),
            IndexKind::Geo => Some(IndexBucket::Geo(GeoBucket::new(grid))),
            IndexKind::SetMembership => Some(IndexBucket::SetMembership(KeyedBucket::new())),
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            IndexBucket::Exact(_) => IndexKind::Exact,
            IndexBucket::Range(_) => IndexKind::Range,
            IndexBucket::FullText(_) => IndexKind::FullText,
            IndexBucket::Geo(_) => IndexKind::Geo,
            IndexBucket::SetMembership(_) => IndexKind::SetMembership,
        }
    }

    /// Add `id` under `key`; false when the key does not belong in this bucket
    pub fn insert(&self, key: &IndexKey, id: &str) -> bool {
        match (self, key) {
            (IndexBucket::Exact(b), IndexKey::Exact(k))
            | (IndexBucket::FullText(b), IndexKey::Token(k))
            | (IndexBucket::SetMembership(b), IndexKey::Element(k)) => b.insert(k.clone(), id),
            (IndexBucket::Range(b), IndexKey::Number(k)) => b.insert(*k, id),
            (IndexBucket::Geo(b), IndexKey::Point(p)) => b.insert(p.0, id),
            _ => return false,
        }
        true
    }

    /// Remove `id` from `key`; false when the key does not belong in this bucket
    pub fn remove(&self, key: &IndexKey, id: &str) -> bool {
        match (self, key) {
            (IndexBucket::Exact(b), IndexKey::Exact(k))
            | (IndexBucket::FullText(b), IndexKey::Token(k))
            | (IndexBucket::SetMembership(b), IndexKey::Element(k)) => b.remove(k, id),
            (IndexBucket::Range(b), IndexKey::Number(k)) => b.remove(k, id),
            (IndexBucket::Geo(b), IndexKey::Point(p)) => b.remove(p.0, id),
            _ => return false,
        }
        true
    }

    /// Remove `id` from every key
    pub fn purge(&self, id: &str) {
        match self {
            IndexBucket::Exact(b) | IndexBucket::FullText(b) | IndexBucket::SetMembership(b) => {
                b.purge(id)
            }
            IndexBucket::Range(b) => b.purge(id),
            IndexBucket::Geo(b) => b.purge(id),
        }
    }

    /// Number of distinct keys currently held
    pub fn key_count(&self) -> usize {
        match self {
            IndexBucket::Exact(b) | IndexBucket::FullText(b) | IndexBucket::SetMembership(b) => {
                b.len()
            }
            IndexBucket::Range(b) => b.len(),
            IndexBucket::Geo(b) => b.len(),
        }
    }

    /// Snapshot of every (key, ids) pair
    pub fn entries(&self) -> Vec<(IndexKey, BTreeSet<String>)> {
        match self {
            IndexBucket::Exact(b) => map_entries(b.entries(), IndexKey::Exact),
            IndexBucket::FullText(b) => map_entries(b.entries(), IndexKey::Token),
            IndexBucket::SetMembership(b) => map_entries(b.entries(), IndexKey::Element),
            IndexBucket::Range(b) => map_entries(b.entries(), IndexKey::Number),
            IndexBucket::Geo(b) => map_entries(b.entries(), IndexKey::Point),
        }
    }
}

fn map_entries<K>(
    entries: Vec<(K, BTreeSet<String>)>,
    wrap: impl Fn(K) -> IndexKey,
) -> Vec<(IndexKey, BTreeSet<String>)> {
    entries.into_iter().map(|(k, ids)| (wrap(k), ids)).collect()
}
