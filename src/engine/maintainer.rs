//! Index Maintainer
//!
//! Keeps the index store coherent with the documents held by the storage
//! adapter. Every mutation of one id runs inside that id's exclusive
//! section: read the prior version, write the new one, then move the id
//! between bucket keys by diffing the two versions.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::document::Document;
use super::error::{EngineError, Result};
use super::index::IndexStore;
use super::locks::IdLocks;
use super::schema::EntityType;
use super::storage::StorageAdapter;

/// Index update that did not complete after the document was stored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexWarning {
    pub entity: String,
    pub id: String,
    pub detail: String,
}

/// Outcome of an upsert
#[derive(Debug, Clone)]
pub struct Upserted {
    pub document: Document,
    pub created: bool,
    /// Set when the document was written but its index entries may be stale
    pub warning: Option<IndexWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    entity: String,
    id: String,
}

pub struct IndexMaintainer {
    storage: Arc<dyn StorageAdapter>,
    indexes: Arc<IndexStore>,
    locks: IdLocks,
    pending: DashMap<PendingKey, Arc<EntityType>>,
}

impl IndexMaintainer {
    pub fn new(storage: Arc<dyn StorageAdapter>, indexes: Arc<IndexStore>) -> Self {
        Self {
            storage,
            indexes,
            locks: IdLocks::new(),
            pending: DashMap::new(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn indexes(&self) -> &Arc<IndexStore> {
        &self.indexes
    }

    /// Read and decode one document
    pub fn load(&self, entity: &EntityType, id: &str) -> Result<Option<Document>> {
        match self.storage.get(&entity.name, id)? {
            Some(bytes) => decode(entity, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Validate, store and index a document, assigning an id if it has none
    pub fn upsert(&self, entity: &Arc<EntityType>, mut doc: Document) -> Result<Upserted> {
        entity.validate(&doc)?;
        doc.ensure_id();
        let body = encode(entity, &doc)?;

        let _guard = self.locks.acquire(&entity.name, &doc.id);

        let prior_bytes = self.storage.get(&entity.name, &doc.id)?;
        let created = prior_bytes.is_none();
        let prior = match prior_bytes.as_deref().map(|b| decode(entity, b)) {
            Some(Ok(prior)) => Some(prior),
            Some(Err(e)) => {
                warn!(entity = %entity.name, id = %doc.id, error = %e, "prior version unreadable, rebuilding its index entries");
                self.indexes.purge(entity, &doc.id);
                None
            }
            None => None,
        };

        self.storage.put(&entity.name, &doc.id, &body)?;

        let warning = match self.indexes.apply(entity, &doc.id, prior.as_ref(), Some(&doc)) {
            Ok(delta) => {
                debug!(entity = %entity.name, id = %doc.id, added = delta.added, removed = delta.removed, "indexed document");
                None
            }
            Err(e) => {
                warn!(entity = %entity.name, id = %doc.id, error = %e, "partial index update, queued for repair");
                self.mark_for_repair(entity, &doc.id);
                Some(IndexWarning {
                    entity: entity.name.clone(),
                    id: doc.id.clone(),
                    detail: e.to_string(),
                })
            }
        };

        Ok(Upserted {
            document: doc,
            created,
            warning,
        })
    }

    /// Delete a document and every index entry it produced
    pub fn remove(&self, entity: &Arc<EntityType>, id: &str) -> Result<()> {
        let _guard = self.locks.acquire(&entity.name, id);

        let bytes = self
            .storage
            .get(&entity.name, id)?
            .ok_or_else(|| EngineError::not_found(&entity.name, id))?;
        let prior = decode(entity, &bytes);

        self.storage.delete(&entity.name, id)?;

        let applied = prior.and_then(|doc| self.indexes.apply(entity, id, Some(&doc), None));
        if let Err(e) = applied {
            warn!(entity = %entity.name, id, error = %e, "index removal incomplete, purging id");
            self.indexes.purge(entity, id);
        }
        Ok(())
    }

    /// Delete every document present when the scan is taken
    ///
    /// Ids written after the scan survive; ids deleted concurrently are
    /// skipped.
    pub fn remove_all(&self, entity: &Arc<EntityType>) -> Result<usize> {
        let ids = self.storage.scan(&entity.name)?;
        let mut removed = 0;
        for id in &ids {
            match self.remove(entity, id) {
                Ok(()) => removed += 1,
                Err(EngineError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        info!(entity = %entity.name, removed, scanned = ids.len(), "deleted all documents");
        Ok(removed)
    }

    /// Queue an id whose index entries need recomputing
    pub fn mark_for_repair(&self, entity: &Arc<EntityType>, id: &str) {
        self.pending.insert(
            PendingKey {
                entity: entity.name.clone(),
                id: id.to_string(),
            },
            Arc::clone(entity),
        );
    }

    pub fn pending_repairs(&self) -> usize {
        self.pending.len()
    }

    /// Recompute index entries for every queued id; returns how many were repaired
    pub fn repair_pending(&self) -> Result<usize> {
        let queued: Vec<(PendingKey, Arc<EntityType>)> = self
            .pending
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut repaired = 0;
        for (key, entity) in queued {
            self.pending.remove(&key);
            if let Err(e) = self.repair(&entity, &key.id) {
                self.pending.insert(key, entity);
                return Err(e);
            }
            repaired += 1;
        }
        if repaired > 0 {
            info!(repaired, "repaired queued index entries");
        }
        Ok(repaired)
    }

    /// Drop every index entry of `id` and re-add those of its stored version
    pub fn repair(&self, entity: &EntityType, id: &str) -> Result<()> {
        let _guard = self.locks.acquire(&entity.name, id);

        self.indexes.purge(entity, id);
        match self.load(entity, id) {
            Ok(Some(doc)) => {
                self.indexes.apply(entity, id, None, Some(&doc))?;
            }
            Ok(None) => debug!(entity = %entity.name, id, "repaired id no longer stored"),
            Err(EngineError::Storage(e)) => return Err(e.into()),
            Err(e) => {
                error!(entity = %entity.name, id, error = %e, "stored document unreadable, left unindexed");
            }
        }
        Ok(())
    }

    /// Rebuild every bucket of `entity` from a storage scan
    pub fn reindex(&self, entity: &EntityType) -> Result<usize> {
        self.indexes.create_buckets(entity);
        let ids = self.storage.scan(&entity.name)?;
        for id in &ids {
            self.repair(entity, id)?;
        }
        info!(entity = %entity.name, documents = ids.len(), "reindexed");
        Ok(ids.len())
    }

    /// Compare every bucket of `entity` with what storage says it should hold
    pub fn verify(&self, entity: &EntityType) -> Result<usize> {
        let ids = self.storage.scan(&entity.name)?;
        let mut docs = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(doc) = self.load(entity, id)? {
                docs.push(doc);
            }
        }

        let expected = IndexStore::expected(entity, &docs);
        let actual = self.indexes.snapshot(entity);
        for (path, want) in &expected {
            let have = actual.get(path).cloned().unwrap_or_default();
            if &have == want {
                continue;
            }

            let keys: BTreeSet<&String> = want.keys().chain(have.keys()).collect();
            for key in keys {
                let want_ids = want.get(key).cloned().unwrap_or_default();
                let have_ids = have.get(key).cloned().unwrap_or_default();
                if let Some(id) = want_ids.symmetric_difference(&have_ids).next() {
                    error!(entity = %entity.name, id = %id, path = %path, key = %key, "index inconsistency");
                    return Err(EngineError::IndexInconsistency {
                        entity: entity.name.clone(),
                        id: id.clone(),
                        detail: format!("bucket '{}' disagrees with storage under key '{}'", path, key),
                    });
                }
            }
        }
        Ok(docs.len())
    }
}

fn encode(entity: &EntityType, doc: &Document) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&doc.to_json(entity))?)
}

fn decode(entity: &EntityType, bytes: &[u8]) -> Result<Document> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    Ok(Document::from_json(entity, value)?)
}
