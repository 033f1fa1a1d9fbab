//! Repository facade
//!
//! The interface drivers call: entity types by name, documents in and out,
//! and conjunctive queries. Owns the schema registry, the index store and
//! the maintainer that keeps both in step with storage.

use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::config::{Config, StorageBackend};
use super::document::Document;
use super::error::{EngineError, Result};
use super::index::IndexStore;
use super::maintainer::{IndexMaintainer, Upserted};
use super::query::{compile, PredicateTree, QueryExecutor};
use super::schema::{EntityType, FieldSpec, SchemaRegistry};
use super::storage::{MemoryStorage, SqliteStorage, StorageAdapter};

/// Per entity type counters for status output
#[derive(Debug, Clone, Serialize)]
pub struct EntityStatus {
    pub name: String,
    pub documents: usize,
    pub indexed_fields: usize,
}

pub struct Repository {
    registry: SchemaRegistry,
    maintainer: IndexMaintainer,
}

impl Repository {
    pub fn new(storage: Arc<dyn StorageAdapter>, geo_cell_degrees: f64) -> Self {
        let indexes = Arc::new(IndexStore::new(geo_cell_degrees));
        Self {
            registry: SchemaRegistry::new(),
            maintainer: IndexMaintainer::new(storage, indexes),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), 0.5)
    }

    /// Open the storage a project config names and register its entity types
    pub fn open(project_dir: &Path, config: &Config) -> Result<Self> {
        let storage: Arc<dyn StorageAdapter> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::Sqlite => Arc::new(SqliteStorage::new(&config.db_path(project_dir))?),
        };

        let repo = Self::new(storage, config.index.geo_cell_degrees);
        for entity in &config.entities {
            repo.register_entity(entity.clone())?;
        }
        info!(
            project = %config.project.name,
            backend = repo.backend(),
            entities = config.entities.len(),
            "repository opened"
        );
        Ok(repo)
    }

    pub fn backend(&self) -> &'static str {
        self.maintainer.storage().backend()
    }

    pub fn register(&self, name: &str, fields: Vec<FieldSpec>) -> Result<Arc<EntityType>> {
        self.register_entity(EntityType::new(name, fields))
    }

    /// Register an entity type and index whatever storage already holds for it
    pub fn register_entity(&self, entity: EntityType) -> Result<Arc<EntityType>> {
        let entity = self.registry.register_entity(entity)?;
        self.maintainer.reindex(&entity)?;
        Ok(entity)
    }

    pub fn entity(&self, name: &str) -> Result<Arc<EntityType>> {
        Ok(self.registry.lookup(name)?)
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn upsert(&self, entity: &str, doc: Document) -> Result<Upserted> {
        let entity = self.entity(entity)?;
        self.maintainer.upsert(&entity, doc)
    }

    /// Upsert a plain JSON object
    pub fn upsert_json(&self, entity: &str, body: Value) -> Result<Upserted> {
        let entity = self.entity(entity)?;
        let doc = Document::from_json(&entity, body)?;
        self.maintainer.upsert(&entity, doc)
    }

    pub fn delete_all(&self, entity: &str) -> Result<usize> {
        let entity = self.entity(entity)?;
        self.maintainer.remove_all(&entity)
    }

    pub fn delete_by_id(&self, entity: &str, id: &str) -> Result<()> {
        let entity = self.entity(entity)?;
        self.maintainer.remove(&entity, id)
    }

    pub fn find_by_id(&self, entity: &str, id: &str) -> Result<Document> {
        let entity = self.entity(entity)?;
        self.maintainer
            .load(&entity, id)?
            .ok_or_else(|| EngineError::not_found(&entity.name, id))
    }

    pub fn find_all(&self, entity: &str) -> Result<Vec<Document>> {
        self.query(entity, &PredicateTree::new())
    }

    pub fn query(&self, entity: &str, tree: &PredicateTree) -> Result<Vec<Document>> {
        let entity = self.entity(entity)?;
        let plan = compile(tree, &entity)?;
        QueryExecutor::new(&self.maintainer).execute(&plan)
    }

    /// Recompute index entries for ids queued by partial updates or stale reads
    pub fn repair(&self) -> Result<usize> {
        self.maintainer.repair_pending()
    }

    pub fn reindex(&self, entity: &str) -> Result<usize> {
        let entity = self.entity(entity)?;
        self.maintainer.reindex(&entity)
    }

    /// Check every bucket of `entity` against storage
    pub fn verify(&self, entity: &str) -> Result<usize> {
        let entity = self.entity(entity)?;
        self.maintainer.verify(&entity)
    }

    pub fn status(&self) -> Result<Vec<EntityStatus>> {
        self.entity_names()
            .into_iter()
            .map(|name| {
                let entity = self.entity(&name)?;
                Ok(EntityStatus {
                    documents: self.maintainer.storage().scan(&name)?.len(),
                    indexed_fields: entity.indexed_fields().len(),
                    name,
                })
            })
            .collect()
    }

    pub fn pending_repairs(&self) -> usize {
        self.maintainer.pending_repairs()
    }

    /// True when no bucket of `entity` holds a key
    pub fn indexes_empty(&self, entity: &str) -> Result<bool> {
        let entity = self.entity(entity)?;
        Ok(self.maintainer.indexes().is_empty(&entity))
    }
}
