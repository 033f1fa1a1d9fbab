//! Query Executor
//!
//! Runs a plan's lookups in order, intersecting candidate sets, then fetches
//! the survivors. Ids whose document disappeared between lookup and fetch
//! are dropped from the result and queued for index repair.

use std::collections::HashSet;
use tracing::{debug, error, warn};

use super::compiler::{Lookup, PlanStep, QueryPlan};
use crate::engine::document::Document;
use crate::engine::error::{EngineError, Result};
use crate::engine::index::IndexBucket;
use crate::engine::maintainer::IndexMaintainer;

pub struct QueryExecutor<'a> {
    maintainer: &'a IndexMaintainer,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(maintainer: &'a IndexMaintainer) -> Self {
        Self { maintainer }
    }

    /// Execute the plan; documents come back ordered by id
    pub fn execute(&self, plan: &QueryPlan) -> Result<Vec<Document>> {
        let mut ids: Vec<String> = match self.candidates(plan)? {
            Some(ids) => ids.into_iter().collect(),
            None => self.maintainer.storage().scan(&plan.entity.name)?,
        };
        ids.sort();

        let mut docs = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.maintainer.load(&plan.entity, id) {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {
                    warn!(entity = %plan.entity.name, id = %id, "indexed id has no document, dropping it");
                    self.maintainer.mark_for_repair(&plan.entity, id);
                }
                Err(EngineError::Storage(e)) => return Err(e.into()),
                Err(e) => {
                    error!(entity = %plan.entity.name, id = %id, error = %e, "stored document unreadable, dropping it");
                    self.maintainer.mark_for_repair(&plan.entity, id);
                }
            }
        }
        Ok(docs)
    }

    /// Intersection of every step's ids; None when the plan has no steps
    fn candidates(&self, plan: &QueryPlan) -> Result<Option<HashSet<String>>> {
        let mut running: Option<HashSet<String>> = None;

        for step in &plan.steps {
            let found = self.evaluate(plan, step)?;
            let next = match running {
                None => found,
                Some(mut current) => {
                    current.retain(|id| found.contains(id));
                    current
                }
            };
            debug!(entity = %plan.entity.name, path = %step.path, candidates = next.len(), "plan step");

            if next.is_empty() {
                return Ok(Some(next));
            }
            running = Some(next);
        }

        Ok(running)
    }

    fn evaluate(&self, plan: &QueryPlan, step: &PlanStep) -> Result<HashSet<String>> {
        let bucket = self
            .maintainer
            .indexes()
            .bucket(&plan.entity.name, &step.path)
            .ok_or_else(|| EngineError::IndexInconsistency {
                entity: plan.entity.name.clone(),
                id: String::new(),
                detail: format!("no index bucket for field '{}'", step.path),
            })?;

        let ids = match (bucket.as_ref(), &step.lookup) {
            (IndexBucket::Exact(b), Lookup::Exact(key)) => b.get(key),
            (IndexBucket::Range(b), Lookup::Range { min, max }) => b.range(*min, *max),
            (IndexBucket::Geo(b), Lookup::Within { center, radius_m }) => b.within(center, *radius_m),
            (IndexBucket::FullText(b), Lookup::AnyToken(tokens)) => b.union(tokens),
            (IndexBucket::SetMembership(b), Lookup::AnyElement(values)) => b.union(values),
            (bucket, lookup) => {
                return Err(EngineError::IndexInconsistency {
                    entity: plan.entity.name.clone(),
                    id: String::new(),
                    detail: format!(
                        "{} bucket of '{}' cannot answer {:?}",
                        bucket.kind(),
                        step.path,
                        lookup
                    ),
                })
            }
        };
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::document::FieldValue;
    use crate::engine::geo::{Distance, GeoPoint};
    use crate::engine::index::IndexStore;
    use crate::engine::query::{compile, Predicate, PredicateTree};
    use crate::engine::schema::{EntityType, FieldSpec, IndexKind, ValueKind};
    use crate::engine::storage::{MemoryStorage, StorageAdapter};
    use std::sync::Arc;

    fn setup() -> (Arc<EntityType>, IndexMaintainer) {
        let entity = Arc::new(EntityType::new(
            "people",
            vec![
                FieldSpec::id("id").indexed(IndexKind::Exact),
                FieldSpec::new("age", ValueKind::Integer).indexed(IndexKind::Range),
                FieldSpec::new("homeLoc", ValueKind::GeoPoint).indexed(IndexKind::Geo),
                FieldSpec::new("skills", ValueKind::StringSet).indexed(IndexKind::SetMembership),
            ],
        ));
        let indexes = Arc::new(IndexStore::new(0.5));
        indexes.create_buckets(&entity);
        let m = IndexMaintainer::new(Arc::new(MemoryStorage::new()), indexes);

        let rows = [
            ("thor", 38i64, (153.616667, -28.716667), vec!["hammer", "lightning"]),
            ("loki", 37, (-0.1275, 51.507222), vec!["deception", "magic"]),
            ("natasha", 32, (-73.935242, 40.73061), vec!["deception", "martial_arts"]),
            ("nick", 73, (-118.4345534, 34.082615), vec!["leadership"]),
        ];
        for (id, age, (lon, lat), skills) in rows {
            m.upsert(
                &entity,
                Document::with_id(id)
                    .with("age", age)
                    .with("homeLoc", GeoPoint::new(lon, lat))
                    .with("skills", FieldValue::set(skills)),
            )
            .unwrap();
        }
        (entity, m)
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_intersection_of_steps() {
        let (entity, m) = setup();
        let tree = PredicateTree::new()
            .and(Predicate::range("age", 30, 40))
            .and(Predicate::set_intersects("skills", ["deception"]));
        let plan = compile(&tree, &entity).unwrap();

        let docs = QueryExecutor::new(&m).execute(&plan).unwrap();
        assert_eq!(ids(&docs), vec!["loki", "natasha"]);
    }

    #[test]
    fn test_empty_intersection_short_circuits() {
        let (entity, m) = setup();
        let tree = PredicateTree::new()
            .and(Predicate::equals("id", "nick"))
            .and(Predicate::range("age", 0, 10))
            .and(Predicate::geo_within("homeLoc", GeoPoint::new(0.0, 0.0), Distance::kilometers(1.0)));
        let plan = compile(&tree, &entity).unwrap();
        assert!(QueryExecutor::new(&m).execute(&plan).unwrap().is_empty());
    }

    #[test]
    fn test_empty_plan_returns_everything() {
        let (entity, m) = setup();
        let plan = compile(&PredicateTree::new(), &entity).unwrap();
        let docs = QueryExecutor::new(&m).execute(&plan).unwrap();
        assert_eq!(ids(&docs), vec!["loki", "natasha", "nick", "thor"]);
    }

    #[test]
    fn test_stale_id_is_dropped_and_queued() {
        let (entity, m) = setup();
        // delete behind the maintainer's back
        m.storage().delete("people", "loki").unwrap();

        let plan = compile(&Predicate::set_intersects("skills", ["deception"]).into(), &entity).unwrap();
        let docs = QueryExecutor::new(&m).execute(&plan).unwrap();
        assert_eq!(ids(&docs), vec!["natasha"]);
        assert_eq!(m.pending_repairs(), 1);

        m.repair_pending().unwrap();
        assert!(m.verify(&entity).is_ok());
    }
}
