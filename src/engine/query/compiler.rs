//! Query Compiler
//!
//! Resolves every leaf predicate against the entity type, checks it against
//! the field's declared index kind, normalizes its operand into the form the
//! bucket stores, and orders the resulting steps from narrowest to widest.

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::predicate::{Predicate, PredicateTree};
use crate::engine::document::FieldValue;
use crate::engine::error::CompileError;
use crate::engine::geo::GeoPoint;
use crate::engine::index::{exact_key, NumericKey};
use crate::engine::schema::{EntityType, FieldSpec, ValueKind};
use crate::engine::text;

/// A bucket lookup with its operand already in key form
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Exact(String),
    Range { min: NumericKey, max: NumericKey },
    Within { center: GeoPoint, radius_m: f64 },
    AnyToken(BTreeSet<String>),
    AnyElement(BTreeSet<String>),
}

impl Lookup {
    /// Static cost rank: exact < set-membership < range < geo < full-text
    pub fn cost(&self) -> u8 {
        match self {
            Lookup::Exact(_) => 0,
            Lookup::AnyElement(_) => 1,
            Lookup::Range { .. } => 2,
            Lookup::Within { .. } => 3,
            Lookup::AnyToken(_) => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub path: String,
    pub lookup: Lookup,
}

/// Ordered index lookups followed by a fetch of the surviving ids
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub entity: Arc<EntityType>,
    pub steps: Vec<PlanStep>,
}

impl QueryPlan {
    /// True when the plan reads every document of the entity type
    pub fn is_full_scan(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Compile a predicate tree for `entity`
pub fn compile(tree: &PredicateTree, entity: &Arc<EntityType>) -> Result<QueryPlan, CompileError> {
    let mut steps = tree
        .all
        .iter()
        .map(|predicate| compile_leaf(predicate, entity))
        .collect::<Result<Vec<_>, _>>()?;

    steps.sort_by(|a, b| {
        a.lookup
            .cost()
            .cmp(&b.lookup.cost())
            .then_with(|| a.path.cmp(&b.path))
    });

    debug!(
        entity = %entity.name,
        steps = ?steps.iter().map(|s| s.path.as_str()).collect::<Vec<_>>(),
        "compiled query plan"
    );

    Ok(QueryPlan {
        entity: Arc::clone(entity),
        steps,
    })
}

fn compile_leaf(predicate: &Predicate, entity: &EntityType) -> Result<PlanStep, CompileError> {
    let path = predicate.field();
    let spec = entity
        .resolve(path)
        .ok_or_else(|| CompileError::UnknownField {
            entity: entity.name.clone(),
            path: path.to_string(),
        })?;

    let required = predicate.required_index();
    if spec.kind == ValueKind::Object || spec.index != required {
        return Err(CompileError::KindMismatch {
            path: path.to_string(),
            predicate: predicate.name(),
            required,
            declared: spec.index,
        });
    }

    let invalid = |reason: String| CompileError::InvalidOperand {
        path: path.to_string(),
        reason,
    };

    let lookup = match predicate {
        Predicate::Equals { value, .. } => Lookup::Exact(exact_operand(spec, value).map_err(invalid)?),
        Predicate::Range { min, max, .. } => {
            let lo = number_operand(min).map_err(&invalid)?;
            let hi = number_operand(max).map_err(&invalid)?;
            if lo.as_f64() > hi.as_f64() {
                return Err(invalid(format!("min {} is greater than max {}", min, max)));
            }
            Lookup::Range {
                min: lo.coerce(spec.kind, Bound::Lower),
                max: hi.coerce(spec.kind, Bound::Upper),
            }
        }
        Predicate::GeoWithin { point, distance, .. } => {
            point.check().map_err(&invalid)?;
            let radius_m = distance.to_meters();
            if !radius_m.is_finite() || radius_m < 0.0 {
                return Err(invalid(format!("radius {} is not a finite non-negative distance", distance.value)));
            }
            Lookup::Within {
                center: *point,
                radius_m,
            }
        }
        Predicate::TextMatches { text: query, .. } => Lookup::AnyToken(text::unique_terms(query)),
        Predicate::SetIntersects { values, .. } => {
            Lookup::AnyElement(values.iter().cloned().collect())
        }
    };

    Ok(PlanStep {
        path: path.to_string(),
        lookup,
    })
}

/// Canonical exact key of an equality operand, checked against the field kind
fn exact_operand(spec: &FieldSpec, value: &Value) -> Result<String, String> {
    let typed = match (spec.kind, value) {
        (ValueKind::String, Value::String(s)) => FieldValue::String(s.clone()),
        (ValueKind::Integer, Value::Number(n)) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    FieldValue::Integer(f as i64)
                }
                _ => return Err(format!("{} is not an integer", n)),
            },
        },
        (ValueKind::Float, Value::Number(n)) => match n.as_f64() {
            Some(f) => FieldValue::Float(f),
            None => return Err(format!("{} is not a float", n)),
        },
        (kind, other) => return Err(format!("{} cannot be compared with a {} field", other, kind)),
    };
    exact_key(&typed).ok_or_else(|| format!("{} fields have no exact key", spec.kind))
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(&self) -> f64 {
        match self {
            Number::Int(n) => *n as f64,
            Number::Float(f) => *f,
        }
    }

    /// Convert to the key variant of a `kind` field without changing which values the bound admits
    fn coerce(self, kind: ValueKind, bound: Bound) -> NumericKey {
        match (kind, self) {
            (ValueKind::Float, n) => NumericKey::float(n.as_f64()),
            (_, Number::Int(n)) => NumericKey::Int(n),
            // `as` saturates at the i64 limits
            (_, Number::Float(f)) => match bound {
                Bound::Lower => NumericKey::Int(f.ceil() as i64),
                Bound::Upper => NumericKey::Int(f.floor() as i64),
            },
        }
    }
}

fn number_operand(value: &Value) -> Result<Number, String> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Number::Int(i)),
            None => n
                .as_f64()
                .map(Number::Float)
                .ok_or_else(|| format!("{} is out of range", n)),
        },
        other => Err(format!("range bound {} is not a number", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geo::Distance;
    use crate::engine::schema::IndexKind;

    fn entity() -> Arc<EntityType> {
        Arc::new(EntityType::new(
            "people",
            vec![
                FieldSpec::id("id").indexed(IndexKind::Exact),
                FieldSpec::new("lastName", ValueKind::String).indexed(IndexKind::Exact),
                FieldSpec::new("age", ValueKind::Integer).indexed(IndexKind::Range),
                FieldSpec::new("height", ValueKind::Float).indexed(IndexKind::Range),
                FieldSpec::new("statement", ValueKind::String).indexed(IndexKind::FullText),
                FieldSpec::new("homeLoc", ValueKind::GeoPoint).indexed(IndexKind::Geo),
                FieldSpec::new("skills", ValueKind::StringSet).indexed(IndexKind::SetMembership),
                FieldSpec::new("nickname", ValueKind::String),
                FieldSpec::object(
                    "address",
                    vec![FieldSpec::new("city", ValueKind::String).indexed(IndexKind::Exact)],
                ),
            ],
        ))
    }

    #[test]
    fn test_steps_ordered_by_cost() {
        let entity = entity();
        let tree = PredicateTree::new()
            .and(Predicate::text_matches("statement", "rabbit"))
            .and(Predicate::geo_within("homeLoc", GeoPoint::new(0.0, 0.0), Distance::kilometers(5.0)))
            .and(Predicate::range("age", 30, 40))
            .and(Predicate::set_intersects("skills", ["deception"]))
            .and(Predicate::equals("address.city", "New York"))
            .and(Predicate::equals("lastName", "Romanoff"));

        let plan = compile(&tree, &entity).unwrap();
        let paths: Vec<&str> = plan.steps.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["address.city", "lastName", "skills", "age", "homeLoc", "statement"]
        );
        assert_eq!(
            plan.steps[4].lookup,
            Lookup::Within {
                center: GeoPoint::new(0.0, 0.0),
                radius_m: 5000.0
            }
        );
    }

    #[test]
    fn test_compile_errors() {
        let entity = entity();
        let unknown = compile(&Predicate::equals("shoeSize", 9).into(), &entity);
        assert!(matches!(unknown, Err(CompileError::UnknownField { .. })));

        let unindexed = compile(&Predicate::equals("nickname", "Star-Lord").into(), &entity);
        assert!(matches!(
            unindexed,
            Err(CompileError::KindMismatch { declared: IndexKind::None, .. })
        ));

        let wrong_kind = compile(&Predicate::range("lastName", 1, 2).into(), &entity);
        assert!(matches!(wrong_kind, Err(CompileError::KindMismatch { .. })));

        let object = compile(&Predicate::equals("address", "x").into(), &entity);
        assert!(matches!(object, Err(CompileError::KindMismatch { .. })));

        let inverted = compile(&Predicate::range("age", 40, 30).into(), &entity);
        assert!(matches!(inverted, Err(CompileError::InvalidOperand { .. })));

        let bad_point = compile(
            &Predicate::geo_within("homeLoc", GeoPoint::new(200.0, 0.0), Distance::meters(1.0)).into(),
            &entity,
        );
        assert!(matches!(bad_point, Err(CompileError::InvalidOperand { .. })));

        let negative = compile(
            &Predicate::geo_within("homeLoc", GeoPoint::new(0.0, 0.0), Distance::miles(-1.0)).into(),
            &entity,
        );
        assert!(matches!(negative, Err(CompileError::InvalidOperand { .. })));

        let mistyped = compile(&Predicate::equals("age", "old").into(), &entity);
        assert!(matches!(mistyped, Err(CompileError::InvalidOperand { .. })));
    }

    #[test]
    fn test_range_bounds_follow_field_kind() {
        let entity = entity();

        let plan = compile(&Predicate::range("age", 29.5, 40.5).into(), &entity).unwrap();
        assert_eq!(
            plan.steps[0].lookup,
            Lookup::Range {
                min: NumericKey::Int(30),
                max: NumericKey::Int(40)
            }
        );

        let plan = compile(&Predicate::range("height", 1, 2).into(), &entity).unwrap();
        assert_eq!(
            plan.steps[0].lookup,
            Lookup::Range {
                min: NumericKey::Float(1.0),
                max: NumericKey::Float(2.0)
            }
        );
    }

    #[test]
    fn test_operands_normalized() {
        let entity = entity();
        let plan = compile(
            &PredicateTree::new()
                .and(Predicate::equals("age", 43.0))
                .and(Predicate::text_matches("statement", "Deception, DECEPTION and tricks")),
            &entity,
        );
        // `age` is range indexed, so equality does not apply
        assert!(plan.is_err());

        let plan = compile(
            &Predicate::text_matches("statement", "Deception, DECEPTION and tricks").into(),
            &entity,
        )
        .unwrap();
        let expected: BTreeSet<String> = ["and", "deception", "tricks"].iter().map(|s| s.to_string()).collect();
        assert_eq!(plan.steps[0].lookup, Lookup::AnyToken(expected));

        let plan = compile(&PredicateTree::new(), &entity).unwrap();
        assert!(plan.is_full_scan());
    }
}
