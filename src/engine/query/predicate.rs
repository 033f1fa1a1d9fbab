//! Predicate trees: conjunctions of leaf predicates built by the caller

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::geo::{Distance, GeoPoint};
use crate::engine::schema::IndexKind;

/// A single leaf predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Value equals (exact index)
    Equals { field: String, value: Value },
    /// min <= value <= max (range index)
    Range { field: String, min: Value, max: Value },
    /// Within a great-circle distance of a point (geo index)
    GeoWithin {
        field: String,
        point: GeoPoint,
        distance: Distance,
    },
    /// Shares at least one token with the text (full-text index)
    TextMatches { field: String, text: String },
    /// Holds at least one of the values (set-membership index)
    SetIntersects { field: String, values: Vec<String> },
}

impl Predicate {
    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Equals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn range(field: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        Predicate::Range {
            field: field.to_string(),
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn geo_within(field: &str, point: GeoPoint, distance: Distance) -> Self {
        Predicate::GeoWithin {
            field: field.to_string(),
            point,
            distance,
        }
    }

    pub fn text_matches(field: &str, text: &str) -> Self {
        Predicate::TextMatches {
            field: field.to_string(),
            text: text.to_string(),
        }
    }

    pub fn set_intersects<I, S>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Predicate::SetIntersects {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Predicate::Equals { field, .. }
            | Predicate::Range { field, .. }
            | Predicate::GeoWithin { field, .. }
            | Predicate::TextMatches { field, .. }
            | Predicate::SetIntersects { field, .. } => field,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Predicate::Equals { .. } => "equals",
            Predicate::Range { .. } => "range",
            Predicate::GeoWithin { .. } => "geo_within",
            Predicate::TextMatches { .. } => "text_matches",
            Predicate::SetIntersects { .. } => "set_intersects",
        }
    }

    /// Index kind the field must carry
    pub fn required_index(&self) -> IndexKind {
        match self {
            Predicate::Equals { .. } => IndexKind::Exact,
            Predicate::Range { .. } => IndexKind::Range,
            Predicate::GeoWithin { .. } => IndexKind::Geo,
            Predicate::TextMatches { .. } => IndexKind::FullText,
            Predicate::SetIntersects { .. } => IndexKind::SetMembership,
        }
    }
}

/// Conjunction of leaf predicates; empty means every document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredicateTree {
    #[serde(default)]
    pub all: Vec<Predicate>,
}

impl PredicateTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.all.push(predicate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

impl From<Predicate> for PredicateTree {
    fn from(predicate: Predicate) -> Self {
        Self {
            all: vec![predicate],
        }
    }
}

impl From<Vec<Predicate>> for PredicateTree {
    fn from(all: Vec<Predicate>) -> Self {
        Self { all }
    }
}
