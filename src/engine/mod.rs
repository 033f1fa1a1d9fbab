// docdex Engine - Core module structure
pub mod api;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod geo;
pub mod index;
pub mod locks;
pub mod maintainer;
pub mod people;
pub mod query;
pub mod repository;
pub mod schema;
pub mod storage;
pub mod text;

pub use config::Config;
pub use document::{Document, FieldValue};
pub use error::{EngineError, Result};
pub use geo::{Distance, DistanceUnit, GeoPoint};
pub use query::{Predicate, PredicateTree};
pub use repository::Repository;
pub use schema::{EntityType, FieldSpec, IndexKind, ValueKind};
