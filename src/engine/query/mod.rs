//! Conjunctive queries over the index store

pub mod compiler;
pub mod executor;
pub mod predicate;

pub use compiler::{compile, Lookup, PlanStep, QueryPlan};
pub use executor::QueryExecutor;
pub use predicate::{Predicate, PredicateTree};
