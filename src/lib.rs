//! docdex - Typed secondary indexes and conjunctive queries over a
//! key-value document store
//!
//! Documents live in a pluggable storage adapter (in-memory or SQLite).
//! Indexes are rebuilt from storage on registration and kept in step with
//! every write by the index maintainer.

pub mod engine;
