//! Engine Error Types

use thiserror::Error;

use super::schema::{IndexKind, ValueKind};

/// Errors raised while registering or resolving entity types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Entity type not registered: {0}")]
    NotFound(String),

    #[error("Entity type already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Duplicate field '{field}' in entity type {entity}")]
    DuplicateField { entity: String, field: String },

    #[error("Entity type {0} has no identifier field")]
    MissingIdentifier(String),

    #[error("Entity type {entity} declares more than one identifier ({first}, {second})")]
    MultipleIdentifiers {
        entity: String,
        first: String,
        second: String,
    },

    #[error("Identifier field '{field}' of entity type {entity} must be a top-level field")]
    NestedIdentifier { entity: String, field: String },

    #[error("Identifier field '{field}' must be a string, found {kind}")]
    IdentifierKind { field: String, kind: ValueKind },

    #[error("Field '{field}' of kind {value_kind} cannot carry a {index_kind} index")]
    IncompatibleIndex {
        field: String,
        value_kind: ValueKind,
        index_kind: IndexKind,
    },
}

/// Errors raised while checking a document against its entity type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{path}' has wrong kind, expected {expected}, found {found}")]
    KindMismatch {
        path: String,
        expected: ValueKind,
        found: String,
    },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field '{path}' is not a valid geo point: {reason}")]
    InvalidGeoPoint { path: String, reason: String },

    #[error("Identifier field '{0}' must be carried as the document id")]
    IdentifierInFields(String),

    #[error("Document body must be an object")]
    NotAnObject,

    #[error("Document id '{0}' is reserved by the HTTP routes")]
    ReservedId(String),
}

/// Errors raised while compiling a predicate tree into a plan
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Unknown field '{path}' on entity type {entity}")]
    UnknownField { entity: String, path: String },

    #[error("Predicate {predicate} needs a {required} index but '{path}' has {declared}")]
    KindMismatch {
        path: String,
        predicate: &'static str,
        required: IndexKind,
        declared: IndexKind,
    },

    #[error("Invalid operand for '{path}': {reason}")]
    InvalidOperand { path: String, reason: String },
}

/// Failures reported by a storage adapter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage connection pool error: {0}")]
    Pool(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        StorageError::Pool(err.to_string())
    }
}

/// Top-level error for every engine operation
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Document not found: {entity}/{id}")]
    NotFound { entity: String, id: String },

    #[error("Query compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Index inconsistency on {entity}/{id}: {detail}")]
    IndexInconsistency {
        entity: String,
        id: String,
        detail: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// True for errors rejected before any state was touched
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EngineError::Schema(_)
                | EngineError::Validation(_)
                | EngineError::Compile(_)
                | EngineError::NotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::not_found("people", "abc");
        assert_eq!(err.to_string(), "Document not found: people/abc");

        let err: EngineError = ValidationError::MissingField("age".to_string()).into();
        assert_eq!(err.to_string(), "Validation failed: Missing required field: age");
    }

    #[test]
    fn test_caller_errors() {
        assert!(EngineError::from(SchemaError::NotFound("x".into())).is_caller_error());
        assert!(!EngineError::from(StorageError::Backend("disk".into())).is_caller_error());
    }
}
