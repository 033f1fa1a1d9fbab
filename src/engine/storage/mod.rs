//! Storage Adapter Layer
//!
//! Raw key-value access over opaque byte blobs. Keys are (namespace, id)
//! pairs where the namespace is the entity type name. Adapters guarantee
//! per-key atomicity only; there are no cross-key transactions.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use super::error::StorageError;

/// Universal result type for adapter operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Key-value backend implemented by every storage engine
pub trait StorageAdapter: Send + Sync {
    /// Short backend name for status output
    fn backend(&self) -> &'static str;

    /// Read a blob; `None` when the key is absent
    fn get(&self, namespace: &str, id: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Create or replace a blob
    fn put(&self, namespace: &str, id: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Remove a blob; removing an absent key is not an error
    fn delete(&self, namespace: &str, id: &str) -> StorageResult<()>;

    /// Every id currently stored under a namespace
    fn scan(&self, namespace: &str) -> StorageResult<Vec<String>>;
}
