//! In-memory storage adapter

use dashmap::DashMap;

use super::{StorageAdapter, StorageResult};

/// Process-local storage backed by concurrent maps
#[derive(Debug, Default)]
pub struct MemoryStorage {
    spaces: DashMap<String, DashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn get(&self, namespace: &str, id: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .spaces
            .get(namespace)
            .and_then(|space| space.get(id).map(|bytes| bytes.value().clone())))
    }

    fn put(&self, namespace: &str, id: &str, bytes: &[u8]) -> StorageResult<()> {
        self.spaces
            .entry(namespace.to_string())
            .or_default()
            .insert(id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, namespace: &str, id: &str) -> StorageResult<()> {
        if let Some(space) = self.spaces.get(namespace) {
            space.remove(id);
        }
        Ok(())
    }

    fn scan(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let mut ids: Vec<String> = match self.spaces.get(namespace) {
            Some(space) => space.iter().map(|entry| entry.key().clone()).collect(),
            None => Vec::new(),
        };
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_crud() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("people", "a").unwrap(), None);

        storage.put("people", "a", b"one").unwrap();
        storage.put("people", "b", b"two").unwrap();
        storage.put("robots", "a", b"bolt").unwrap();
        assert_eq!(storage.get("people", "a").unwrap(), Some(b"one".to_vec()));
        assert_eq!(storage.scan("people").unwrap(), vec!["a", "b"]);

        storage.put("people", "a", b"uno").unwrap();
        assert_eq!(storage.get("people", "a").unwrap(), Some(b"uno".to_vec()));

        storage.delete("people", "a").unwrap();
        storage.delete("people", "missing").unwrap();
        assert_eq!(storage.scan("people").unwrap(), vec!["b"]);
        assert_eq!(storage.scan("robots").unwrap(), vec!["a"]);
        assert!(storage.scan("nothing").unwrap().is_empty());
    }
}
