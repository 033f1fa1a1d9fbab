//! SQLite storage adapter
//!
//! A single key-value table behind an r2d2 connection pool.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};

use super::{StorageAdapter, StorageResult};

type DbPool = Pool<SqliteConnectionManager>;
type DbConn = PooledConnection<SqliteConnectionManager>;

pub struct SqliteStorage {
    pool: DbPool,
    db_path: PathBuf,
}

impl SqliteStorage {
    pub fn new(db_path: &Path) -> StorageResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let storage = Self {
            pool,
            db_path: db_path.to_path_buf(),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    pub fn in_memory() -> StorageResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;

        let storage = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _docdex_documents (
                namespace TEXT NOT NULL,
                id TEXT NOT NULL,
                body BLOB NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, id)
            )",
            [],
        )?;

        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Ok(())
    }

    fn get_conn(&self) -> StorageResult<DbConn> {
        Ok(self.pool.get()?)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl StorageAdapter for SqliteStorage {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, namespace: &str, id: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.get_conn()?;
        let body = conn
            .query_row(
                "SELECT body FROM _docdex_documents WHERE namespace = ?1 AND id = ?2",
                params![namespace, id],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(body)
    }

    fn put(&self, namespace: &str, id: &str, bytes: &[u8]) -> StorageResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO _docdex_documents (namespace, id, body, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(namespace, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![namespace, id, bytes],
        )?;
        Ok(())
    }

    fn delete(&self, namespace: &str, id: &str) -> StorageResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "DELETE FROM _docdex_documents WHERE namespace = ?1 AND id = ?2",
            params![namespace, id],
        )?;
        Ok(())
    }

    fn scan(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT id FROM _docdex_documents WHERE namespace = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![namespace], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sqlite_crud() {
        let storage = SqliteStorage::in_memory().unwrap();
        assert_eq!(storage.get("people", "a").unwrap(), None);

        storage.put("people", "a", b"one").unwrap();
        storage.put("people", "a", b"uno").unwrap();
        storage.put("people", "b", b"two").unwrap();
        assert_eq!(storage.get("people", "a").unwrap(), Some(b"uno".to_vec()));
        assert_eq!(storage.scan("people").unwrap(), vec!["a", "b"]);

        storage.delete("people", "a").unwrap();
        assert_eq!(storage.scan("people").unwrap(), vec!["b"]);
    }

    #[test]
    fn test_sqlite_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("docdex.db");

        {
            let storage = SqliteStorage::new(&path).unwrap();
            storage.put("people", "x", b"{}").unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.path(), path.as_path());
        assert_eq!(storage.get("people", "x").unwrap(), Some(b"{}".to_vec()));
    }
}
