//! SQLite connection management for the embedded graph store.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Foreign keys must stay enabled: detach-delete relies on cascading edges.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction};
use tracing::info;

use agora_core::error::AgoraError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path and run pending migrations.
    pub fn new(path: &Path) -> Result<Self, AgoraError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AgoraError::Storage(format!("Failed to open database: {}", e)))?;
        let db = Self::configure(conn, "PRAGMA cache_size = -65536;")?;
        info!("Graph database opened at {}", path.display());
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, AgoraError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AgoraError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::configure(conn, "")
    }

    fn configure(conn: Connection, extra_pragmas: &str) -> Result<Self, AgoraError> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             {extra_pragmas}"
        ))
        .map_err(|e| AgoraError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, AgoraError>
    where
        F: FnOnce(&Connection) -> Result<T, AgoraError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AgoraError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a closure inside a transaction, committing on `Ok`.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, AgoraError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, AgoraError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| AgoraError::Storage(format!("Database lock poisoned: {}", e)))?;
        let tx = conn
            .transaction()
            .map_err(|e| AgoraError::Storage(format!("Failed to begin transaction: {}", e)))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| AgoraError::Storage(format!("Failed to commit: {}", e)))?;
        Ok(value)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(|e| AgoraError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(count(&db, "nodes"), 0);
        assert_eq!(count(&db, "edges"), 0);
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        let db = Database::new(&path).unwrap();
        assert_eq!(count(&db, "nodes"), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let enabled: i64 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .map_err(|e| AgoraError::Storage(e.to_string()))?;
            assert_eq!(enabled, 1);
            Ok(())
        })
        .unwrap();
    }
}
