//! Database schema migrations for the embedded graph store.
//!
//! Version 1 creates the `nodes` and `edges` tables. Secondary indexes are
//! managed separately by [`create_indexes`] / [`drop_indexes`] so that the
//! store can mirror a graph database's schema initialise/drop cycle.

use rusqlite::Connection;
use tracing::info;

use agora_core::error::AgoraError;

/// Prefix of every secondary index this crate owns.
pub const INDEX_PREFIX: &str = "idx_graph_";

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), AgoraError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| AgoraError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| AgoraError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: graph_schema");
    }

    Ok(())
}

/// Version 1: node and edge tables.
fn apply_v1(conn: &Connection) -> Result<(), AgoraError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS nodes (
            uuid        TEXT PRIMARY KEY NOT NULL,
            label       TEXT NOT NULL
                        CHECK (label IN ('User', 'Room', 'Message', 'Cluster',
                                         'Community', 'Entity', 'Topic', 'Preference')),
            name        TEXT NOT NULL DEFAULT '',
            platform    INTEGER NOT NULL DEFAULT 1,
            properties  TEXT NOT NULL DEFAULT '{}',
            embedding   BLOB,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS edges (
            from_uuid   TEXT NOT NULL REFERENCES nodes (uuid) ON DELETE CASCADE,
            rel         TEXT NOT NULL,
            to_uuid     TEXT NOT NULL REFERENCES nodes (uuid) ON DELETE CASCADE,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            valid_from  TEXT,
            valid_to    TEXT,
            count       INTEGER,
            PRIMARY KEY (from_uuid, rel, to_uuid)
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'graph_schema');
        ",
    )
    .map_err(|e| AgoraError::Storage(format!("Migration v1 failed: {}", e)))?;

    create_indexes(conn)
}

/// Create the secondary indexes if missing.
pub fn create_indexes(conn: &Connection) -> Result<(), AgoraError> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_graph_nodes_label_name
            ON nodes (label, name);

        CREATE INDEX IF NOT EXISTS idx_graph_nodes_label_created
            ON nodes (label, created_at, uuid);

        CREATE INDEX IF NOT EXISTS idx_graph_edges_to
            ON edges (to_uuid, rel);
        ",
    )
    .map_err(|e| AgoraError::Storage(format!("Failed to create indexes: {}", e)))
}

/// Drop every secondary index owned by the graph store, returning their names.
pub fn drop_indexes(conn: &Connection) -> Result<Vec<String>, AgoraError> {
    let names: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE ?1 ORDER BY name")
            .map_err(|e| AgoraError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([format!("{INDEX_PREFIX}%")], |row| row.get::<_, String>(0))
            .map_err(|e| AgoraError::Storage(e.to_string()))?;
        rows.collect::<Result<_, _>>()
            .map_err(|e| AgoraError::Storage(e.to_string()))?
    };

    for name in &names {
        conn.execute_batch(&format!("DROP INDEX IF EXISTS \"{}\"", name.replace('"', "\"\"")))
            .map_err(|e| AgoraError::Storage(format!("Failed to drop index {name}: {e}")))?;
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_graph_%'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_drop_and_recreate_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(index_count(&conn), 3);

        let dropped = drop_indexes(&conn).unwrap();
        assert_eq!(dropped.len(), 3);
        assert!(dropped.contains(&"idx_graph_edges_to".to_string()));
        assert_eq!(index_count(&conn), 0);

        create_indexes(&conn).unwrap();
        assert_eq!(index_count(&conn), 3);
    }

    #[test]
    fn test_label_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO nodes (uuid, label, created_at, updated_at) VALUES ('x', 'Channel', '', '')",
            [],
        );
        assert!(result.is_err());
    }
}
