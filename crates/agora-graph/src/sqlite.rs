//! Embedded graph store on SQLite.
//!
//! Nodes live in one table keyed by uuid with label-specific properties as a
//! JSON object; embeddings are little-endian `f32` blobs. Edges reference
//! nodes with `ON DELETE CASCADE`, which gives detach-delete semantics.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use agora_core::error::{AgoraError, Result};
use agora_core::types::PlatformType;

use crate::db::Database;
use crate::edges::{EdgeRecord, EdgeType};
use crate::migrations;
use crate::schema::{NodeLabel, NodeRecord};
use crate::store::{GraphStats, GraphStore};

const NODE_COLUMNS: &str =
    "uuid, label, name, platform, properties, embedding, created_at, updated_at";

pub struct SqliteGraphStore {
    db: Arc<Database>,
}

impl SqliteGraphStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(Database::new(path)?)))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Arc::new(Database::in_memory()?)))
    }

    /// Run `f` against the locked connection on the blocking thread pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(join_err)?
    }

    /// Like [`Self::blocking`], inside a transaction.
    async fn blocking_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.with_tx(f))
            .await
            .map_err(join_err)?
    }
}

fn join_err(e: tokio::task::JoinError) -> AgoraError {
    AgoraError::Storage(format!("Blocking database task failed: {e}"))
}

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> AgoraError + '_ {
    move |e| AgoraError::Storage(format!("{context}: {e}"))
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AgoraError::Storage(format!("Invalid timestamp '{s}': {e}")))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AgoraError::Storage(format!("Invalid uuid '{s}': {e}")))
}

pub(crate) fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Raw columns of a node row, converted outside the rusqlite closure so that
/// parse failures surface as `AgoraError`.
struct NodeRow {
    uuid: String,
    label: String,
    name: String,
    platform: i64,
    properties: String,
    embedding: Option<Vec<u8>>,
    created_at: String,
    updated_at: String,
}

impl NodeRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uuid: row.get(0)?,
            label: row.get(1)?,
            name: row.get(2)?,
            platform: row.get(3)?,
            properties: row.get(4)?,
            embedding: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<NodeRecord> {
        let properties: Map<String, Value> = serde_json::from_str(&self.properties)?;
        Ok(NodeRecord {
            uuid: parse_uuid(&self.uuid)?,
            label: self.label.parse()?,
            name: self.name,
            platform: PlatformType::from_i32(self.platform as i32)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            properties,
            embedding: self.embedding.as_deref().map(blob_to_embedding),
        })
    }
}

struct EdgeRow {
    from: String,
    from_label: String,
    rel: String,
    to: String,
    to_label: String,
    created_at: String,
    updated_at: String,
    valid_from: Option<String>,
    valid_to: Option<String>,
    count: Option<i64>,
}

impl EdgeRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            from: row.get(0)?,
            from_label: row.get(1)?,
            rel: row.get(2)?,
            to: row.get(3)?,
            to_label: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            valid_from: row.get(7)?,
            valid_to: row.get(8)?,
            count: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<EdgeRecord> {
        Ok(EdgeRecord {
            from: parse_uuid(&self.from)?,
            from_label: self.from_label.parse()?,
            rel: self.rel.parse()?,
            to: parse_uuid(&self.to)?,
            to_label: self.to_label.parse()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            valid_from: parse_opt_ts(self.valid_from)?,
            valid_to: parse_opt_ts(self.valid_to)?,
            count: self.count,
        })
    }
}

const EDGE_SELECT: &str = "SELECT e.from_uuid, f.label, e.rel, e.to_uuid, t.label,
            e.created_at, e.updated_at, e.valid_from, e.valid_to, e.count
     FROM edges e
     JOIN nodes f ON f.uuid = e.from_uuid
     JOIN nodes t ON t.uuid = e.to_uuid";

#[async_trait]
impl GraphStore for SqliteGraphStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert_node(&self, node: &NodeRecord) -> Result<NodeRecord> {
        let id = node.uuid.to_string();
        let node = node.clone();
        let stored = self.blocking_tx(move |tx| {
            let existing = tx
                .query_row(
                    &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE uuid = ?1"),
                    rusqlite::params![id],
                    NodeRow::read,
                )
                .optional()
                .map_err(storage_err("Failed to read node"))?
                .map(NodeRow::into_record)
                .transpose()?;

            let merged = match existing {
                Some(current) => {
                    if current.label != node.label {
                        return Err(AgoraError::Validation(format!(
                            "uuid {} already belongs to a {} node",
                            node.uuid, current.label
                        )));
                    }
                    let mut properties = current.properties;
                    properties.extend(node.properties.clone());
                    NodeRecord {
                        created_at: current.created_at,
                        updated_at: node.updated_at.max(current.created_at),
                        properties,
                        embedding: node.embedding.clone().or(current.embedding),
                        ..node.clone()
                    }
                }
                None => node.clone(),
            };

            tx.execute(
                "INSERT INTO nodes (uuid, label, name, platform, properties, embedding, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (uuid) DO UPDATE SET
                     name = excluded.name,
                     platform = excluded.platform,
                     properties = excluded.properties,
                     embedding = excluded.embedding,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    id,
                    merged.label.as_str(),
                    merged.name,
                    merged.platform.as_i32(),
                    serde_json::to_string(&merged.properties)?,
                    merged.embedding.as_deref().map(embedding_to_blob),
                    format_ts(&merged.created_at),
                    format_ts(&merged.updated_at),
                ],
            )
            .map_err(storage_err("Failed to save node"))?;
            Ok(merged)
        })
        .await?;

        debug!(label = %stored.label, uuid = %stored.uuid, "Node upserted");
        Ok(stored)
    }

    async fn fetch_node(&self, label: NodeLabel, uuid: Uuid) -> Result<Option<NodeRecord>> {
        self.blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE uuid = ?1 AND label = ?2"),
                rusqlite::params![uuid.to_string(), label.as_str()],
                NodeRow::read,
            )
            .optional()
            .map_err(storage_err("Failed to fetch node"))?
            .map(NodeRow::into_record)
            .transpose()
        })
        .await
    }

    async fn fetch_nodes(&self, label: NodeLabel, uuids: &[Uuid]) -> Result<Vec<NodeRecord>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }
        let uuids = uuids.to_vec();
        self.blocking(move |conn| {
            let placeholders = (0..uuids.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {NODE_COLUMNS} FROM nodes WHERE label = ?1 AND uuid IN ({placeholders})
                 ORDER BY created_at, uuid"
            );
            let mut params: Vec<String> = Vec::with_capacity(uuids.len() + 1);
            params.push(label.as_str().to_string());
            params.extend(uuids.iter().map(Uuid::to_string));

            let mut stmt = conn.prepare(&sql).map_err(storage_err("Failed to prepare"))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), NodeRow::read)
                .map_err(storage_err("Failed to fetch nodes"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err("Failed to read nodes"))?;
            rows.into_iter().map(NodeRow::into_record).collect()
        })
        .await
    }

    async fn list_nodes(
        &self,
        label: NodeLabel,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<NodeRecord>> {
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {NODE_COLUMNS} FROM nodes WHERE label = ?1
                     ORDER BY created_at, uuid LIMIT ?2 OFFSET ?3"
                ))
                .map_err(storage_err("Failed to prepare"))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        label.as_str(),
                        page_size as i64,
                        (page.saturating_mul(page_size)) as i64
                    ],
                    NodeRow::read,
                )
                .map_err(storage_err("Failed to list nodes"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err("Failed to read nodes"))?;
            rows.into_iter().map(NodeRow::into_record).collect()
        })
        .await
    }

    async fn delete_node(&self, label: NodeLabel, uuid: Uuid) -> Result<bool> {
        let deleted = self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM nodes WHERE uuid = ?1 AND label = ?2",
                rusqlite::params![uuid.to_string(), label.as_str()],
            )
            .map_err(storage_err("Failed to delete node"))
        })
        .await?;
        Ok(deleted > 0)
    }

    async fn merge_edge(&self, edge: &EdgeRecord) -> Result<Option<EdgeRecord>> {
        edge.definition()?;
        let edge = edge.clone();
        let from = edge.from.to_string();
        let to = edge.to.to_string();

        self.blocking_tx(move |tx| {
            let label_of = |id: &str| -> Result<Option<String>> {
                tx.query_row(
                    "SELECT label FROM nodes WHERE uuid = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err("Failed to read endpoint"))
            };
            let endpoints_ok = label_of(&from)?.as_deref() == Some(edge.from_label.as_str())
                && label_of(&to)?.as_deref() == Some(edge.to_label.as_str());
            if !endpoints_ok {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO edges (from_uuid, rel, to_uuid, created_at, updated_at, valid_from, valid_to, count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (from_uuid, rel, to_uuid) DO UPDATE SET
                     updated_at = excluded.updated_at,
                     valid_from = COALESCE(excluded.valid_from, edges.valid_from),
                     valid_to = COALESCE(excluded.valid_to, edges.valid_to),
                     count = CASE WHEN edges.count IS NULL THEN NULL ELSE edges.count + 1 END",
                rusqlite::params![
                    from,
                    edge.rel.as_str(),
                    to,
                    format_ts(&edge.created_at),
                    format_ts(&edge.updated_at),
                    edge.valid_from.as_ref().map(format_ts),
                    edge.valid_to.as_ref().map(format_ts),
                    edge.count,
                ],
            )
            .map_err(storage_err("Failed to merge edge"))?;

            let row = tx
                .query_row(
                    &format!(
                        "{EDGE_SELECT} WHERE e.from_uuid = ?1 AND e.rel = ?2 AND e.to_uuid = ?3"
                    ),
                    rusqlite::params![from, edge.rel.as_str(), to],
                    EdgeRow::read,
                )
                .map_err(storage_err("Failed to read merged edge"))?;
            row.into_record().map(Some)
        })
        .await
    }

    async fn edges_from(&self, uuid: Uuid, rel: Option<EdgeType>) -> Result<Vec<EdgeRecord>> {
        self.blocking(move |conn| {
            let rows = match rel {
                Some(rel) => {
                    let mut stmt = conn
                        .prepare(&format!(
                            "{EDGE_SELECT} WHERE e.from_uuid = ?1 AND e.rel = ?2 ORDER BY e.rel, e.to_uuid"
                        ))
                        .map_err(storage_err("Failed to prepare"))?;
                    let rows = stmt
                        .query_map(rusqlite::params![uuid.to_string(), rel.as_str()], EdgeRow::read)
                        .map_err(storage_err("Failed to query edges"))?
                        .collect::<rusqlite::Result<Vec<_>>>();
                    rows
                }
                None => {
                    let mut stmt = conn
                        .prepare(&format!(
                            "{EDGE_SELECT} WHERE e.from_uuid = ?1 ORDER BY e.rel, e.to_uuid"
                        ))
                        .map_err(storage_err("Failed to prepare"))?;
                    let rows = stmt
                        .query_map(rusqlite::params![uuid.to_string()], EdgeRow::read)
                        .map_err(storage_err("Failed to query edges"))?
                        .collect::<rusqlite::Result<Vec<_>>>();
                    rows
                }
            }
            .map_err(storage_err("Failed to read edges"))?;
            rows.into_iter().map(EdgeRow::into_record).collect()
        })
        .await
    }

    async fn initialize(&self, _embedding_dimensions: usize) -> Result<()> {
        self.blocking(move |conn| {
            migrations::run_migrations(conn)?;
            migrations::create_indexes(conn)
        })
        .await?;
        info!("SQLite graph schema initialized");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.blocking(move |conn| {
            conn.execute_batch("DELETE FROM edges; DELETE FROM nodes;")
                .map_err(storage_err("Failed to clear graph"))
        })
        .await?;
        info!("SQLite graph cleared");
        Ok(())
    }

    async fn drop_schema(&self) -> Result<Vec<String>> {
        let dropped = self.blocking(migrations::drop_indexes).await?;
        info!(count = dropped.len(), "SQLite graph indexes dropped");
        Ok(dropped)
    }

    async fn stats(&self) -> Result<GraphStats> {
        self.blocking(move |conn| {
            let mut stats = GraphStats::default();
            for (sql, target) in [
                ("SELECT label, COUNT(*) FROM nodes GROUP BY label", &mut stats.nodes),
                ("SELECT rel, COUNT(*) FROM edges GROUP BY rel", &mut stats.edges),
            ] {
                let mut stmt = conn.prepare(sql).map_err(storage_err("Failed to prepare"))?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                    .map_err(storage_err("Failed to count"))?;
                for row in rows {
                    let (key, total) = row.map_err(storage_err("Failed to read count"))?;
                    target.insert(key, total as u64);
                }
            }
            Ok(stats)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{EntityNode, MessageNode, RoomNode, UserNode};
    use crate::schema::GraphNode;
    use chrono::TimeZone;

    fn store() -> SqliteGraphStore {
        SqliteGraphStore::in_memory().unwrap()
    }

    fn user() -> UserNode {
        UserNode::new(PlatformType::Telegram, "7", "Ana")
    }

    fn room() -> RoomNode {
        RoomNode::new(PlatformType::Telegram, 100, "Rust")
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let v = vec![0.5f32, -1.25, 3.0];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&v)), v);
    }

    #[tokio::test]
    async fn test_upsert_and_fetch() {
        let store = store();
        let mut u = user();
        u.embedding = Some(vec![1.0, 0.0]);
        store.upsert_node(&u.to_record()).await.unwrap();

        let fetched = store
            .fetch_node(NodeLabel::User, u.meta.uuid)
            .await
            .unwrap()
            .unwrap();
        let back = UserNode::from_record(fetched).unwrap();
        assert_eq!(back.platform_id, "2_7");
        assert_eq!(back.embedding, Some(vec![1.0, 0.0]));

        // Wrong label yields nothing.
        assert!(store
            .fetch_node(NodeLabel::Room, u.meta.uuid)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_merges_properties_and_keeps_created_at() {
        let store = store();
        let first = NodeRecord::new(NodeLabel::Room, Uuid::new_v4(), "Rust", PlatformType::Telegram)
            .with_property("description", "systems")
            .with_property("platform_id", "2_1")
            .with_embedding(Some(vec![0.1]));
        let saved = store.upsert_node(&first).await.unwrap();

        let mut second = NodeRecord::new(NodeLabel::Room, first.uuid, "Rust Lang", PlatformType::Telegram)
            .with_property("description", "systems programming");
        second.created_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let merged = store.upsert_node(&second).await.unwrap();

        assert_eq!(merged.name, "Rust Lang");
        assert_eq!(merged.str_prop("description"), Some("systems programming"));
        assert_eq!(merged.str_prop("platform_id"), Some("2_1"));
        assert_eq!(merged.embedding, Some(vec![0.1]));
        assert_eq!(format_ts(&merged.created_at), format_ts(&saved.created_at));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.nodes_with_label(NodeLabel::Room), 1);
    }

    #[tokio::test]
    async fn test_upsert_rejects_label_change() {
        let store = store();
        let u = user();
        store.upsert_node(&u.to_record()).await.unwrap();
        let mut clash = room().to_record();
        clash.uuid = u.meta.uuid;
        assert!(matches!(
            store.upsert_node(&clash).await,
            Err(AgoraError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_many_and_list_pages() {
        let store = store();
        let entities: Vec<EntityNode> = (0..5)
            .map(|i| EntityNode::new("hashtag", &format!("#tag{i}")))
            .collect();
        for e in &entities {
            store.upsert_node(&e.to_record()).await.unwrap();
        }

        let wanted = [entities[1].meta.uuid, entities[3].meta.uuid, Uuid::new_v4()];
        let fetched = store.fetch_nodes(NodeLabel::Entity, &wanted).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(store.fetch_nodes(NodeLabel::Entity, &[]).await.unwrap().is_empty());

        let page0 = store.list_nodes(NodeLabel::Entity, 0, 2).await.unwrap();
        let page2 = store.list_nodes(NodeLabel::Entity, 2, 2).await.unwrap();
        assert_eq!(page0.len(), 2);
        assert_eq!(page2.len(), 1);
    }

    #[tokio::test]
    async fn test_counted_edge_increments() {
        let store = store();
        let (u, r) = (user(), room());
        store.upsert_node(&u.to_record()).await.unwrap();
        store.upsert_node(&r.to_record()).await.unwrap();

        let edge = EdgeRecord::new(
            NodeLabel::User,
            u.meta.uuid,
            EdgeType::PostedIn,
            NodeLabel::Room,
            r.meta.uuid,
        )
        .unwrap();
        let first = store.merge_edge(&edge).await.unwrap().unwrap();
        assert_eq!(first.count, Some(1));
        store.merge_edge(&edge).await.unwrap();
        let third = store.merge_edge(&edge).await.unwrap().unwrap();
        assert_eq!(third.count, Some(3));
        assert_eq!(format_ts(&third.created_at), format_ts(&first.created_at));
    }

    #[tokio::test]
    async fn test_edge_with_missing_endpoint_is_skipped() {
        let store = store();
        let u = user();
        store.upsert_node(&u.to_record()).await.unwrap();
        let edge = EdgeRecord::new(
            NodeLabel::User,
            u.meta.uuid,
            EdgeType::ParticipatesIn,
            NodeLabel::Room,
            Uuid::new_v4(),
        )
        .unwrap();
        assert!(store.merge_edge(&edge).await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().total_edges(), 0);
    }

    #[tokio::test]
    async fn test_validity_is_kept_on_match() {
        let store = store();
        let (u, r) = (user(), room());
        store.upsert_node(&u.to_record()).await.unwrap();
        store.upsert_node(&r.to_record()).await.unwrap();

        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let edge = EdgeRecord::new(
            NodeLabel::User,
            u.meta.uuid,
            EdgeType::BelongsTo,
            NodeLabel::Room,
            r.meta.uuid,
        )
        .unwrap();
        store
            .merge_edge(&edge.clone().with_validity(Some(since), None))
            .await
            .unwrap();
        let merged = store.merge_edge(&edge).await.unwrap().unwrap();
        assert_eq!(merged.valid_from, Some(since));
        assert_eq!(merged.count, None);
    }

    #[tokio::test]
    async fn test_delete_detaches_edges() {
        let store = store();
        let (u, r) = (user(), room());
        let sent = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let m = MessageNode::new(PlatformType::Telegram, 100, 1, "hi", sent);
        for record in [u.to_record(), r.to_record(), m.to_record()] {
            store.upsert_node(&record).await.unwrap();
        }
        for edge in [
            EdgeRecord::new(NodeLabel::User, u.meta.uuid, EdgeType::Posts, NodeLabel::Message, m.meta.uuid),
            EdgeRecord::new(NodeLabel::Message, m.meta.uuid, EdgeType::PostedIn, NodeLabel::Room, r.meta.uuid),
        ] {
            store.merge_edge(&edge.unwrap()).await.unwrap().unwrap();
        }
        assert_eq!(store.edges_from(u.meta.uuid, None).await.unwrap().len(), 1);

        assert!(store.delete_node(NodeLabel::Message, m.meta.uuid).await.unwrap());
        assert!(!store.delete_node(NodeLabel::Message, m.meta.uuid).await.unwrap());
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_edges(), 0);
        assert_eq!(stats.total_nodes(), 2);
    }

    #[tokio::test]
    async fn test_edges_from_filter() {
        let store = store();
        let (u, r) = (user(), room());
        store.upsert_node(&u.to_record()).await.unwrap();
        store.upsert_node(&r.to_record()).await.unwrap();
        for rel in [EdgeType::ParticipatesIn, EdgeType::BelongsTo] {
            let edge =
                EdgeRecord::new(NodeLabel::User, u.meta.uuid, rel, NodeLabel::Room, r.meta.uuid)
                    .unwrap();
            store.merge_edge(&edge).await.unwrap();
        }
        let all = store.edges_from(u.meta.uuid, None).await.unwrap();
        assert_eq!(all.len(), 2);
        let only = store
            .edges_from(u.meta.uuid, Some(EdgeType::ParticipatesIn))
            .await
            .unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].to_label, NodeLabel::Room);
    }

    #[tokio::test]
    async fn test_clear_and_schema_cycle() {
        let store = store();
        store.upsert_node(&user().to_record()).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.stats().await.unwrap().total_nodes(), 0);

        let dropped = store.drop_schema().await.unwrap();
        assert!(!dropped.is_empty());
        assert!(store.drop_schema().await.unwrap().is_empty());
        store.initialize(768).await.unwrap();
        assert_eq!(store.drop_schema().await.unwrap().len(), dropped.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_upserts_share_one_connection() {
        let store = Arc::new(store());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let u = UserNode::new(PlatformType::Discord, &i.to_string(), "member");
                store.upsert_node(&u.to_record()).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.nodes_with_label(NodeLabel::User), 16);
    }
}
