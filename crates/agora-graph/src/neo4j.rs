//! Neo4j backend over Bolt.
//!
//! Node properties are written flat: nested JSON objects become JSON strings
//! since Neo4j properties cannot hold maps.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, BoltNull, BoltType, ConfigBuilder, Graph, Query, Row};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use agora_core::config::GraphConfig;
use agora_core::error::{AgoraError, Result};

use crate::cypher;
use crate::edges::{EdgeRecord, EdgeType};
use crate::schema::{NodeLabel, NodeRecord};
use crate::store::{GraphStats, GraphStore};

pub struct Neo4jGraphStore {
    graph: Graph,
}

fn graph_err(context: &str) -> impl Fn(neo4rs::Error) -> AgoraError + '_ {
    move |e| AgoraError::Graph(format!("{context}: {e}"))
}

fn row_err(e: impl std::fmt::Display) -> AgoraError {
    AgoraError::Graph(format!("Unexpected row shape: {e}"))
}

/// Convert a JSON value into a Bolt parameter.
pub(crate) fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => BoltType::from(s.clone()),
        Value::Array(items) => {
            BoltType::from(items.iter().map(json_to_bolt).collect::<Vec<BoltType>>())
        }
        Value::Object(_) => BoltType::from(value.to_string()),
    }
}

fn props_param(props: &Map<String, Value>) -> HashMap<String, BoltType> {
    props
        .iter()
        .map(|(k, v)| (k.clone(), json_to_bolt(v)))
        .collect()
}

fn opt_ts(ts: Option<DateTime<Utc>>) -> BoltType {
    match ts {
        Some(ts) => BoltType::from(ts.to_rfc3339()),
        None => BoltType::Null(BoltNull),
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AgoraError::Graph(format!("Invalid timestamp '{s}': {e}")))
}

fn node_from_row(label: NodeLabel, row: &Row) -> Result<NodeRecord> {
    let props: Map<String, Value> = row.get("props").map_err(row_err)?;
    let embedding: Option<Vec<f64>> = row.get("embedding").map_err(row_err)?;
    NodeRecord::from_flat_properties(
        label,
        props,
        embedding.map(|v| v.into_iter().map(|x| x as f32).collect()),
    )
}

impl Neo4jGraphStore {
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let neo_config = ConfigBuilder::default()
            .uri(config.uri())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .max_connections(config.semaphore_limit.max(1))
            .build()
            .map_err(graph_err("Invalid Neo4j configuration"))?;
        let graph = Graph::connect(neo_config)
            .await
            .map_err(graph_err("Failed to connect to Neo4j"))?;
        info!(uri = %config.uri(), database = %config.database, "Connected to Neo4j");
        Ok(Self { graph })
    }

    async fn rows(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.graph.execute(q).await.map_err(graph_err("Query failed"))?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(graph_err("Query failed"))? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn names(&self, cypher: &str) -> Result<Vec<String>> {
        self.rows(query(cypher))
            .await?
            .iter()
            .map(|row| row.get::<String>("name").map_err(row_err))
            .collect()
    }

    async fn counts(&self, cypher: &str) -> Result<std::collections::BTreeMap<String, u64>> {
        let mut counts = std::collections::BTreeMap::new();
        for row in self.rows(query(cypher)).await? {
            let key: Option<String> = row.get("key").map_err(row_err)?;
            let total: i64 = row.get("total").map_err(row_err)?;
            if let Some(key) = key {
                *counts.entry(key).or_insert(0) += total as u64;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn backend(&self) -> &'static str {
        "neo4j"
    }

    async fn upsert_node(&self, node: &NodeRecord) -> Result<NodeRecord> {
        let mut props = node.flat_properties();
        props.remove("created_at");
        let with_embedding = node.label.has_embedding() && node.embedding.is_some();

        let mut q = query(&cypher::upsert_node(node.label, with_embedding))
            .param("uuid", node.uuid.to_string())
            .param("props", props_param(&props))
            .param("created_at", node.created_at.to_rfc3339());
        if let Some(embedding) = node.embedding.as_ref().filter(|_| with_embedding) {
            q = q.param(
                "embedding",
                embedding.iter().map(|&v| v as f64).collect::<Vec<f64>>(),
            );
        }

        let rows = self.rows(q).await?;
        let row = rows
            .first()
            .ok_or_else(|| AgoraError::Graph(format!("Upsert of {} returned nothing", node.uuid)))?;
        node_from_row(node.label, row)
    }

    async fn fetch_node(&self, label: NodeLabel, uuid: Uuid) -> Result<Option<NodeRecord>> {
        let q = query(&cypher::fetch_node(label)).param("uuid", uuid.to_string());
        self.rows(q)
            .await?
            .first()
            .map(|row| node_from_row(label, row))
            .transpose()
    }

    async fn fetch_nodes(&self, label: NodeLabel, uuids: &[Uuid]) -> Result<Vec<NodeRecord>> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = uuids.iter().map(Uuid::to_string).collect();
        let q = query(&cypher::fetch_nodes(label)).param("uuids", ids);
        self.rows(q)
            .await?
            .iter()
            .map(|row| node_from_row(label, row))
            .collect()
    }

    async fn list_nodes(
        &self,
        label: NodeLabel,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<NodeRecord>> {
        let q = query(&cypher::list_nodes(label))
            .param("skip", page.saturating_mul(page_size) as i64)
            .param("limit", page_size as i64);
        self.rows(q)
            .await?
            .iter()
            .map(|row| node_from_row(label, row))
            .collect()
    }

    async fn delete_node(&self, label: NodeLabel, uuid: Uuid) -> Result<bool> {
        let q = query(&cypher::delete_node(label)).param("uuid", uuid.to_string());
        let rows = self.rows(q).await?;
        let deleted = match rows.first() {
            Some(row) => row.get::<i64>("deleted").map_err(row_err)?,
            None => 0,
        };
        Ok(deleted > 0)
    }

    async fn merge_edge(&self, edge: &EdgeRecord) -> Result<Option<EdgeRecord>> {
        let definition = edge.definition()?;
        let q = query(&cypher::merge_edge(definition))
            .param("from_uuid", edge.from.to_string())
            .param("to_uuid", edge.to.to_string())
            .param("created_at", edge.created_at.to_rfc3339())
            .param("updated_at", edge.updated_at.to_rfc3339())
            .param("valid_from", opt_ts(edge.valid_from))
            .param("valid_to", opt_ts(edge.valid_to));

        let rows = self.rows(q).await?;
        let Some(row) = rows.first() else {
            warn!(
                from = %edge.from,
                rel = %edge.rel,
                to = %edge.to,
                "Edge endpoints missing, relationship not created"
            );
            return Ok(None);
        };
        Ok(Some(edge_from_row(edge.from, edge.from_label, edge.rel, edge.to, edge.to_label, row)?))
    }

    async fn edges_from(&self, uuid: Uuid, rel: Option<EdgeType>) -> Result<Vec<EdgeRecord>> {
        let q = query(&cypher::edges_from(rel)).param("uuid", uuid.to_string());
        let mut edges = Vec::new();
        for row in self.rows(q).await? {
            let from_label: NodeLabel = row.get::<String>("from_label").map_err(row_err)?.parse()?;
            let rel: EdgeType = row.get::<String>("rel").map_err(row_err)?.parse()?;
            let to_label: NodeLabel = row.get::<String>("to_label").map_err(row_err)?.parse()?;
            let to = Uuid::parse_str(&row.get::<String>("to_uuid").map_err(row_err)?)
                .map_err(row_err)?;
            edges.push(edge_from_row(uuid, from_label, rel, to, to_label, &row)?);
        }
        Ok(edges)
    }

    async fn initialize(&self, embedding_dimensions: usize) -> Result<()> {
        for statement in cypher::init_statements(embedding_dimensions) {
            self.graph
                .run(query(&statement))
                .await
                .map_err(graph_err("Schema statement failed"))?;
        }
        info!(embedding_dimensions, "Neo4j schema initialized");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.graph
            .run(query(cypher::CLEAR_GRAPH))
            .await
            .map_err(graph_err("Failed to clear graph"))?;
        info!("Neo4j graph cleared");
        Ok(())
    }

    async fn drop_schema(&self) -> Result<Vec<String>> {
        let mut dropped = Vec::new();
        for name in self.names(cypher::SHOW_CONSTRAINTS).await? {
            self.graph
                .run(query(&cypher::drop_constraint(&name)))
                .await
                .map_err(graph_err("Failed to drop constraint"))?;
            dropped.push(name);
        }
        // Constraint-backed indexes are gone by now.
        for name in self.names(cypher::SHOW_INDEXES).await? {
            self.graph
                .run(query(&cypher::drop_index(&name)))
                .await
                .map_err(graph_err("Failed to drop index"))?;
            dropped.push(name);
        }
        info!(count = dropped.len(), "Neo4j constraints and indexes dropped");
        Ok(dropped)
    }

    async fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            nodes: self.counts(cypher::NODE_COUNTS).await?,
            edges: self.counts(cypher::EDGE_COUNTS).await?,
        })
    }
}

fn edge_from_row(
    from: Uuid,
    from_label: NodeLabel,
    rel: EdgeType,
    to: Uuid,
    to_label: NodeLabel,
    row: &Row,
) -> Result<EdgeRecord> {
    let ts = |key: &str| -> Result<Option<DateTime<Utc>>> {
        row.get::<Option<String>>(key)
            .map_err(row_err)?
            .as_deref()
            .map(parse_ts)
            .transpose()
    };
    let now = Utc::now();
    Ok(EdgeRecord {
        from,
        from_label,
        rel,
        to,
        to_label,
        created_at: ts("created_at")?.unwrap_or(now),
        updated_at: ts("updated_at")?.unwrap_or(now),
        valid_from: ts("valid_from")?,
        valid_to: ts("valid_to")?,
        count: row.get::<Option<i64>>("count").map_err(row_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars_convert() {
        assert!(matches!(json_to_bolt(&json!(null)), BoltType::Null(_)));
        assert!(matches!(json_to_bolt(&json!(true)), BoltType::Boolean(_)));
        assert!(matches!(json_to_bolt(&json!(3)), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(&json!(0.5)), BoltType::Float(_)));
        assert!(matches!(json_to_bolt(&json!("x")), BoltType::String(_)));
    }

    #[test]
    fn test_nested_objects_become_strings() {
        assert!(matches!(json_to_bolt(&json!({"a": 1})), BoltType::String(_)));
        assert!(matches!(json_to_bolt(&json!([1, 2])), BoltType::List(_)));
    }

    #[test]
    fn test_props_param_keeps_keys() {
        let mut props = Map::new();
        props.insert("name".into(), json!("Rust"));
        props.insert("platform".into(), json!(2));
        let param = props_param(&props);
        assert_eq!(param.len(), 2);
        assert!(param.contains_key("platform"));
    }
}
