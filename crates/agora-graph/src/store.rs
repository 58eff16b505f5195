use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use agora_core::error::Result;

use crate::edges::{EdgeRecord, EdgeType};
use crate::schema::{NodeLabel, NodeRecord};

/// Node and edge counts, keyed by label / relationship type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub nodes: BTreeMap<String, u64>,
    pub edges: BTreeMap<String, u64>,
}

impl GraphStats {
    pub fn total_nodes(&self) -> u64 {
        self.nodes.values().sum()
    }

    pub fn total_edges(&self) -> u64 {
        self.edges.values().sum()
    }

    pub fn nodes_with_label(&self, label: NodeLabel) -> u64 {
        self.nodes.get(label.as_str()).copied().unwrap_or(0)
    }
}

/// Persistence backend for the knowledge graph.
///
/// Node writes are merges: existing properties are kept unless overwritten,
/// and `created_at` is never changed after the first write.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Create or merge a node, returning the stored state.
    async fn upsert_node(&self, node: &NodeRecord) -> Result<NodeRecord>;

    async fn fetch_node(&self, label: NodeLabel, uuid: Uuid) -> Result<Option<NodeRecord>>;

    /// Fetch the nodes that exist among `uuids`. Missing ids are skipped.
    async fn fetch_nodes(&self, label: NodeLabel, uuids: &[Uuid]) -> Result<Vec<NodeRecord>>;

    /// Page through nodes of a label, oldest first. `page` is zero-based.
    async fn list_nodes(
        &self,
        label: NodeLabel,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<NodeRecord>>;

    /// Delete a node and every relationship touching it.
    async fn delete_node(&self, label: NodeLabel, uuid: Uuid) -> Result<bool>;

    /// Merge a relationship. Returns `None` when either endpoint is missing.
    async fn merge_edge(&self, edge: &EdgeRecord) -> Result<Option<EdgeRecord>>;

    /// Outgoing relationships of a node, optionally restricted to one type.
    async fn edges_from(&self, uuid: Uuid, rel: Option<EdgeType>) -> Result<Vec<EdgeRecord>>;

    /// Create constraints and indexes.
    async fn initialize(&self, embedding_dimensions: usize) -> Result<()>;

    /// Delete all nodes and relationships, keeping the schema.
    async fn clear(&self) -> Result<()>;

    /// Drop constraints and indexes, returning their names.
    async fn drop_schema(&self) -> Result<Vec<String>>;

    async fn stats(&self) -> Result<GraphStats>;
}
