//! The knowledge graph handle used by the rest of the system.
//!
//! [`KnowledgeGraph`] owns a [`GraphStore`] and bounds the number of
//! operations in flight with a semaphore. Both the store and the semaphore
//! can be swapped at runtime when settings change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_core::config::{GraphBackend, GraphConfig};
use agora_core::error::{AgoraError, Result};

use crate::edges::{EdgeRecord, EdgeType};
use crate::schema::{GraphNode, NodeLabel, NodeRecord};
use crate::sqlite::SqliteGraphStore;
use crate::store::{GraphStats, GraphStore};

/// File name of the embedded store inside the data directory.
pub const GRAPH_DB_FILE: &str = "graph.db";

/// A single write in a batch.
#[derive(Debug, Clone)]
pub enum GraphOp {
    Upsert(NodeRecord),
    Connect(EdgeRecord),
    Delete { label: NodeLabel, uuid: Uuid },
}

#[derive(Debug, Clone)]
pub enum GraphOpOutcome {
    Node(NodeRecord),
    /// `None` when an endpoint was missing.
    Edge(Option<EdgeRecord>),
    Deleted(bool),
}

async fn apply(store: &dyn GraphStore, op: GraphOp) -> Result<GraphOpOutcome> {
    match op {
        GraphOp::Upsert(node) => store.upsert_node(&node).await.map(GraphOpOutcome::Node),
        GraphOp::Connect(edge) => store.merge_edge(&edge).await.map(GraphOpOutcome::Edge),
        GraphOp::Delete { label, uuid } => {
            store.delete_node(label, uuid).await.map(GraphOpOutcome::Deleted)
        }
    }
}

/// Open the store selected by `config`. Without a data directory the
/// embedded backend runs in memory.
pub async fn open_store(
    config: &GraphConfig,
    data_dir: Option<&Path>,
) -> Result<Arc<dyn GraphStore>> {
    match config.backend {
        GraphBackend::Sqlite => {
            let store = match data_dir {
                Some(dir) => SqliteGraphStore::open(&dir.join(GRAPH_DB_FILE))?,
                None => SqliteGraphStore::in_memory()?,
            };
            Ok(Arc::new(store))
        }
        #[cfg(feature = "neo4j")]
        GraphBackend::Neo4j => Ok(Arc::new(crate::neo4j::Neo4jGraphStore::connect(config).await?)),
        #[cfg(not(feature = "neo4j"))]
        GraphBackend::Neo4j => Err(AgoraError::Config(
            "Neo4j backend requested but agora-graph was built without the `neo4j` feature"
                .to_string(),
        )),
    }
}

pub struct KnowledgeGraph {
    store: RwLock<Arc<dyn GraphStore>>,
    semaphore: RwLock<Arc<Semaphore>>,
    config: RwLock<GraphConfig>,
    data_dir: Option<PathBuf>,
}

impl KnowledgeGraph {
    pub async fn open(config: GraphConfig, data_dir: Option<PathBuf>) -> Result<Self> {
        let store = open_store(&config, data_dir.as_deref()).await?;
        info!(backend = store.backend(), "Knowledge graph opened");
        Ok(Self::with_store(store, config, data_dir))
    }

    pub fn with_store(
        store: Arc<dyn GraphStore>,
        config: GraphConfig,
        data_dir: Option<PathBuf>,
    ) -> Self {
        let permits = config.semaphore_limit.max(1);
        Self {
            store: RwLock::new(store),
            semaphore: RwLock::new(Arc::new(Semaphore::new(permits))),
            config: RwLock::new(config),
            data_dir,
        }
    }

    /// In-memory embedded graph with default settings.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::with_store(
            Arc::new(SqliteGraphStore::in_memory()?),
            GraphConfig::default(),
            None,
        ))
    }

    async fn store(&self) -> Arc<dyn GraphStore> {
        self.store.read().await.clone()
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit> {
        let semaphore = self.semaphore.read().await.clone();
        semaphore
            .acquire_owned()
            .await
            .map_err(|e| AgoraError::Graph(format!("Graph semaphore closed: {e}")))
    }

    pub async fn backend(&self) -> &'static str {
        self.store().await.backend()
    }

    pub async fn config(&self) -> GraphConfig {
        self.config.read().await.clone()
    }

    pub async fn available_permits(&self) -> usize {
        self.semaphore.read().await.available_permits()
    }

    // -------------------------------------------------------------------------
    // Typed node operations
    // -------------------------------------------------------------------------

    /// Create or merge a node and return the stored state.
    pub async fn save<N: GraphNode>(&self, node: &N) -> Result<N> {
        let _permit = self.permit().await?;
        let stored = self.store().await.upsert_node(&node.to_record()).await?;
        N::from_record(stored)
    }

    pub async fn get<N: GraphNode>(&self, uuid: Uuid) -> Result<Option<N>> {
        let _permit = self.permit().await?;
        self.store()
            .await
            .fetch_node(N::LABEL, uuid)
            .await?
            .map(N::from_record)
            .transpose()
    }

    pub async fn get_many<N: GraphNode>(&self, uuids: &[Uuid]) -> Result<Vec<N>> {
        let _permit = self.permit().await?;
        self.store()
            .await
            .fetch_nodes(N::LABEL, uuids)
            .await?
            .into_iter()
            .map(N::from_record)
            .collect()
    }

    /// One page of nodes, `page_limit` per page.
    pub async fn list<N: GraphNode>(&self, page: usize) -> Result<Vec<N>> {
        let page_size = self.config.read().await.page_limit;
        let _permit = self.permit().await?;
        self.store()
            .await
            .list_nodes(N::LABEL, page, page_size)
            .await?
            .into_iter()
            .map(N::from_record)
            .collect()
    }

    pub async fn delete<N: GraphNode>(&self, uuid: Uuid) -> Result<bool> {
        let _permit = self.permit().await?;
        let deleted = self.store().await.delete_node(N::LABEL, uuid).await?;
        debug!(label = %N::LABEL, %uuid, deleted, "Delete node");
        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------------

    pub async fn connect<F: GraphNode, T: GraphNode>(
        &self,
        from: &F,
        rel: EdgeType,
        to: &T,
    ) -> Result<Option<EdgeRecord>> {
        self.connect_during(from, rel, to, None, None).await
    }

    /// Connect with a validity window.
    pub async fn connect_during<F: GraphNode, T: GraphNode>(
        &self,
        from: &F,
        rel: EdgeType,
        to: &T,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Result<Option<EdgeRecord>> {
        let edge = EdgeRecord::new(F::LABEL, from.uuid(), rel, T::LABEL, to.uuid())?
            .with_validity(valid_from, valid_to);
        let _permit = self.permit().await?;
        let merged = self.store().await.merge_edge(&edge).await?;
        if merged.is_none() {
            warn!(from = %edge.from, %rel, to = %edge.to, "Edge endpoint missing");
        }
        Ok(merged)
    }

    pub async fn edges_from(&self, uuid: Uuid, rel: Option<EdgeType>) -> Result<Vec<EdgeRecord>> {
        let _permit = self.permit().await?;
        self.store().await.edges_from(uuid, rel).await
    }

    // -------------------------------------------------------------------------
    // Batches
    // -------------------------------------------------------------------------

    /// Run a batch of writes. Sequential batches hold one permit and run in
    /// order; otherwise every op takes its own permit and runs concurrently.
    /// Outcomes are returned in input order; the first failure is returned.
    pub async fn run_batch(&self, ops: Vec<GraphOp>, sequential: bool) -> Result<Vec<GraphOpOutcome>> {
        let store = self.store().await;
        let total = ops.len();

        if sequential {
            let _permit = self.permit().await?;
            let mut outcomes = Vec::with_capacity(total);
            for op in ops {
                outcomes.push(apply(store.as_ref(), op).await?);
            }
            return Ok(outcomes);
        }

        let semaphore = self.semaphore.read().await.clone();
        let mut tasks = JoinSet::new();
        for (index, op) in ops.into_iter().enumerate() {
            let store = store.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AgoraError::Graph(format!("Graph semaphore closed: {e}")))?;
                apply(store.as_ref(), op).await.map(|outcome| (index, outcome))
            });
        }

        let mut slots: Vec<Option<GraphOpOutcome>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) =
                joined.map_err(|e| AgoraError::Graph(format!("Graph task failed: {e}")))??;
            slots[index] = Some(outcome);
        }
        debug!(total, "Batch finished");
        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| AgoraError::Graph("Batch op produced no outcome".into())))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Schema & maintenance
    // -------------------------------------------------------------------------

    pub async fn initialize(&self) -> Result<()> {
        let dimensions = self.config.read().await.embedding_dimensions;
        let _permit = self.permit().await?;
        self.store().await.initialize(dimensions).await
    }

    pub async fn clear(&self) -> Result<()> {
        let _permit = self.permit().await?;
        self.store().await.clear().await
    }

    pub async fn drop_schema(&self) -> Result<Vec<String>> {
        let _permit = self.permit().await?;
        self.store().await.drop_schema().await
    }

    pub async fn stats(&self) -> Result<GraphStats> {
        let _permit = self.permit().await?;
        self.store().await.stats().await
    }

    // -------------------------------------------------------------------------
    // Runtime reconfiguration
    // -------------------------------------------------------------------------

    /// Change concurrency and paging. The semaphore is only rebuilt when the
    /// limit changes; returns whether it was.
    pub async fn update_config(&self, semaphore_limit: usize, page_limit: usize) -> Result<bool> {
        if semaphore_limit == 0 || page_limit == 0 {
            return Err(AgoraError::Validation(
                "semaphore_limit and page_limit must be positive".to_string(),
            ));
        }
        let mut config = self.config.write().await;
        config.page_limit = page_limit;
        if config.semaphore_limit == semaphore_limit {
            return Ok(false);
        }
        config.semaphore_limit = semaphore_limit;
        *self.semaphore.write().await = Arc::new(Semaphore::new(semaphore_limit));
        info!(semaphore_limit, "Graph semaphore rebuilt");
        Ok(true)
    }

    /// Apply new settings, reconnecting only when connection details changed.
    /// Returns whether a new store was opened.
    pub async fn update_settings(&self, settings: GraphConfig) -> Result<bool> {
        if settings.semaphore_limit == 0 || settings.page_limit == 0 {
            return Err(AgoraError::Validation(
                "semaphore_limit and page_limit must be positive".to_string(),
            ));
        }
        let current = self.config().await;
        let reconnect = current.connection_changed(&settings);
        if reconnect {
            let store = open_store(&settings, self.data_dir.as_deref()).await?;
            info!(backend = store.backend(), uri = %settings.uri(), "Graph store reconnected");
            *self.store.write().await = store;
        }

        self.update_config(settings.semaphore_limit, settings.page_limit)
            .await?;
        let mut config = self.config.write().await;
        *config = settings;
        Ok(reconnect)
    }
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}
