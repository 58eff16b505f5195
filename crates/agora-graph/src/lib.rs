//! Agora Graph crate - the personal knowledge graph.
//!
//! Provides typed nodes, a registry of allowed edges, Cypher generation,
//! and the [`GraphStore`] abstraction with an embedded SQLite backend and
//! an optional Neo4j backend (feature `neo4j`). [`KnowledgeGraph`] wraps a
//! store with bounded concurrency.

pub mod cypher;
pub mod db;
pub mod edges;
pub mod graph;
pub mod migrations;
#[cfg(feature = "neo4j")]
pub mod neo4j;
pub mod nodes;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use db::Database;
pub use edges::{edge_definition, EdgeDefinition, EdgeRecord, EdgeType, EDGE_DEFINITIONS};
pub use graph::{GraphOp, GraphOpOutcome, KnowledgeGraph};
pub use nodes::{
    ClusterNode, CommunityNode, EntityNode, MessageNode, NodeMeta, PreferenceNode, RoomNode,
    TopicNode, UserNode,
};
pub use schema::{GraphNode, NodeLabel, NodeRecord};
pub use sqlite::SqliteGraphStore;
pub use store::{GraphStats, GraphStore};
