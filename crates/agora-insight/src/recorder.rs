//! Writes chat exports and digests into the knowledge graph.
//!
//! Every write is planned first: nodes are de-duplicated by uuid and
//! uncounted edges by `(from, rel, to)`. Nodes then go in as one concurrent
//! batch, followed by the edges, so no edge is merged before its endpoints.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use agora_core::{global_message_id, ChatExport, ChatMessage};
use agora_graph::{
    ClusterNode, CommunityNode, EdgeRecord, EdgeType, EntityNode, GraphNode, GraphOp,
    GraphOpOutcome, KnowledgeGraph, MessageNode, NodeLabel, NodeRecord, PreferenceNode, RoomNode,
    TopicNode, UserNode,
};

use crate::entity::EntityExtractor;
use crate::error::Result;
use crate::preference::PreferenceExtractor;
use crate::types::{Digest, MessageCluster};

/// What a recording wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub nodes: usize,
    pub edges: usize,
    /// Edges skipped because an endpoint is not in the graph.
    pub skipped_edges: usize,
}

#[derive(Default)]
struct Plan {
    node_ids: HashSet<Uuid>,
    nodes: Vec<NodeRecord>,
    edge_keys: HashSet<(Uuid, EdgeType, Uuid)>,
    edges: Vec<EdgeRecord>,
}

impl Plan {
    fn node<N: GraphNode>(&mut self, node: &N) {
        if self.node_ids.insert(node.uuid()) {
            self.nodes.push(node.to_record());
        }
    }

    fn link(
        &mut self,
        from_label: NodeLabel,
        from: Uuid,
        rel: EdgeType,
        to_label: NodeLabel,
        to: Uuid,
    ) -> Result<()> {
        let edge = EdgeRecord::new(from_label, from, rel, to_label, to)?;
        // Counted edges are merged once per occurrence.
        if edge.count.is_some() || self.edge_keys.insert((from, rel, to)) {
            self.edges.push(edge);
        }
        Ok(())
    }

    fn edge<F: GraphNode, T: GraphNode>(&mut self, from: &F, rel: EdgeType, to: &T) -> Result<()> {
        self.link(F::LABEL, from.uuid(), rel, T::LABEL, to.uuid())
    }
}

pub struct GraphRecorder {
    graph: Arc<KnowledgeGraph>,
    host_user_id: Option<String>,
    entities: EntityExtractor,
    preferences: PreferenceExtractor,
}

impl GraphRecorder {
    pub fn new(graph: Arc<KnowledgeGraph>) -> Self {
        Self {
            graph,
            host_user_id: None,
            entities: EntityExtractor::new(),
            preferences: PreferenceExtractor::new(),
        }
    }

    /// Treat messages from this platform user id as the host user's.
    pub fn with_host_user(mut self, host_user_id: Option<String>) -> Self {
        self.host_user_id = host_user_id.filter(|id| !id.is_empty());
        self
    }

    pub fn graph(&self) -> &Arc<KnowledgeGraph> {
        &self.graph
    }

    fn is_host(&self, message: &ChatMessage) -> bool {
        message.is_self
            || matches!(
                (&self.host_user_id, message.sender_key()),
                (Some(host), Some(key)) if host == key
            )
    }

    fn user_of(export: &ChatExport, message: &ChatMessage) -> Option<UserNode> {
        let key = message.sender_key()?;
        let name = message
            .first_name
            .as_deref()
            .or(message.username.as_deref())
            .unwrap_or(key);
        Some(UserNode::new(export.platform, key, name))
    }

    fn room_of(export: &ChatExport) -> RoomNode {
        let mut room = RoomNode::new(export.platform, export.chat_id, export.title.clone());
        room.description = export.description.clone().unwrap_or_default();
        room
    }

    fn message_node(export: &ChatExport, message: &ChatMessage) -> MessageNode {
        let mut node = MessageNode::new(
            export.platform,
            export.chat_id,
            message.message_id,
            message.message.clone(),
            message.timestamp,
        );
        node.engagement = message.engagement_score();
        node
    }

    /// Record rooms, users, messages, entities and host-user preferences.
    pub async fn record_export(&self, export: &ChatExport) -> Result<RecordSummary> {
        let mut plan = Plan::default();
        let room = Self::room_of(export);
        plan.node(&room);

        let community = export.community.as_ref().map(|c| {
            let mut node = CommunityNode::new(export.platform, &c.id, c.name.clone());
            node.description = c.description.clone().unwrap_or_default();
            node
        });
        if let Some(community) = &community {
            plan.node(community);
            plan.edge(&room, EdgeType::BelongsTo, community)?;
        }

        for message in &export.messages {
            let node = Self::message_node(export, message);
            plan.node(&node);
            plan.edge(&node, EdgeType::PostedIn, &room)?;

            let user = Self::user_of(export, message);
            if let Some(user) = &user {
                plan.node(user);
                plan.edge(user, EdgeType::Posts, &node)?;
                plan.edge(user, EdgeType::ParticipatesIn, &room)?;
                plan.edge(user, EdgeType::PostedIn, &room)?;
                if let Some(community) = &community {
                    plan.edge(user, EdgeType::BelongsTo, community)?;
                }
            }

            let entities: Vec<EntityNode> = self
                .entities
                .extract(&message.message)
                .iter()
                .map(|e| EntityNode::new(e.kind.as_str(), &e.value))
                .collect();
            for (i, entity) in entities.iter().enumerate() {
                plan.node(entity);
                plan.edge(&node, EdgeType::Mentions, entity)?;
                for other in &entities[i + 1..] {
                    plan.edge(entity, EdgeType::RelatedTo, other)?;
                }
            }

            let Some(user) = user.filter(|_| self.is_host(message)) else {
                continue;
            };
            for preference in self.preferences.extract(&message.message) {
                let pref = PreferenceNode::new(user.uuid(), preference.polarity.as_str(), &preference.value);
                plan.node(&pref);
                plan.edge(&user, EdgeType::HasPreference, &pref)?;
                match entities
                    .iter()
                    .find(|e| e.meta.name.eq_ignore_ascii_case(&preference.value))
                {
                    Some(entity) => plan.edge(&pref, EdgeType::For, entity)?,
                    None => {
                        let topic = TopicNode::new(&preference.value);
                        plan.node(&topic);
                        plan.edge(&pref, EdgeType::For, &topic)?;
                    }
                }
            }
        }

        let summary = self.apply(plan).await?;
        info!(
            chat_id = export.chat_id,
            messages = export.messages.len(),
            nodes = summary.nodes,
            edges = summary.edges,
            "Export recorded"
        );
        Ok(summary)
    }

    /// Record the clusters and topics of a digest for `export`.
    pub async fn record_digest(&self, export: &ChatExport, digest: &Digest) -> Result<RecordSummary> {
        let mut plan = Plan::default();
        let room = Self::room_of(export);
        plan.node(&room);

        let by_id: HashMap<i64, &ChatMessage> =
            export.messages.iter().map(|m| (m.message_id, m)).collect();

        let mut cluster_nodes: Vec<(ClusterNode, &MessageCluster)> = Vec::new();
        for cluster in &digest.clusters {
            let member_ids: HashSet<String> = cluster
                .members
                .iter()
                .map(|m| m.message.message_id.to_string())
                .collect();
            let topic = digest
                .summary
                .topics
                .iter()
                .find(|t| t.message_ids.iter().any(|id| member_ids.contains(id)));

            let name = topic.map_or_else(|| format!("Cluster {}", cluster.id), |t| t.topic_name.clone());
            let mut node = ClusterNode::new(export.platform, export.chat_id, cluster.id, name);
            node.description = topic.map(|t| t.summary.clone()).unwrap_or_default();
            node.embedding = cluster.centroid();
            plan.node(&node);
            plan.edge(&node, EdgeType::RelatedTo, &room)?;

            for member in &cluster.members {
                let mut message = Self::message_node(export, &member.message);
                message.embedding = member.embedding.clone();
                plan.node(&message);
                plan.edge(&message, EdgeType::PostedIn, &room)?;
                plan.edge(&node, EdgeType::Includes, &message)?;
                plan.edge(&message, EdgeType::BelongsTo, &node)?;
            }
            cluster_nodes.push((node, cluster));
        }

        for topic in &digest.summary.topics {
            let mut node = TopicNode::new(&topic.topic_name);
            node.description = topic.summary.clone();
            plan.node(&node);
            plan.edge(&room, EdgeType::RelatedTo, &node)?;

            for id in topic.message_ids.iter().filter_map(|id| id.parse::<i64>().ok()) {
                let message_uuid =
                    MessageNode::uuid_for(&global_message_id(export.platform, export.chat_id, id));
                plan.link(
                    NodeLabel::Message,
                    message_uuid,
                    EdgeType::Expresses,
                    NodeLabel::Topic,
                    node.uuid(),
                )?;
                if let Some(user) = by_id.get(&id).and_then(|m| Self::user_of(export, m)) {
                    plan.node(&user);
                    plan.edge(&user, EdgeType::RelatedTo, &node)?;
                }
                for (cluster_node, cluster) in &cluster_nodes {
                    if cluster.members.iter().any(|m| m.message.message_id == id) {
                        plan.edge(cluster_node, EdgeType::RelatedTo, &node)?;
                    }
                }
            }
        }

        let summary = self.apply(plan).await?;
        info!(
            chat_id = export.chat_id,
            clusters = digest.clusters.len(),
            topics = digest.summary.topics.len(),
            nodes = summary.nodes,
            edges = summary.edges,
            "Digest recorded"
        );
        Ok(summary)
    }

    async fn apply(&self, plan: Plan) -> Result<RecordSummary> {
        let nodes = plan.nodes.len();
        self.graph
            .run_batch(plan.nodes.into_iter().map(GraphOp::Upsert).collect(), false)
            .await?;
        let outcomes = self
            .graph
            .run_batch(plan.edges.into_iter().map(GraphOp::Connect).collect(), false)
            .await?;

        let mut summary = RecordSummary {
            nodes,
            ..RecordSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                GraphOpOutcome::Edge(Some(_)) => summary.edges += 1,
                GraphOpOutcome::Edge(None) => summary.skipped_edges += 1,
                _ => {}
            }
        }
        if summary.skipped_edges > 0 {
            debug!(skipped = summary.skipped_edges, "Edges skipped for missing endpoints");
        }
        Ok(summary)
    }
}

impl std::fmt::Debug for GraphRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRecorder")
            .field("host_user_id", &self.host_user_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScoredMessage, Topic, TopicSummary};
    use agora_core::{CommunityRef, PlatformType};
    use chrono::{TimeZone, Utc};

    fn message(id: i64, sender: &str, text: &str) -> ChatMessage {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, id as u32, 0).unwrap();
        let mut m = ChatMessage::new(id, text, ts);
        m.sender_id = Some(sender.to_string());
        m.first_name = Some(sender.to_uppercase());
        m
    }

    fn export() -> ChatExport {
        let mut mine = message(3, "me", "I love #rust meetups, and I hate spam.");
        mine.is_self = true;
        ChatExport {
            platform: PlatformType::Telegram,
            chat_id: 42,
            title: "Rustaceans".into(),
            description: Some("Rust chat".into()),
            community: Some(CommunityRef {
                id: "c1".into(),
                name: "Rust Guild".into(),
                description: None,
            }),
            messages: vec![
                message(1, "ana", "Release notes at https://blog.rust-lang.org @lee"),
                message(2, "ana", "Meetup next friday"),
                mine,
            ],
        }
    }

    fn graph() -> Arc<KnowledgeGraph> {
        Arc::new(KnowledgeGraph::in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_record_export_graph_shape() {
        let graph = graph();
        let recorder = GraphRecorder::new(graph.clone());
        let summary = recorder.record_export(&export()).await.unwrap();
        assert_eq!(summary.skipped_edges, 0);

        let stats = graph.stats().await.unwrap();
        assert_eq!(stats.nodes_with_label(NodeLabel::Room), 1);
        assert_eq!(stats.nodes_with_label(NodeLabel::Community), 1);
        assert_eq!(stats.nodes_with_label(NodeLabel::User), 2);
        assert_eq!(stats.nodes_with_label(NodeLabel::Message), 3);
        // url, mention, date, hashtag
        assert_eq!(stats.nodes_with_label(NodeLabel::Entity), 4);
        assert_eq!(stats.nodes_with_label(NodeLabel::Preference), 2);
        assert_eq!(stats.edges.get("POSTS"), Some(&3));
        assert_eq!(stats.edges.get("HAS_PREFERENCE"), Some(&2));

        // Ana posted twice: one counted POSTED_IN edge with count 2.
        let ana = UserNode::new(PlatformType::Telegram, "ana", "ANA");
        let posted = graph.edges_from(ana.uuid(), Some(EdgeType::PostedIn)).await.unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].count, Some(2));
    }

    #[tokio::test]
    async fn test_sender_id_equal_to_chat_id() {
        let graph = graph();
        let mut export = export();
        export.messages[0].sender_id = Some("42".into());
        let summary = GraphRecorder::new(graph.clone())
            .record_export(&export)
            .await
            .unwrap();
        assert_eq!(summary.skipped_edges, 0);

        let stats = graph.stats().await.unwrap();
        assert_eq!(stats.nodes_with_label(NodeLabel::Room), 1);
        assert_eq!(stats.nodes_with_label(NodeLabel::User), 3);
    }

    #[tokio::test]
    async fn test_preferences_link_entities_or_topics() {
        let graph = graph();
        let recorder = GraphRecorder::new(graph.clone());
        recorder.record_export(&export()).await.unwrap();

        let me = UserNode::new(PlatformType::Telegram, "me", "ME");
        let prefs = graph.edges_from(me.uuid(), Some(EdgeType::HasPreference)).await.unwrap();
        let mut targets = Vec::new();
        for edge in prefs {
            for link in graph.edges_from(edge.to, Some(EdgeType::For)).await.unwrap() {
                targets.push(link.to_label);
            }
        }
        targets.sort_by_key(|l| l.as_str());
        // "#rust meetups" is not an entity value, "spam" neither.
        assert_eq!(targets, vec![NodeLabel::Topic, NodeLabel::Topic]);
    }

    #[tokio::test]
    async fn test_host_user_by_id() {
        let graph = graph();
        let recorder = GraphRecorder::new(graph.clone()).with_host_user(Some("ana".into()));
        let mut export = export();
        export.messages[1].message = "I enjoy code review".into();
        recorder.record_export(&export).await.unwrap();
        let ana = UserNode::new(PlatformType::Telegram, "ana", "ANA");
        let prefs = graph.edges_from(ana.uuid(), Some(EdgeType::HasPreference)).await.unwrap();
        assert_eq!(prefs.len(), 1);
    }

    #[tokio::test]
    async fn test_recording_twice_merges() {
        let graph = graph();
        let recorder = GraphRecorder::new(graph.clone());
        recorder.record_export(&export()).await.unwrap();
        let first = graph.stats().await.unwrap();
        recorder.record_export(&export()).await.unwrap();
        let second = graph.stats().await.unwrap();
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.edges, second.edges);
    }

    #[tokio::test]
    async fn test_record_digest() {
        let graph = graph();
        let recorder = GraphRecorder::new(graph.clone());
        let export = export();
        recorder.record_export(&export).await.unwrap();

        let members = export.messages[..2]
            .iter()
            .map(|m| ScoredMessage {
                message: m.clone(),
                importance: 0.5,
                embedding: Some(vec![1.0, 0.0]),
            })
            .collect();
        let digest = Digest {
            platform: export.platform,
            chat_id: export.chat_id,
            title: export.title.clone(),
            total_messages: 3,
            analyzed_messages: 2,
            clusters: vec![MessageCluster::new(0, members, 2)],
            summary: TopicSummary {
                topics: vec![Topic {
                    topic_name: "Releases".into(),
                    summary: "New release notes.".into(),
                    message_ids: vec!["1".into()],
                }],
                extractive: false,
            },
            follow_ups: vec![],
            generated_at: Utc::now(),
        };
        let summary = recorder.record_digest(&export, &digest).await.unwrap();
        assert_eq!(summary.skipped_edges, 0);

        let cluster = ClusterNode::new(PlatformType::Telegram, 42, 0, "");
        let stored: ClusterNode = graph.get(cluster.uuid()).await.unwrap().unwrap();
        assert_eq!(stored.meta.name, "Releases");
        assert_eq!(stored.embedding, Some(vec![1.0, 0.0]));

        let includes = graph.edges_from(cluster.uuid(), Some(EdgeType::Includes)).await.unwrap();
        assert_eq!(includes.len(), 2);
        let related = graph.edges_from(cluster.uuid(), Some(EdgeType::RelatedTo)).await.unwrap();
        assert_eq!(related.len(), 2);

        let stats = graph.stats().await.unwrap();
        assert_eq!(stats.edges.get("EXPRESSES"), Some(&1));
    }
}
