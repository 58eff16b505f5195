//! Typed nodes of the knowledge graph.
//!
//! Nodes compare and hash by uuid only. Platform-backed nodes derive their
//! uuid from the global id so that recording the same object twice merges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use agora_core::error::Result;
use agora_core::types::{
    global_cluster_id, global_message_id, global_room_id, global_user_id, stable_uuid,
    PlatformType,
};

use crate::schema::{GraphNode, NodeLabel, NodeRecord};

/// Fields shared by every node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeMeta {
    pub uuid: Uuid,
    pub name: String,
    pub platform: PlatformType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NodeMeta {
    pub fn new(uuid: Uuid, name: impl Into<String>, platform: PlatformType) -> Self {
        let now = Utc::now();
        Self {
            uuid,
            name: name.into(),
            platform,
            created_at: now,
            updated_at: now,
        }
    }

    fn record(&self, label: NodeLabel) -> NodeRecord {
        NodeRecord {
            uuid: self.uuid,
            label,
            name: self.name.clone(),
            platform: self.platform,
            created_at: self.created_at,
            updated_at: self.updated_at,
            properties: serde_json::Map::new(),
            embedding: None,
        }
    }

    fn from_record(record: &NodeRecord) -> Self {
        Self {
            uuid: record.uuid,
            name: record.name.clone(),
            platform: record.platform,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn string_prop(record: &NodeRecord, key: &str) -> String {
    record.str_prop(key).unwrap_or_default().to_string()
}

macro_rules! identity_by_uuid {
    ($($node:ty),+ $(,)?) => {
        $(
            impl PartialEq for $node {
                fn eq(&self, other: &Self) -> bool {
                    self.meta.uuid == other.meta.uuid
                }
            }

            impl Eq for $node {}

            impl std::hash::Hash for $node {
                fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                    self.meta.uuid.hash(state);
                }
            }
        )+
    };
}

identity_by_uuid!(
    UserNode,
    RoomNode,
    MessageNode,
    ClusterNode,
    CommunityNode,
    EntityNode,
    TopicNode,
    PreferenceNode,
);

// =============================================================================
// User
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserNode {
    pub meta: NodeMeta,
    /// Global user id (`{platform}_{user_id}`).
    pub platform_id: String,
    pub embedding: Option<Vec<f32>>,
}

impl UserNode {
    pub fn new(platform: PlatformType, user_id: &str, name: impl Into<String>) -> Self {
        let platform_id = global_user_id(platform, user_id);
        Self {
            meta: NodeMeta::new(Self::uuid_for(&platform_id), name, platform),
            platform_id,
            embedding: None,
        }
    }

    /// Node uuid for a global user id.
    pub fn uuid_for(platform_id: &str) -> Uuid {
        stable_uuid(&format!("user:{platform_id}"))
    }
}

impl GraphNode for UserNode {
    const LABEL: NodeLabel = NodeLabel::User;

    fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    fn to_record(&self) -> NodeRecord {
        self.meta
            .record(Self::LABEL)
            .with_property("platform_id", self.platform_id.clone())
            .with_embedding(self.embedding.clone())
    }

    fn from_record(record: NodeRecord) -> Result<Self> {
        record.expect_label(Self::LABEL)?;
        Ok(Self {
            meta: NodeMeta::from_record(&record),
            platform_id: string_prop(&record, "platform_id"),
            embedding: record.embedding,
        })
    }
}

// =============================================================================
// Room
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomNode {
    pub meta: NodeMeta,
    pub platform_id: String,
    pub description: String,
    pub embedding: Option<Vec<f32>>,
}

impl RoomNode {
    pub fn new(platform: PlatformType, chat_id: i64, title: impl Into<String>) -> Self {
        let platform_id = global_room_id(platform, chat_id);
        Self {
            meta: NodeMeta::new(Self::uuid_for(&platform_id), title, platform),
            platform_id,
            description: String::new(),
            embedding: None,
        }
    }

    /// Node uuid for a global room id.
    pub fn uuid_for(platform_id: &str) -> Uuid {
        stable_uuid(&format!("room:{platform_id}"))
    }
}

impl GraphNode for RoomNode {
    const LABEL: NodeLabel = NodeLabel::Room;

    fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    fn to_record(&self) -> NodeRecord {
        self.meta
            .record(Self::LABEL)
            .with_property("platform_id", self.platform_id.clone())
            .with_property("description", self.description.clone())
            .with_embedding(self.embedding.clone())
    }

    fn from_record(record: NodeRecord) -> Result<Self> {
        record.expect_label(Self::LABEL)?;
        Ok(Self {
            meta: NodeMeta::from_record(&record),
            platform_id: string_prop(&record, "platform_id"),
            description: string_prop(&record, "description"),
            embedding: record.embedding,
        })
    }
}

// =============================================================================
// Message
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageNode {
    pub meta: NodeMeta,
    /// Global message id (`{platform}_{chat_id}_{message_id}`).
    pub platform_id: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub engagement: f64,
    pub embedding: Option<Vec<f32>>,
}

impl MessageNode {
    pub fn new(
        platform: PlatformType,
        chat_id: i64,
        message_id: i64,
        content: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        let platform_id = global_message_id(platform, chat_id, message_id);
        Self {
            meta: NodeMeta::new(Self::uuid_for(&platform_id), platform_id.clone(), platform),
            platform_id,
            content: content.into(),
            sent_at,
            engagement: 0.0,
            embedding: None,
        }
    }

    /// Node uuid for a global message id.
    pub fn uuid_for(platform_id: &str) -> Uuid {
        stable_uuid(&format!("message:{platform_id}"))
    }
}

impl GraphNode for MessageNode {
    const LABEL: NodeLabel = NodeLabel::Message;

    fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    fn to_record(&self) -> NodeRecord {
        self.meta
            .record(Self::LABEL)
            .with_property("platform_id", self.platform_id.clone())
            .with_property("content", self.content.clone())
            .with_property("sent_at", self.sent_at.to_rfc3339())
            .with_property("engagement", self.engagement)
            .with_embedding(self.embedding.clone())
    }

    fn from_record(record: NodeRecord) -> Result<Self> {
        record.expect_label(Self::LABEL)?;
        let sent_at = record
            .str_prop("sent_at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(record.created_at);
        Ok(Self {
            meta: NodeMeta::from_record(&record),
            platform_id: string_prop(&record, "platform_id"),
            content: string_prop(&record, "content"),
            sent_at,
            engagement: record.f64_prop("engagement").unwrap_or(0.0),
            embedding: record.embedding,
        })
    }
}

// =============================================================================
// Cluster
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterNode {
    pub meta: NodeMeta,
    pub description: String,
    pub embedding: Option<Vec<f32>>,
}

impl ClusterNode {
    pub fn new(
        platform: PlatformType,
        chat_id: i64,
        cluster_id: usize,
        name: impl Into<String>,
    ) -> Self {
        let global_id = global_cluster_id(platform, chat_id, cluster_id);
        Self {
            meta: NodeMeta::new(stable_uuid(&format!("cluster:{global_id}")), name, platform),
            description: String::new(),
            embedding: None,
        }
    }
}

impl GraphNode for ClusterNode {
    const LABEL: NodeLabel = NodeLabel::Cluster;

    fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    fn to_record(&self) -> NodeRecord {
        self.meta
            .record(Self::LABEL)
            .with_property("description", self.description.clone())
            .with_embedding(self.embedding.clone())
    }

    fn from_record(record: NodeRecord) -> Result<Self> {
        record.expect_label(Self::LABEL)?;
        Ok(Self {
            meta: NodeMeta::from_record(&record),
            description: string_prop(&record, "description"),
            embedding: record.embedding,
        })
    }
}

// =============================================================================
// Community
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommunityNode {
    pub meta: NodeMeta,
    pub platform_id: String,
    pub description: String,
}

impl CommunityNode {
    pub fn new(platform: PlatformType, community_id: &str, name: impl Into<String>) -> Self {
        let platform_id = format!("{}_{}", platform.as_i32(), community_id);
        Self {
            meta: NodeMeta::new(
                stable_uuid(&format!("community:{platform_id}")),
                name,
                platform,
            ),
            platform_id,
            description: String::new(),
        }
    }
}

impl GraphNode for CommunityNode {
    const LABEL: NodeLabel = NodeLabel::Community;

    fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    fn to_record(&self) -> NodeRecord {
        self.meta
            .record(Self::LABEL)
            .with_property("platform_id", self.platform_id.clone())
            .with_property("description", self.description.clone())
    }

    fn from_record(record: NodeRecord) -> Result<Self> {
        record.expect_label(Self::LABEL)?;
        Ok(Self {
            meta: NodeMeta::from_record(&record),
            platform_id: string_prop(&record, "platform_id"),
            description: string_prop(&record, "description"),
        })
    }
}

// =============================================================================
// Entity
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityNode {
    pub meta: NodeMeta,
    /// Free-form kind: "person", "url", "hashtag", ...
    pub entity_type: String,
    pub description: String,
    pub embedding: Option<Vec<f32>>,
}

impl EntityNode {
    /// Entities are global: the same value of the same kind is one node.
    pub fn new(entity_type: &str, value: &str) -> Self {
        let key = format!("entity:{}:{}", entity_type, value.trim().to_lowercase());
        Self {
            meta: NodeMeta::new(stable_uuid(&key), value.trim(), PlatformType::Global),
            entity_type: entity_type.to_string(),
            description: String::new(),
            embedding: None,
        }
    }
}

impl GraphNode for EntityNode {
    const LABEL: NodeLabel = NodeLabel::Entity;

    fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    fn to_record(&self) -> NodeRecord {
        self.meta
            .record(Self::LABEL)
            .with_property("entity_type", self.entity_type.clone())
            .with_property("description", self.description.clone())
            .with_embedding(self.embedding.clone())
    }

    fn from_record(record: NodeRecord) -> Result<Self> {
        record.expect_label(Self::LABEL)?;
        Ok(Self {
            meta: NodeMeta::from_record(&record),
            entity_type: string_prop(&record, "entity_type"),
            description: string_prop(&record, "description"),
            embedding: record.embedding,
        })
    }
}

// =============================================================================
// Topic
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopicNode {
    pub meta: NodeMeta,
    pub description: String,
    pub embedding: Option<Vec<f32>>,
}

impl TopicNode {
    pub fn new(name: &str) -> Self {
        let key = format!("topic:{}", name.trim().to_lowercase());
        Self {
            meta: NodeMeta::new(stable_uuid(&key), name.trim(), PlatformType::Global),
            description: String::new(),
            embedding: None,
        }
    }
}

impl GraphNode for TopicNode {
    const LABEL: NodeLabel = NodeLabel::Topic;

    fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    fn to_record(&self) -> NodeRecord {
        self.meta
            .record(Self::LABEL)
            .with_property("description", self.description.clone())
            .with_embedding(self.embedding.clone())
    }

    fn from_record(record: NodeRecord) -> Result<Self> {
        record.expect_label(Self::LABEL)?;
        Ok(Self {
            meta: NodeMeta::from_record(&record),
            description: string_prop(&record, "description"),
            embedding: record.embedding,
        })
    }
}

// =============================================================================
// Preference
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreferenceNode {
    pub meta: NodeMeta,
    /// Verb or polarity of the preference, e.g. "likes", "dislikes".
    pub preference_type: String,
    pub value: String,
}

impl PreferenceNode {
    /// Preferences are scoped to their owner.
    pub fn new(owner: Uuid, preference_type: &str, value: &str) -> Self {
        let value = value.trim();
        let key = format!("preference:{owner}:{preference_type}:{}", value.to_lowercase());
        Self {
            meta: NodeMeta::new(
                stable_uuid(&key),
                format!("{preference_type} {value}"),
                PlatformType::Global,
            ),
            preference_type: preference_type.to_string(),
            value: value.to_string(),
        }
    }
}

impl GraphNode for PreferenceNode {
    const LABEL: NodeLabel = NodeLabel::Preference;

    fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    fn to_record(&self) -> NodeRecord {
        self.meta
            .record(Self::LABEL)
            .with_property("preference_type", self.preference_type.clone())
            .with_property("value", Value::String(self.value.clone()))
    }

    fn from_record(record: NodeRecord) -> Result<Self> {
        record.expect_label(Self::LABEL)?;
        Ok(Self {
            meta: NodeMeta::from_record(&record),
            preference_type: string_prop(&record, "preference_type"),
            value: string_prop(&record, "value"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn test_user_uuid_is_stable() {
        let a = UserNode::new(PlatformType::Telegram, "42", "Ana");
        let b = UserNode::new(PlatformType::Telegram, "42", "Ana B.");
        assert_eq!(a, b);
        assert_eq!(a.platform_id, "2_42");
        assert_ne!(a, UserNode::new(PlatformType::Discord, "42", "Ana"));
    }

    #[test]
    fn test_labels_do_not_share_uuids() {
        let user = UserNode::new(PlatformType::Telegram, "1", "Ana");
        let room = RoomNode::new(PlatformType::Telegram, 1, "Rust");
        assert_eq!(user.platform_id, room.platform_id);
        assert_ne!(user.uuid(), room.uuid());

        let msg = MessageNode::new(PlatformType::Telegram, 1, 5, "hi", Utc::now());
        assert_eq!(msg.uuid(), MessageNode::uuid_for("2_1_5"));
    }

    #[test]
    fn test_equality_ignores_other_fields() {
        let a = TopicNode::new("Rust");
        let mut b = TopicNode::new("rust ");
        b.description = "different".into();
        let set: HashSet<TopicNode> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_message_record_round_trip() {
        let sent = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut msg = MessageNode::new(PlatformType::Telegram, 9, 77, "hello", sent);
        msg.engagement = 0.8;
        msg.embedding = Some(vec![0.1, 0.2]);

        let record = msg.to_record();
        assert_eq!(record.label, NodeLabel::Message);
        assert_eq!(record.str_prop("platform_id"), Some("2_9_77"));

        let back = MessageNode::from_record(record).unwrap();
        assert_eq!(back.content, "hello");
        assert_eq!(back.sent_at, sent);
        assert!((back.engagement - 0.8).abs() < 1e-12);
        assert_eq!(back.embedding, Some(vec![0.1, 0.2]));
    }

    #[test]
    fn test_from_record_rejects_wrong_label() {
        let record = RoomNode::new(PlatformType::Telegram, 1, "Room").to_record();
        assert!(UserNode::from_record(record).is_err());
    }

    #[test]
    fn test_preference_scoped_to_owner() {
        let owner_a = Uuid::new_v4();
        let owner_b = Uuid::new_v4();
        let a = PreferenceNode::new(owner_a, "likes", "Coffee");
        assert_eq!(a, PreferenceNode::new(owner_a, "likes", "coffee"));
        assert_ne!(a, PreferenceNode::new(owner_b, "likes", "coffee"));
        assert_eq!(a.meta.name, "likes Coffee");
    }

    #[test]
    fn test_community_and_preference_have_no_embedding() {
        let community = CommunityNode::new(PlatformType::Discord, "guild-1", "Guild");
        assert!(community.to_record().embedding.is_none());
        assert!(!NodeLabel::Community.has_embedding());
    }
}
