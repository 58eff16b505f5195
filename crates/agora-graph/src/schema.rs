//! Node labels and the untyped node record every backend stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use agora_core::error::{AgoraError, Result};
use agora_core::types::PlatformType;

/// Labels of the nodes in the knowledge graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeLabel {
    User,
    Room,
    Message,
    Cluster,
    Community,
    Entity,
    Topic,
    Preference,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 8] = [
        NodeLabel::User,
        NodeLabel::Room,
        NodeLabel::Message,
        NodeLabel::Cluster,
        NodeLabel::Community,
        NodeLabel::Entity,
        NodeLabel::Topic,
        NodeLabel::Preference,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeLabel::User => "User",
            NodeLabel::Room => "Room",
            NodeLabel::Message => "Message",
            NodeLabel::Cluster => "Cluster",
            NodeLabel::Community => "Community",
            NodeLabel::Entity => "Entity",
            NodeLabel::Topic => "Topic",
            NodeLabel::Preference => "Preference",
        }
    }

    /// Variable name used for this label in generated Cypher.
    pub fn variable(self) -> &'static str {
        match self {
            NodeLabel::User => "u",
            NodeLabel::Room => "r",
            NodeLabel::Message => "m",
            NodeLabel::Cluster => "c",
            NodeLabel::Community => "cm",
            NodeLabel::Entity => "e",
            NodeLabel::Topic => "t",
            NodeLabel::Preference => "p",
        }
    }

    /// Whether nodes of this label carry an embedding vector.
    pub fn has_embedding(self) -> bool {
        !matches!(self, NodeLabel::Community | NodeLabel::Preference)
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeLabel {
    type Err = AgoraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AgoraError::Validation(format!("Unknown node label: {s}")))
    }
}

/// A node as stored by a backend: common fields plus free-form properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub uuid: Uuid,
    pub label: NodeLabel,
    pub name: String,
    pub platform: PlatformType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub properties: Map<String, Value>,
    pub embedding: Option<Vec<f32>>,
}

impl NodeRecord {
    pub fn new(label: NodeLabel, uuid: Uuid, name: impl Into<String>, platform: PlatformType) -> Self {
        let now = Utc::now();
        Self {
            uuid,
            label,
            name: name.into(),
            platform,
            created_at: now,
            updated_at: now,
            properties: Map::new(),
            embedding: None,
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn f64_prop(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(Value::as_f64)
    }

    /// Fail unless the record carries the expected label.
    pub fn expect_label(&self, label: NodeLabel) -> Result<()> {
        if self.label == label {
            Ok(())
        } else {
            Err(AgoraError::Validation(format!(
                "Expected {label} node, found {} ({})",
                self.label, self.uuid
            )))
        }
    }

    /// Flat property map written to the graph: common fields first, then the
    /// label-specific ones. Timestamps are RFC 3339 strings.
    pub fn flat_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("uuid".into(), Value::String(self.uuid.to_string()));
        props.insert("name".into(), Value::String(self.name.clone()));
        props.insert("platform".into(), Value::from(self.platform.as_i32()));
        props.insert("created_at".into(), Value::String(self.created_at.to_rfc3339()));
        props.insert("updated_at".into(), Value::String(self.updated_at.to_rfc3339()));
        for (k, v) in &self.properties {
            props.insert(k.clone(), v.clone());
        }
        props
    }

    /// Rebuild a record from a flat property map (inverse of [`flat_properties`]).
    ///
    /// [`flat_properties`]: NodeRecord::flat_properties
    pub fn from_flat_properties(
        label: NodeLabel,
        mut props: Map<String, Value>,
        embedding: Option<Vec<f32>>,
    ) -> Result<Self> {
        let uuid = props
            .remove("uuid")
            .and_then(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
            .ok_or_else(|| AgoraError::Graph(format!("{label} node without a valid uuid")))?;
        let name = props
            .remove("name")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let platform = match props.remove("platform").and_then(|v| v.as_i64()) {
            Some(p) => PlatformType::from_i32(p as i32)?,
            None => PlatformType::Global,
        };
        let created_at = take_timestamp(&mut props, "created_at");
        let updated_at = take_timestamp(&mut props, "updated_at");
        props.remove("embedding");

        Ok(Self {
            uuid,
            label,
            name,
            platform,
            created_at,
            updated_at,
            properties: props,
            embedding,
        })
    }
}

fn take_timestamp(props: &mut Map<String, Value>, key: &str) -> DateTime<Utc> {
    props
        .remove(key)
        .and_then(|v| v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// A typed node that can be converted to and from a [`NodeRecord`].
pub trait GraphNode: Sized + Send + Sync {
    const LABEL: NodeLabel;

    fn uuid(&self) -> Uuid;

    fn to_record(&self) -> NodeRecord;

    fn from_record(record: NodeRecord) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parsing() {
        assert_eq!("message".parse::<NodeLabel>().unwrap(), NodeLabel::Message);
        assert!("Channel".parse::<NodeLabel>().is_err());
    }

    #[test]
    fn test_embedding_labels() {
        assert!(NodeLabel::User.has_embedding());
        assert!(NodeLabel::Topic.has_embedding());
        assert!(!NodeLabel::Community.has_embedding());
        assert!(!NodeLabel::Preference.has_embedding());
    }

    #[test]
    fn test_flat_properties_round_trip() {
        let record = NodeRecord::new(NodeLabel::Room, Uuid::new_v4(), "Rust", PlatformType::Discord)
            .with_property("description", "systems talk");
        let flat = record.flat_properties();
        assert_eq!(flat["platform"], 3);
        assert_eq!(flat["description"], "systems talk");

        let back = NodeRecord::from_flat_properties(NodeLabel::Room, flat, None).unwrap();
        assert_eq!(back.uuid, record.uuid);
        assert_eq!(back.platform, PlatformType::Discord);
        assert_eq!(back.str_prop("description"), Some("systems talk"));
        assert!(!back.properties.contains_key("uuid"));
    }

    #[test]
    fn test_expect_label() {
        let record = NodeRecord::new(NodeLabel::Topic, Uuid::new_v4(), "x", PlatformType::Global);
        assert!(record.expect_label(NodeLabel::Topic).is_ok());
        assert!(record.expect_label(NodeLabel::User).is_err());
    }
}
