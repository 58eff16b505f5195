//! Relationship types and the registry of allowed (from, relation, to) triples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_core::error::{AgoraError, Result};

use crate::schema::NodeLabel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeType {
    Posts,
    PostedIn,
    BelongsTo,
    RelatedTo,
    Mentions,
    Includes,
    ParticipatesIn,
    HasPreference,
    For,
    Expresses,
}

impl EdgeType {
    pub const ALL: [EdgeType; 10] = [
        EdgeType::Posts,
        EdgeType::PostedIn,
        EdgeType::BelongsTo,
        EdgeType::RelatedTo,
        EdgeType::Mentions,
        EdgeType::Includes,
        EdgeType::ParticipatesIn,
        EdgeType::HasPreference,
        EdgeType::For,
        EdgeType::Expresses,
    ];

    /// Relationship type name as written to the graph.
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::Posts => "POSTS",
            EdgeType::PostedIn => "POSTED_IN",
            EdgeType::BelongsTo => "BELONGS_TO",
            EdgeType::RelatedTo => "RELATED_TO",
            EdgeType::Mentions => "MENTIONS",
            EdgeType::Includes => "INCLUDES",
            EdgeType::ParticipatesIn => "PARTICIPATES_IN",
            EdgeType::HasPreference => "HAS_PREFERENCE",
            EdgeType::For => "FOR",
            EdgeType::Expresses => "EXPRESSES",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = AgoraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AgoraError::Validation(format!("Unknown edge type: {s}")))
    }
}

/// An allowed relationship between two labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeDefinition {
    pub from: NodeLabel,
    pub rel: EdgeType,
    pub to: NodeLabel,
    /// Counted edges keep a `count` incremented on every merge.
    pub counted: bool,
}

const fn def(from: NodeLabel, rel: EdgeType, to: NodeLabel) -> EdgeDefinition {
    EdgeDefinition {
        from,
        rel,
        to,
        counted: false,
    }
}

pub const EDGE_DEFINITIONS: &[EdgeDefinition] = &[
    def(NodeLabel::User, EdgeType::Posts, NodeLabel::Message),
    def(NodeLabel::Message, EdgeType::PostedIn, NodeLabel::Room),
    def(NodeLabel::Message, EdgeType::Mentions, NodeLabel::Entity),
    def(NodeLabel::Message, EdgeType::BelongsTo, NodeLabel::Cluster),
    def(NodeLabel::Message, EdgeType::Expresses, NodeLabel::Topic),
    def(NodeLabel::Cluster, EdgeType::Includes, NodeLabel::Message),
    def(NodeLabel::Cluster, EdgeType::RelatedTo, NodeLabel::Room),
    def(NodeLabel::Cluster, EdgeType::RelatedTo, NodeLabel::Topic),
    def(NodeLabel::User, EdgeType::BelongsTo, NodeLabel::Community),
    def(NodeLabel::User, EdgeType::BelongsTo, NodeLabel::Room),
    def(NodeLabel::User, EdgeType::ParticipatesIn, NodeLabel::Room),
    EdgeDefinition {
        from: NodeLabel::User,
        rel: EdgeType::PostedIn,
        to: NodeLabel::Room,
        counted: true,
    },
    def(NodeLabel::User, EdgeType::RelatedTo, NodeLabel::Topic),
    def(NodeLabel::User, EdgeType::HasPreference, NodeLabel::Preference),
    def(NodeLabel::Room, EdgeType::RelatedTo, NodeLabel::Topic),
    def(NodeLabel::Room, EdgeType::BelongsTo, NodeLabel::Community),
    def(NodeLabel::Entity, EdgeType::RelatedTo, NodeLabel::Entity),
    def(NodeLabel::Preference, EdgeType::For, NodeLabel::Entity),
    def(NodeLabel::Preference, EdgeType::For, NodeLabel::Topic),
];

/// Look up the registry entry for a triple.
pub fn edge_definition(
    from: NodeLabel,
    rel: EdgeType,
    to: NodeLabel,
) -> Result<&'static EdgeDefinition> {
    EDGE_DEFINITIONS
        .iter()
        .find(|d| d.from == from && d.rel == rel && d.to == to)
        .ok_or_else(|| {
            AgoraError::Validation(format!("No edge definition for ({from})-[{rel}]->({to})"))
        })
}

/// A relationship instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: Uuid,
    pub from_label: NodeLabel,
    pub rel: EdgeType,
    pub to: Uuid,
    pub to_label: NodeLabel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    /// Present on counted edges only.
    pub count: Option<i64>,
}

impl EdgeRecord {
    /// Build a new edge, validating the triple against the registry.
    pub fn new(
        from_label: NodeLabel,
        from: Uuid,
        rel: EdgeType,
        to_label: NodeLabel,
        to: Uuid,
    ) -> Result<Self> {
        let definition = edge_definition(from_label, rel, to_label)?;
        let now = Utc::now();
        Ok(Self {
            from,
            from_label,
            rel,
            to,
            to_label,
            created_at: now,
            updated_at: now,
            valid_from: None,
            valid_to: None,
            count: definition.counted.then_some(1),
        })
    }

    pub fn with_validity(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_to = valid_to;
        self
    }

    pub fn definition(&self) -> Result<&'static EdgeDefinition> {
        edge_definition(self.from_label, self.rel, self.to_label)
    }
}
