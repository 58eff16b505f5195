use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgoraError, Result};

// =============================================================================
// Platforms and global identifiers
// =============================================================================

/// Messaging platform a graph object originates from.
///
/// The integer values are part of the global id format and must not change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    /// Objects that do not belong to a single platform (topics, entities).
    #[default]
    Global = 1,
    Telegram = 2,
    Discord = 3,
    Twitter = 4,
}

impl PlatformType {
    pub const ALL: [PlatformType; 4] = [
        PlatformType::Global,
        PlatformType::Telegram,
        PlatformType::Discord,
        PlatformType::Twitter,
    ];

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_i32() == value)
            .ok_or_else(|| AgoraError::InvalidPlatform(value.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformType::Global => "global",
            PlatformType::Telegram => "telegram",
            PlatformType::Discord => "discord",
            PlatformType::Twitter => "twitter",
        }
    }
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformType {
    type Err = AgoraError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| AgoraError::InvalidPlatform(s.to_string()))
    }
}

/// Global message id: `{platform}_{chat_id}_{message_id}`.
pub fn global_message_id(platform: PlatformType, chat_id: i64, message_id: i64) -> String {
    format!("{}_{}_{}", platform.as_i32(), chat_id, message_id)
}

/// Global cluster id: `{platform}_{chat_id}_{cluster_id}`.
pub fn global_cluster_id(platform: PlatformType, chat_id: i64, cluster_id: usize) -> String {
    format!("{}_{}_{}", platform.as_i32(), chat_id, cluster_id)
}

/// Global user id: `{platform}_{user_id}`.
pub fn global_user_id(platform: PlatformType, user_id: &str) -> String {
    format!("{}_{}", platform.as_i32(), user_id)
}

/// Global room id: `{platform}_{chat_id}`.
pub fn global_room_id(platform: PlatformType, chat_id: i64) -> String {
    format!("{}_{}", platform.as_i32(), chat_id)
}

/// Deterministic node uuid for a global id, so re-recording merges.
pub fn stable_uuid(global_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, global_id.as_bytes())
}

// =============================================================================
// Chat messages
// =============================================================================

/// Kind of media attached to a message. The discriminant doubles as the
/// media score used in engagement scoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Document = 1,
    Photo = 2,
    Video = 3,
    Audio = 4,
}

impl MediaKind {
    pub fn score(self) -> u8 {
        self as u8
    }
}

/// A single chat message as it appears in an export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: i64,
    /// Platform user id of the sender, when the export carries one.
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub link_preview_title: Option<String>,
    #[serde(default)]
    pub link_preview_description: Option<String>,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub is_contact: bool,
    #[serde(default)]
    pub has_mention: bool,
    #[serde(default)]
    pub has_link: bool,
    #[serde(default)]
    pub reaction_count: u32,
    #[serde(default)]
    pub media: Option<MediaKind>,
}

impl ChatMessage {
    /// Minimal message, mostly useful for tests and tooling.
    pub fn new(message_id: i64, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message_id,
            sender_id: None,
            first_name: None,
            username: None,
            message: message.into(),
            timestamp,
            link_preview_title: None,
            link_preview_description: None,
            is_self: false,
            is_bot: false,
            is_premium: false,
            is_contact: false,
            has_mention: false,
            has_link: false,
            reaction_count: 0,
            media: None,
        }
    }

    /// Text used for embeddings: message followed by link preview fields,
    /// one per line.
    pub fn embedding_text(&self) -> String {
        let mut text = self.message.clone();
        for extra in [&self.link_preview_title, &self.link_preview_description]
            .into_iter()
            .flatten()
        {
            if !extra.is_empty() {
                text.push('\n');
                text.push_str(extra);
            }
        }
        text
    }

    fn combined_length(&self) -> usize {
        let title = self.link_preview_title.as_deref().map_or(0, |t| t.chars().count());
        let desc = self
            .link_preview_description
            .as_deref()
            .map_or(0, |d| d.chars().count());
        self.message.chars().count() + title + desc
    }

    pub fn media_score(&self) -> u8 {
        self.media.map_or(0, MediaKind::score)
    }

    /// Engagement score in `[0, 1]`.
    ///
    /// Substance, reactions, links and media raise the score; messages sent
    /// by the host-user or by bots are pushed towards zero.
    pub fn engagement_score(&self) -> f64 {
        const MIN_SCORE: f64 = -5.0;
        const MAX_SCORE: f64 = 3.0;

        let len = self.combined_length();
        let length_score = if len < 20 {
            0.1
        } else {
            ((len as f64).ln_1p() / 5.0).min(1.0)
        };
        let reaction_score = 1.0 / (1.0 + (-(self.reaction_count as f64 - 1.0) / 2.0).exp());

        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let score = 0.3 * length_score - 5.0 * flag(self.is_self) - 3.0 * flag(self.is_bot)
            + 1.0 * reaction_score
            + 0.2 * flag(self.is_premium)
            + 0.1 * flag(self.is_contact)
            + 0.1 * flag(self.has_mention)
            + 0.4 * flag(self.has_link)
            + 0.5 * self.media_score() as f64;

        ((score - MIN_SCORE) / (MAX_SCORE - MIN_SCORE)).clamp(0.0, 1.0)
    }

    /// Identifier of the sender on its platform: id, then username, then first name.
    pub fn sender_key(&self) -> Option<&str> {
        self.sender_id
            .as_deref()
            .or(self.username.as_deref())
            .or(self.first_name.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Display name for the sender.
    pub fn sender_name(&self) -> String {
        if self.is_self {
            return "me".to_string();
        }
        self.first_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn reduce(&self) -> ReducedMessage {
        ReducedMessage {
            id: self.message_id,
            who: Some(self.sender_name()),
            text: self.message.clone(),
            username: self.username.clone(),
            engagement: self.engagement_score(),
        }
    }
}

/// Compact message form handed to the summarizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReducedMessage {
    #[serde(rename = "txt_id")]
    pub id: i64,
    pub who: Option<String>,
    #[serde(rename = "txt")]
    pub text: String,
    pub username: Option<String>,
    #[serde(rename = "eng_score")]
    pub engagement: f64,
}

/// A chat history exported from a messaging platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatExport {
    #[serde(default = "default_export_platform")]
    pub platform: PlatformType,
    pub chat_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Community (server, supergroup, forum) the chat belongs to.
    #[serde(default)]
    pub community: Option<CommunityRef>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

fn default_export_platform() -> PlatformType {
    PlatformType::Telegram
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommunityRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ChatExport {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let export: ChatExport = serde_json::from_str(&content)?;
        Ok(export)
    }
}
