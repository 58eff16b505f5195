use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agora_core::{ChatMessage, PlatformType};

/// A message that survived the engagement filter, with its TF-IDF importance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMessage {
    pub message: ChatMessage,
    pub importance: f64,
    /// Text embedding as returned by the model, before feature scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A group of messages found by density clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCluster {
    /// Position in the digest, starting at 0.
    pub id: usize,
    /// Members ordered by importance, highest first.
    pub members: Vec<ScoredMessage>,
    /// How many leading members represent the cluster in prompts.
    pub representatives: usize,
}

impl MessageCluster {
    pub fn new(id: usize, mut members: Vec<ScoredMessage>, representatives: usize) -> Self {
        members.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        Self {
            id,
            members,
            representatives,
        }
    }

    pub fn representatives(&self) -> &[ScoredMessage] {
        let n = self.representatives.min(self.members.len());
        &self.members[..n]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Mean of the member embeddings, if every member has one.
    pub fn centroid(&self) -> Option<Vec<f32>> {
        let first = self.members.first()?.embedding.as_ref()?;
        let mut sum = vec![0.0f32; first.len()];
        for member in &self.members {
            let embedding = member.embedding.as_ref()?;
            if embedding.len() != sum.len() {
                return None;
            }
            for (s, v) in sum.iter_mut().zip(embedding) {
                *s += v;
            }
        }
        let n = self.members.len() as f32;
        Some(sum.into_iter().map(|s| s / n).collect())
    }
}

/// One summarised topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub topic_name: String,
    pub summary: String,
    #[serde(default)]
    pub message_ids: Vec<String>,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "• **{}**: {} [{}]",
            self.topic_name,
            self.summary,
            self.message_ids.join(", ")
        )
    }
}

/// Topics produced for a set of clusters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topics: Vec<Topic>,
    /// True when the topics came from the extractive fallback.
    #[serde(default)]
    pub extractive: bool,
}

impl std::fmt::Display for TopicSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<String> = self.topics.iter().map(Topic::to_string).collect();
        f.write_str(&lines.join("\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    pub question: String,
    /// 1-based index of the topic the question is about.
    pub index: usize,
}

/// Kind of a named entity found in message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Mention,
    Url,
    Hashtag,
    Money,
    Date,
    Person,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::Url => "url",
            Self::Hashtag => "hashtag",
            Self::Money => "money",
            Self::Date => "date",
            Self::Person => "person",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    pub value: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Preference type stored on the graph node.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "likes",
            Self::Negative => "dislikes",
        }
    }
}

/// A stated preference such as "I love rust meetups".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPreference {
    pub polarity: Polarity,
    /// The verb as written, lowercased.
    pub verb: String,
    pub value: String,
}

/// Result of a digest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub platform: PlatformType,
    pub chat_id: i64,
    pub title: String,
    /// Messages in the export.
    pub total_messages: usize,
    /// Messages kept by the engagement filter.
    pub analyzed_messages: usize,
    pub clusters: Vec<MessageCluster>,
    pub summary: TopicSummary,
    #[serde(default)]
    pub follow_ups: Vec<FollowUpQuestion>,
    pub generated_at: DateTime<Utc>,
}

impl Digest {
    /// Markdown report: header, topic lines, then follow-up questions.
    pub fn render(&self) -> String {
        let mut out = format!(
            "## {}\n_{} of {} messages analysed, {} clusters_\n\n",
            self.title,
            self.analyzed_messages,
            self.total_messages,
            self.clusters.len()
        );
        if self.summary.topics.is_empty() {
            out.push_str("Nothing stood out.\n");
        } else {
            out.push_str(&self.summary.to_string());
            out.push('\n');
        }
        if !self.follow_ups.is_empty() {
            out.push_str("\n**Follow-up questions**\n");
            for q in &self.follow_ups {
                out.push_str(&format!("- {} (topic {})\n", q.question, q.index));
            }
        }
        out
    }
}
