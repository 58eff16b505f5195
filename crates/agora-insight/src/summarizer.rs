//! Topic summaries for message clusters.
//!
//! With a language model the clusters are sent as `**Cluster {i}:**` blocks
//! and the reply is parsed as JSON topics. Without one, an extractive
//! summary is built from the top words and the lead representative.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use agora_core::config::InsightConfig;
use agora_core::Persona;
use agora_llm::{CompletionRequest, LanguageModel};

use crate::error::{InsightError, Result};
use crate::prompts;
use crate::tfidf::tokenize;
use crate::types::{FollowUpQuestion, MessageCluster, Topic, TopicSummary};

/// Words kept from the lead message in extractive summaries.
const EXTRACT_WORDS: usize = 25;
const MAX_FOLLOW_UPS: usize = 5;

pub struct Summarizer {
    model: Option<Arc<dyn LanguageModel>>,
    persona: Persona,
    config: InsightConfig,
}

impl Summarizer {
    pub fn new(model: Arc<dyn LanguageModel>, persona: Persona, config: InsightConfig) -> Self {
        Self {
            model: Some(model),
            persona,
            config,
        }
    }

    /// A summarizer that never calls a model.
    pub fn extractive(persona: Persona, config: InsightConfig) -> Self {
        Self {
            model: None,
            persona,
            config,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    fn request(&self, query: String) -> CompletionRequest {
        CompletionRequest::new()
            .with_system(prompts::summary_system_prompt(&self.persona))
            .with_user(query)
            .with_temperature(self.config.summary_temperature)
            .with_top_p(self.config.summary_top_p)
    }

    /// Summarise clusters into at most `max_topics` topics. Model errors and
    /// unparsable replies are returned, not papered over.
    pub async fn summarize(&self, clusters: &[MessageCluster]) -> Result<TopicSummary> {
        if clusters.is_empty() {
            return Ok(TopicSummary::default());
        }
        let Some(model) = &self.model else {
            return Ok(extractive_summary(clusters, self.config.max_topics));
        };

        let query = prompts::summary_query(&format_clusters(clusters)?, self.config.max_topics);
        let completion = model.complete(&self.request(query).with_json_output()).await?;
        debug!(
            model = %completion.model,
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "Summary completion received"
        );

        let known: HashSet<String> = clusters
            .iter()
            .flat_map(|c| c.members.iter())
            .map(|m| m.message.message_id.to_string())
            .collect();
        let mut topics = parse_topics(&completion.text, self.config.max_topics)?;
        for topic in &mut topics {
            topic.message_ids.retain(|id| known.contains(id));
        }
        info!(topics = topics.len(), "Clusters summarised");
        Ok(TopicSummary {
            topics,
            extractive: false,
        })
    }

    /// Follow-up questions for a summary. Empty without a model.
    pub async fn follow_ups(&self, summary: &TopicSummary) -> Result<Vec<FollowUpQuestion>> {
        let Some(model) = &self.model else {
            return Ok(Vec::new());
        };
        if summary.topics.is_empty() {
            return Ok(Vec::new());
        }
        let query = prompts::follow_up_query(&format_topics(summary));
        let completion = model.complete(&self.request(query)).await?;
        Ok(parse_follow_ups(&completion.text, summary.topics.len()))
    }
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("model", &self.model.as_ref().map(|m| m.model_name().to_string()))
            .field("persona", &self.persona.name)
            .finish_non_exhaustive()
    }
}

/// `**Cluster {i}:**` blocks holding the representatives as JSON objects.
pub fn format_clusters(clusters: &[MessageCluster]) -> Result<String> {
    let mut out = String::new();
    for (i, cluster) in clusters.iter().enumerate() {
        out.push_str(&format!("**Cluster {i}:**\n"));
        for member in cluster.representatives() {
            out.push_str(&serde_json::to_string(&member.message.reduce()).map_err(|e| {
                InsightError::InvalidResponse(format!("cannot encode message: {e}"))
            })?);
            out.push_str(", ");
        }
        out.push_str("\n\n");
    }
    Ok(out)
}

/// `[**Topic {n}:**\n{name}\n{summary}\n...]`, numbered from 1.
pub fn format_topics(summary: &TopicSummary) -> String {
    let body: String = summary
        .topics
        .iter()
        .enumerate()
        .map(|(i, t)| format!("**Topic {}:**\n{}\n{}\n", i + 1, t.topic_name, t.summary))
        .collect();
    format!("[{body}]")
}

/// The JSON payload inside a reply that may carry prose or code fences.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (end >= start).then(|| &text[start..=end])
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse topics from a model reply: either a bare array or `{"topics": [...]}`.
pub fn parse_topics(text: &str, max_topics: usize) -> Result<Vec<Topic>> {
    let span = json_span(text)
        .ok_or_else(|| InsightError::InvalidResponse("reply holds no JSON".into()))?;
    let value: Value = serde_json::from_str(span)
        .map_err(|e| InsightError::InvalidResponse(format!("topics are not valid JSON: {e}")))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("topics") {
            Some(Value::Array(items)) => items,
            _ => return Err(InsightError::InvalidResponse("missing \"topics\" array".into())),
        },
        _ => return Err(InsightError::InvalidResponse("unexpected topics shape".into())),
    };

    let topics: Vec<Topic> = items
        .iter()
        .filter_map(|item| {
            let name = item.get("topic_name")?.as_str()?.trim();
            let summary = item.get("summary")?.as_str()?.trim();
            if name.is_empty() || summary.is_empty() {
                return None;
            }
            let message_ids = item
                .get("message_ids")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(id_string).collect())
                .unwrap_or_default();
            Some(Topic {
                topic_name: name.to_string(),
                summary: summary.to_string(),
                message_ids,
            })
        })
        .take(max_topics)
        .collect();

    if topics.is_empty() {
        return Err(InsightError::InvalidResponse("no usable topics".into()));
    }
    Ok(topics)
}

fn question_from(value: &Value, topic_count: usize) -> Option<FollowUpQuestion> {
    let question = value.get("question")?.as_str()?.trim();
    let index = match value.get("index")? {
        Value::Number(n) => n.as_u64()? as usize,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (!question.is_empty() && (1..=topic_count).contains(&index)).then(|| FollowUpQuestion {
        question: question.to_string(),
        index,
    })
}

/// Parse follow-up questions, one JSON object per line or a JSON list.
/// Questions pointing at unknown topics are dropped.
pub fn parse_follow_ups(text: &str, topic_count: usize) -> Vec<FollowUpQuestion> {
    let whole = json_span(text).and_then(|span| serde_json::from_str::<Value>(span).ok());
    let items: Vec<Value> = match whole {
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut map)) if map.contains_key("questions") => match map.remove("questions") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => text
            .lines()
            .filter_map(|line| json_span(line).and_then(|s| serde_json::from_str(s).ok()))
            .collect(),
    };
    items
        .iter()
        .filter_map(|v| question_from(v, topic_count))
        .take(MAX_FOLLOW_UPS)
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Label from the most frequent content words of the representatives.
fn cluster_label(cluster: &MessageCluster) -> String {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for member in cluster.representatives() {
        for word in tokenize(&member.message.message) {
            if word.len() > 2 && !word.chars().all(|c| c.is_ascii_digit()) {
                *freq.entry(word).or_insert(0) += 1;
            }
        }
    }
    let mut sorted: Vec<(String, usize)> = freq.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let top: Vec<String> = sorted.into_iter().take(2).map(|(w, _)| capitalize(&w)).collect();
    if top.is_empty() {
        format!("Cluster {}", cluster.id)
    } else {
        top.join(" ")
    }
}

fn lead_text(cluster: &MessageCluster) -> String {
    let Some(lead) = cluster.representatives().first() else {
        return String::new();
    };
    let words: Vec<&str> = lead.message.message.split_whitespace().collect();
    if words.len() > EXTRACT_WORDS {
        format!("{}…", words[..EXTRACT_WORDS].join(" "))
    } else {
        words.join(" ")
    }
}

/// Summary without a model: the largest clusters first, one topic each.
pub fn extractive_summary(clusters: &[MessageCluster], max_topics: usize) -> TopicSummary {
    let mut ordered: Vec<&MessageCluster> = clusters.iter().filter(|c| !c.is_empty()).collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then(a.id.cmp(&b.id)));
    let topics = ordered
        .into_iter()
        .take(max_topics)
        .map(|cluster| Topic {
            topic_name: cluster_label(cluster),
            summary: lead_text(cluster),
            message_ids: cluster
                .representatives()
                .iter()
                .map(|m| m.message.message_id.to_string())
                .collect(),
        })
        .collect();
    TopicSummary {
        topics,
        extractive: true,
    }
}
