//! Message prioritisation: engagement filter, TF-IDF importance, embeddings
//! and density clustering.

use std::sync::Arc;

use tracing::{debug, info, warn};

use agora_core::config::InsightConfig;
use agora_core::ChatMessage;
use agora_llm::LanguageModel;

use crate::cluster::DensityClusterer;
use crate::error::{InsightError, Result};
use crate::features::{combine, standardize};
use crate::tfidf::TfidfMatrix;
use crate::types::{MessageCluster, ScoredMessage};

/// Keep messages scoring above the engagement threshold. When fewer than
/// `fallback_ratio` of the messages pass, take the top
/// `max(floor(n * fallback_ratio), fallback_min)` by score instead.
pub fn filter_by_engagement(messages: &[ChatMessage], config: &InsightConfig) -> Vec<ChatMessage> {
    let passing: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.engagement_score() > config.engagement_threshold)
        .cloned()
        .collect();

    let n = messages.len();
    if (passing.len() as f64) >= n as f64 * config.fallback_ratio {
        return passing;
    }

    let take = ((n as f64 * config.fallback_ratio).floor() as usize).max(config.fallback_min);
    debug!(passing = passing.len(), total = n, take, "Engagement fallback");
    let mut scored: Vec<(f64, &ChatMessage)> =
        messages.iter().map(|m| (m.engagement_score(), m)).collect();
    // Stable sort: equal scores keep export order.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(take).map(|(_, m)| m.clone()).collect()
}

pub struct MessageProcessor {
    embedder: Arc<dyn LanguageModel>,
    config: InsightConfig,
    clusterer: DensityClusterer,
}

impl MessageProcessor {
    pub fn new(embedder: Arc<dyn LanguageModel>, config: InsightConfig) -> Self {
        let clusterer = DensityClusterer::from_config(&config);
        Self {
            embedder,
            config,
            clusterer,
        }
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    /// Filter by engagement and attach importance scores and embeddings.
    pub async fn analyze(&self, messages: &[ChatMessage]) -> Result<Vec<ScoredMessage>> {
        let important = filter_by_engagement(messages, &self.config);
        if important.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = important.iter().map(|m| m.message.as_str()).collect();
        let importance = TfidfMatrix::fit_transform(&texts).importance();
        let embeddings = self.embed(&important).await?;

        Ok(important
            .into_iter()
            .zip(importance)
            .zip(embeddings)
            .map(|((message, importance), embedding)| ScoredMessage {
                message,
                importance,
                embedding: Some(embedding),
            })
            .collect())
    }

    /// Embed messages in batches of `embedding_batch_size`.
    async fn embed(&self, messages: &[ChatMessage]) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.config.embedding_batch_size.max(1);
        let mut embeddings = Vec::with_capacity(messages.len());
        for (i, batch) in messages.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(ChatMessage::embedding_text).collect();
            let vectors = self.embedder.embed(&texts).await.map_err(|e| {
                warn!(batch = i, error = %e, "Embedding batch failed");
                e
            })?;
            if vectors.len() != texts.len() {
                return Err(InsightError::Features(format!(
                    "model returned {} embeddings for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            embeddings.extend(vectors);
        }
        Ok(embeddings)
    }

    /// Cluster scored messages. Noise is dropped and each cluster is ordered
    /// by importance.
    pub fn cluster(&self, scored: Vec<ScoredMessage>) -> Result<Vec<MessageCluster>> {
        if scored.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings: Vec<Vec<f32>> = scored
            .iter()
            .map(|s| {
                s.embedding.clone().ok_or_else(|| {
                    InsightError::Features(format!(
                        "message {} has no embedding",
                        s.message.message_id
                    ))
                })
            })
            .collect::<Result<_>>()?;
        let timestamps: Vec<i64> = scored.iter().map(|s| s.message.timestamp.timestamp()).collect();

        let mut features = combine(&embeddings, &timestamps)?;
        standardize(&mut features);
        let groups = self.clusterer.groups(&features);

        let mut slots: Vec<Option<ScoredMessage>> = scored.into_iter().map(Some).collect();
        let clusters: Vec<MessageCluster> = groups
            .into_iter()
            .enumerate()
            .map(|(id, members)| {
                let members = members.into_iter().filter_map(|i| slots[i].take()).collect();
                MessageCluster::new(id, members, self.config.representatives_per_cluster)
            })
            .collect();

        let clustered: usize = clusters.iter().map(MessageCluster::len).sum();
        info!(
            clusters = clusters.len(),
            clustered,
            noise = slots.iter().filter(|s| s.is_some()).count(),
            "Messages clustered"
        );
        Ok(clusters)
    }

    /// `analyze` followed by `cluster`.
    pub async fn process(&self, messages: &[ChatMessage]) -> Result<Vec<MessageCluster>> {
        let scored = self.analyze(messages).await?;
        self.cluster(scored)
    }
}

impl std::fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("embedder", &self.embedder.model_name())
            .field("clusterer", &self.clusterer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_llm::MockModel;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn msg(id: i64, text: &str, minutes: i64) -> ChatMessage {
        ChatMessage::new(id, text, t0() + Duration::minutes(minutes))
    }

    fn engaged(id: i64) -> ChatMessage {
        let mut m = msg(id, "A long message with a link and plenty of reactions from people", 0);
        m.reaction_count = 12;
        m.has_link = true;
        m.media = Some(agora_core::MediaKind::Video);
        m
    }

    #[test]
    fn test_filter_keeps_engaged_messages() {
        let mut messages: Vec<ChatMessage> = (0..5).map(|i| msg(i, "hi", 0)).collect();
        messages.push(engaged(100));
        let config = InsightConfig::default();
        assert!(engaged(100).engagement_score() > config.engagement_threshold);

        // 1 of 6 passes, above the 10% ratio.
        let kept = filter_by_engagement(&messages, &config);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].message_id, 100);
    }

    #[test]
    fn test_filter_fallback_takes_top_by_score() {
        let mut messages: Vec<ChatMessage> = (0..4).map(|i| msg(i, "short", 0)).collect();
        messages[2].reaction_count = 5;
        let config = InsightConfig {
            fallback_min: 2,
            ..InsightConfig::default()
        };
        let kept = filter_by_engagement(&messages, &config);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].message_id, 2);
        assert_eq!(kept[1].message_id, 0);
    }

    #[test]
    fn test_filter_empty_input() {
        assert!(filter_by_engagement(&[], &InsightConfig::default()).is_empty());
    }

    #[tokio::test]
    async fn test_analyze_attaches_scores_and_embeddings() {
        let processor = MessageProcessor::new(
            Arc::new(MockModel::new(16)),
            InsightConfig {
                embedding_batch_size: 2,
                ..InsightConfig::default()
            },
        );
        let messages = vec![
            msg(1, "rust release notes", 0),
            msg(2, "ok", 1),
            msg(3, "pizza friday at the office with the whole team", 2),
        ];
        let scored = processor.analyze(&messages).await.unwrap();
        assert_eq!(scored.len(), 3);
        assert!(scored.iter().all(|s| s.embedding.as_ref().map(Vec::len) == Some(16)));
        // Nothing passes the threshold, so the fallback orders by engagement.
        assert_eq!(scored[0].message.message_id, 3);
        let importance = |id: i64| {
            scored
                .iter()
                .find(|s| s.message.message_id == id)
                .map(|s| s.importance)
                .unwrap()
        };
        assert!(importance(3) > importance(2));
    }

    #[tokio::test]
    async fn test_process_groups_repeated_threads() {
        let processor = MessageProcessor::new(Arc::new(MockModel::new(8)), InsightConfig::default());
        let mut messages = Vec::new();
        for i in 0..3 {
            messages.push(msg(i, "rust release notes are out", 0));
            messages.push(msg(10 + i, "pizza night on friday", 60));
        }
        let clusters = processor.process(&messages).await.unwrap();
        assert_eq!(clusters.len(), 2);
        for cluster in &clusters {
            assert_eq!(cluster.len(), 3);
            assert_eq!(cluster.representatives().len(), 2);
            let text = &cluster.members[0].message.message;
            assert!(cluster.members.iter().all(|m| &m.message.message == text));
        }
    }

    #[test]
    fn test_cluster_requires_embeddings() {
        let processor = MessageProcessor::new(Arc::new(MockModel::new(4)), InsightConfig::default());
        let scored = vec![ScoredMessage {
            message: msg(1, "x", 0),
            importance: 0.0,
            embedding: None,
        }];
        assert!(matches!(
            processor.cluster(scored),
            Err(InsightError::Features(_))
        ));
    }
}
