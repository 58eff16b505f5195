//! Digest generation for a chat export.

use chrono::Utc;
use tracing::{info, warn};

use agora_core::{AgoraError, ChatExport};

use crate::error::Result;
use crate::processor::MessageProcessor;
use crate::recorder::{GraphRecorder, RecordSummary};
use crate::summarizer::{extractive_summary, Summarizer};
use crate::types::Digest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestOptions {
    pub follow_ups: bool,
    /// Write clusters and topics to the graph.
    pub record: bool,
}

/// Filter, cluster, summarise and optionally record one export.
pub struct DigestService {
    processor: MessageProcessor,
    summarizer: Summarizer,
    recorder: Option<GraphRecorder>,
}

impl DigestService {
    pub fn new(processor: MessageProcessor, summarizer: Summarizer) -> Self {
        Self {
            processor,
            summarizer,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: GraphRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Fails before any model call when `options.record` is set and no
    /// recorder was configured.
    pub async fn run(&self, export: &ChatExport, options: DigestOptions) -> Result<Digest> {
        let recorder = match (options.record, &self.recorder) {
            (true, None) => {
                return Err(AgoraError::Config(
                    "Digest recording requested but no graph recorder is configured".into(),
                )
                .into())
            }
            (true, Some(recorder)) => Some(recorder),
            (false, _) => None,
        };

        let scored = self.processor.analyze(&export.messages).await?;
        let analyzed_messages = scored.len();
        let clusters = self.processor.cluster(scored)?;

        let summary = match self.summarizer.summarize(&clusters).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Summarization failed, using extractive summary");
                extractive_summary(&clusters, self.processor.config().max_topics)
            }
        };

        let follow_ups = if options.follow_ups && !summary.extractive {
            self.summarizer.follow_ups(&summary).await.unwrap_or_else(|e| {
                warn!(error = %e, "Follow-up questions failed");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let digest = Digest {
            platform: export.platform,
            chat_id: export.chat_id,
            title: export.title.clone(),
            total_messages: export.messages.len(),
            analyzed_messages,
            clusters,
            summary,
            follow_ups,
            generated_at: Utc::now(),
        };
        info!(
            chat_id = digest.chat_id,
            analyzed = digest.analyzed_messages,
            clusters = digest.clusters.len(),
            topics = digest.summary.topics.len(),
            "Digest generated"
        );

        if let Some(recorder) = recorder {
            Self::record(recorder, export, &digest).await?;
        }
        Ok(digest)
    }

    async fn record(
        recorder: &GraphRecorder,
        export: &ChatExport,
        digest: &Digest,
    ) -> Result<RecordSummary> {
        recorder.record_export(export).await?;
        recorder.record_digest(export, digest).await
    }
}

impl std::fmt::Debug for DigestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestService")
            .field("processor", &self.processor)
            .field("summarizer", &self.summarizer)
            .field("recorder", &self.recorder.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::InsightError;

    use agora_core::config::InsightConfig;
    use agora_core::{ChatMessage, Persona, PlatformType};
    use agora_graph::{KnowledgeGraph, NodeLabel};
    use agora_llm::MockModel;
    use chrono::{Duration, TimeZone};

    fn export() -> ChatExport {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut messages = Vec::new();
        for i in 0..3 {
            let mut a = ChatMessage::new(i, "rust release notes are out", t0);
            a.sender_id = Some("ana".into());
            messages.push(a);
            let mut b = ChatMessage::new(10 + i, "pizza night on friday", t0 + Duration::hours(1));
            b.sender_id = Some("lee".into());
            messages.push(b);
        }
        ChatExport {
            platform: PlatformType::Telegram,
            chat_id: 9,
            title: "General".into(),
            description: None,
            community: None,
            messages,
        }
    }

    fn offline() -> DigestService {
        let config = InsightConfig::default();
        DigestService::new(
            MessageProcessor::new(Arc::new(MockModel::new(8)), config.clone()),
            Summarizer::extractive(Persona::default(), config),
        )
    }

    #[tokio::test]
    async fn test_offline_digest() {
        let digest = offline().run(&export(), DigestOptions::default()).await.unwrap();
        assert_eq!(digest.total_messages, 6);
        assert_eq!(digest.clusters.len(), 2);
        assert!(digest.summary.extractive);
        assert_eq!(digest.summary.topics.len(), 2);
        assert!(digest.follow_ups.is_empty());
        assert!(digest.render().contains("• **"));
    }

    #[tokio::test]
    async fn test_record_without_graph_is_a_config_error() {
        let options = DigestOptions {
            follow_ups: false,
            record: true,
        };
        let err = offline().run(&export(), options).await.unwrap_err();
        assert!(matches!(err, InsightError::Core(AgoraError::Config(_))));
    }

    #[tokio::test]
    async fn test_bad_model_reply_falls_back() {
        let config = InsightConfig::default();
        let model = Arc::new(MockModel::new(8).with_default_completion("not json at all"));
        let service = DigestService::new(
            MessageProcessor::new(model.clone(), config.clone()),
            Summarizer::new(model, Persona::default(), config),
        );
        let options = DigestOptions {
            follow_ups: true,
            record: false,
        };
        let digest = service.run(&export(), options).await.unwrap();
        assert!(digest.summary.extractive);
        assert!(digest.follow_ups.is_empty());
    }

    #[tokio::test]
    async fn test_model_digest_with_follow_ups_and_recording() {
        let config = InsightConfig::default();
        let model = Arc::new(MockModel::new(8).with_completions([
            r#"{"topics": [{"topic_name": "Releases", "summary": "Notes are out.", "message_ids": ["0", "1"]}]}"#,
            r#"- {"question": "What is new?", "index": 1}"#,
        ]));
        let graph = Arc::new(KnowledgeGraph::in_memory().unwrap());
        let service = DigestService::new(
            MessageProcessor::new(model.clone(), config.clone()),
            Summarizer::new(model, Persona::default(), config),
        )
        .with_recorder(GraphRecorder::new(graph.clone()));

        let options = DigestOptions {
            follow_ups: true,
            record: true,
        };
        let digest = service.run(&export(), options).await.unwrap();
        assert!(!digest.summary.extractive);
        assert_eq!(digest.follow_ups.len(), 1);

        let stats = graph.stats().await.unwrap();
        assert_eq!(stats.nodes_with_label(NodeLabel::Cluster), 2);
        assert_eq!(stats.nodes_with_label(NodeLabel::Topic), 1);
        assert_eq!(stats.nodes_with_label(NodeLabel::Message), 6);
    }
}
