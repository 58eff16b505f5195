//! Agora insight crate: turns a chat export into a digest.
//!
//! - Engagement filtering and TF-IDF importance
//! - Embedding plus time features, density clustering
//! - LLM topic summaries with an extractive fallback
//! - Entity and preference extraction into the knowledge graph

pub mod cluster;
pub mod digest;
pub mod entity;
pub mod error;
pub mod features;
pub mod preference;
pub mod processor;
pub mod prompts;
pub mod recorder;
pub mod summarizer;
pub mod tfidf;
pub mod types;

pub use cluster::DensityClusterer;
pub use digest::{DigestOptions, DigestService};
pub use entity::EntityExtractor;
pub use error::{InsightError, Result};
pub use preference::PreferenceExtractor;
pub use processor::{filter_by_engagement, MessageProcessor};
pub use recorder::{GraphRecorder, RecordSummary};
pub use summarizer::{extractive_summary, Summarizer};
pub use tfidf::TfidfMatrix;
pub use types::{
    Digest, EntityKind, ExtractedEntity, ExtractedPreference, FollowUpQuestion, MessageCluster,
    Polarity, ScoredMessage, Topic, TopicSummary,
};
