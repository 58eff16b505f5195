use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AgoraError, Result};

/// Top-level configuration for the Agora application.
///
/// Loaded from `~/.agora/config.toml` by default, then overlaid with
/// environment variables (see [`AgoraConfig::apply_env`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgoraConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub insight: InsightConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
}

impl AgoraConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AgoraConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AgoraError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup.
    ///
    /// Empty values are ignored so that a blank line in a `.env` template
    /// does not wipe out a configured value.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AGORA_GRAPH_BACKEND") {
            self.graph.backend = v.parse()?;
        }
        if let Some(v) = get("AGORA_GRAPH_HOST") {
            self.graph.host = v;
        }
        if let Some(v) = get("AGORA_GRAPH_PORT") {
            self.graph.port = v
                .parse()
                .map_err(|_| AgoraError::Config(format!("AGORA_GRAPH_PORT is not a port: {v}")))?;
        }
        if let Some(v) = get("AGORA_GRAPH_USER") {
            self.graph.user = v;
        }
        if let Some(v) = get("AGORA_GRAPH_PASSWORD") {
            self.graph.password = v;
        }
        if let Some(v) = get("AGORA_GRAPH_DATABASE") {
            self.graph.database = v;
        }
        if let Some(v) = get("AGORA_LLM_PROVIDER") {
            self.llm.provider = Some(v);
        }
        if let Some(v) = get("AGORA_EMBEDDING_PROVIDER") {
            self.llm.embedding_provider = Some(v);
        }
        if let Some(v) = get("AGORA_HOST_USER_ID") {
            self.general.host_user_id = Some(v);
        }
        if let Some(v) = get("TELEGRAM_API_ID") {
            self.messaging.api_id = Some(v);
        }
        if let Some(v) = get("TELEGRAM_API_HASH") {
            self.messaging.api_hash = Some(v);
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.messaging.bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_PHONE") {
            self.messaging.phone = Some(v);
        }

        debug!(backend = %self.graph.backend, host = %self.graph.host, "Environment overrides applied");
        Ok(())
    }

    /// Reject values that would make the graph or pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.graph.semaphore_limit == 0 {
            return Err(AgoraError::Config(
                "graph.semaphore_limit must be greater than zero".into(),
            ));
        }
        if self.graph.page_limit == 0 {
            return Err(AgoraError::Config(
                "graph.page_limit must be greater than zero".into(),
            ));
        }
        if !(self.llm.temperature > 0.0 && self.llm.temperature <= 2.0) {
            return Err(AgoraError::Config(format!(
                "llm.temperature must be in (0, 2], got {}",
                self.llm.temperature
            )));
        }
        for (name, value) in [
            ("insight.engagement_threshold", self.insight.engagement_threshold),
            ("insight.fallback_ratio", self.insight.fallback_ratio),
            ("insight.summary_top_p", f64::from(self.insight.summary_top_p)),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AgoraError::Config(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.insight.min_cluster_size < 2 {
            return Err(AgoraError::Config(
                "insight.min_cluster_size must be at least 2".into(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite graph and the LLM cache.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Platform user id of the host-user, if exports do not flag `is_self`.
    pub host_user_id: Option<String>,
    /// Optional persona TOML file; the built-in persona is used otherwise.
    pub persona_file: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.agora/data".to_string(),
            log_level: "info".to_string(),
            host_user_id: None,
            persona_file: None,
        }
    }
}

/// Which graph backend to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    /// Embedded SQLite file under the data directory.
    #[default]
    Sqlite,
    /// Remote Neo4j server over bolt.
    Neo4j,
}

impl std::fmt::Display for GraphBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphBackend::Sqlite => write!(f, "sqlite"),
            GraphBackend::Neo4j => write!(f, "neo4j"),
        }
    }
}

impl std::str::FromStr for GraphBackend {
    type Err = AgoraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(GraphBackend::Sqlite),
            "neo4j" => Ok(GraphBackend::Neo4j),
            other => Err(AgoraError::Config(format!("Unknown graph backend: {other}"))),
        }
    }
}

/// Knowledge graph connection and query limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: GraphBackend,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Maximum number of graph operations in flight at once.
    pub semaphore_limit: usize,
    /// Default page size for listing nodes.
    pub page_limit: usize,
    /// Dimensions used when creating vector indexes.
    pub embedding_dimensions: usize,
}

impl GraphConfig {
    /// Bolt URI for the configured host and port.
    pub fn uri(&self) -> String {
        format!("bolt://{}:{}", self.host, self.port)
    }

    /// Whether switching to `other` requires a new connection.
    pub fn connection_changed(&self, other: &GraphConfig) -> bool {
        self.backend != other.backend
            || self.host != other.host
            || self.port != other.port
            || self.user != other.user
            || self.password != other.password
            || self.database != other.database
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Sqlite,
            host: "localhost".to_string(),
            port: 7687,
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
            database: "neo4j".to_string(),
            semaphore_limit: 10,
            page_limit: 10,
            embedding_dimensions: 768,
        }
    }
}

/// Defaults shared by all LLM providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Preferred provider name; the first provider with credentials is used when unset.
    pub provider: Option<String>,
    /// Provider used for embeddings; falls back to `provider`.
    pub embedding_provider: Option<String>,
    pub token_limit: u32,
    pub max_retries: u32,
    pub temperature: f32,
    /// HTTP timeout per request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            embedding_provider: None,
            token_limit: 1024,
            max_retries: 3,
            temperature: 1.0,
            request_timeout_secs: 60,
        }
    }
}

/// Message prioritisation and clustering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Messages scoring strictly above this pass the engagement filter.
    pub engagement_threshold: f64,
    /// Below this share of passing messages, the top-N fallback kicks in.
    pub fallback_ratio: f64,
    /// Lower bound on the fallback size.
    pub fallback_min: usize,
    pub embedding_batch_size: usize,
    pub min_cluster_size: usize,
    pub min_samples: usize,
    /// Neighbourhood radius in standardised feature space.
    pub epsilon: f64,
    /// Messages kept per cluster for summarisation.
    pub representatives_per_cluster: usize,
    pub summary_temperature: f32,
    pub summary_top_p: f32,
    pub max_topics: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            engagement_threshold: 0.75,
            fallback_ratio: 0.1,
            fallback_min: 1000,
            embedding_batch_size: 256,
            min_cluster_size: 2,
            min_samples: 2,
            epsilon: 0.7,
            representatives_per_cluster: 2,
            summary_temperature: 0.45,
            summary_top_p: 0.8,
            max_topics: 5,
        }
    }
}

/// Disk cache for LLM calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before a trial call.
    pub recovery_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 86_400,
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

/// Messaging platform credentials. Carried for completeness; Agora reads
/// chat exports and does not connect to the platform itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub bot_token: Option<String>,
    pub phone: Option<String>,
}

impl MessagingConfig {
    pub fn is_configured(&self) -> bool {
        (self.api_id.is_some() && self.api_hash.is_some()) || self.bot_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AgoraConfig::default();
        assert_eq!(config.general.data_dir, "~/.agora/data");
        assert_eq!(config.graph.backend, GraphBackend::Sqlite);
        assert_eq!(config.graph.port, 7687);
        assert_eq!(config.graph.semaphore_limit, 10);
        assert_eq!(config.graph.page_limit, 10);
        assert_eq!(config.llm.token_limit, 1024);
        assert_eq!(config.llm.max_retries, 3);
        assert!((config.insight.engagement_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.insight.embedding_batch_size, 256);
        assert!(config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = create_temp_config(
            r#"
[graph]
backend = "neo4j"
host = "graph.internal"
semaphore_limit = 4
"#,
        );
        let config = AgoraConfig::load(file.path()).unwrap();
        assert_eq!(config.graph.backend, GraphBackend::Neo4j);
        assert_eq!(config.graph.host, "graph.internal");
        assert_eq!(config.graph.semaphore_limit, 4);
        assert_eq!(config.graph.port, 7687);
        assert_eq!(config.insight.max_topics, 5);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("[graph\nport = ");
        assert!(AgoraConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AgoraConfig::load_or_default(Path::new("/nonexistent/agora.toml"));
        assert_eq!(config.graph.host, "localhost");
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = AgoraConfig::default();
        config.llm.provider = Some("groq".into());
        config.cache.ttl_secs = 30;
        config.save(&path).unwrap();

        let loaded = AgoraConfig::load(&path).unwrap();
        assert_eq!(loaded.llm.provider.as_deref(), Some("groq"));
        assert_eq!(loaded.cache.ttl_secs, 30);
    }

    #[test]
    fn test_apply_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("AGORA_GRAPH_BACKEND", "NEO4J"),
            ("AGORA_GRAPH_HOST", "db"),
            ("AGORA_GRAPH_PORT", "7688"),
            ("AGORA_GRAPH_PASSWORD", "secret"),
            ("AGORA_LLM_PROVIDER", "claude"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("AGORA_GRAPH_USER", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = AgoraConfig::default();
        config
            .apply_env_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.graph.backend, GraphBackend::Neo4j);
        assert_eq!(config.graph.uri(), "bolt://db:7688");
        assert_eq!(config.graph.password, "secret");
        assert_eq!(config.graph.user, "neo4j");
        assert_eq!(config.llm.provider.as_deref(), Some("claude"));
        assert!(config.messaging.is_configured());
    }

    #[test]
    fn test_apply_env_rejects_bad_port() {
        let mut config = AgoraConfig::default();
        let result = config.apply_env_with(|k| {
            (k == "AGORA_GRAPH_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(AgoraError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = AgoraConfig::default();
        config.graph.semaphore_limit = 0;
        assert!(config.validate().is_err());

        let mut config = AgoraConfig::default();
        config.llm.temperature = 0.0;
        assert!(config.validate().is_err());

        let mut config = AgoraConfig::default();
        config.insight.engagement_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_changed() {
        let a = GraphConfig::default();
        let mut b = a.clone();
        b.semaphore_limit = 3;
        assert!(!a.connection_changed(&b));
        b.password = "other".into();
        assert!(a.connection_changed(&b));
    }
}
