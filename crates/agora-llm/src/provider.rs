//! Supported providers and their environment-driven settings.

use std::time::Duration;

use agora_core::config::LlmConfig;

use crate::error::{LlmError, Result};

/// Wire protocol spoken by a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiStyle {
    /// `/chat/completions` and `/embeddings`.
    OpenAi,
    /// `/v1/messages`.
    Anthropic,
    /// `:generateContent` and `:batchEmbedContents`.
    Gemini,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gemini,
    Claude,
    DeepSeek,
    Groq,
    Mistral,
    Ollama,
    OpenAi,
    OpenRouter,
    Xai,
}

impl ProviderKind {
    /// Registry order; also the fallback order when no provider is named.
    pub const ALL: [ProviderKind; 9] = [
        ProviderKind::Gemini,
        ProviderKind::Claude,
        ProviderKind::DeepSeek,
        ProviderKind::Groq,
        ProviderKind::Mistral,
        ProviderKind::Ollama,
        ProviderKind::OpenAi,
        ProviderKind::OpenRouter,
        ProviderKind::Xai,
    ];

    /// Registry key.
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Claude => "claude",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Groq => "groq",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Xai => "xai",
        }
    }

    /// Human-readable name used in error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Claude => "Claude",
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::Groq => "Groq",
            ProviderKind::Mistral => "Mistral",
            ProviderKind::Ollama => "Ollama",
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::OpenRouter => "OpenRouter",
            ProviderKind::Xai => "xAI",
        }
    }

    pub fn env_prefix(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI",
            ProviderKind::Claude => "CLAUDE",
            ProviderKind::DeepSeek => "DEEPSEEK",
            ProviderKind::Groq => "GROQ",
            ProviderKind::Mistral => "MISTRAL",
            ProviderKind::Ollama => "OLLAMA",
            ProviderKind::OpenAi => "OPENAI",
            ProviderKind::OpenRouter => "OPENROUTER",
            ProviderKind::Xai => "XAI",
        }
    }

    pub fn api_style(self) -> ApiStyle {
        match self {
            ProviderKind::Gemini => ApiStyle::Gemini,
            ProviderKind::Claude => ApiStyle::Anthropic,
            _ => ApiStyle::OpenAi,
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::Claude => "https://api.anthropic.com",
            ProviderKind::DeepSeek => "https://api.deepseek.com",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
            ProviderKind::Mistral => "https://api.mistral.ai/v1",
            ProviderKind::Ollama => "http://localhost:11434/v1",
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Xai => "https://api.x.ai/v1",
        }
    }

    /// Local Ollama runs without a key.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    pub fn supports_embeddings(self) -> bool {
        !matches!(
            self,
            ProviderKind::Claude | ProviderKind::DeepSeek | ProviderKind::Groq
        )
    }

    /// Comma-separated registry keys, in order.
    pub fn available() -> String {
        Self::ALL.map(ProviderKind::name).join(", ")
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == name)
            .ok_or_else(|| LlmError::UnknownProvider {
                name,
                available: Self::available(),
            })
    }
}

/// Everything needed to talk to one provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub model_name: String,
    pub embedding_model_name: Option<String>,
    pub base_url: String,
    pub token_limit: u32,
    pub max_retries: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ProviderSettings {
    /// Read `{PREFIX}_API_KEY`, `{PREFIX}_MODEL_NAME`, `{PREFIX}_BASE_URL` and
    /// `{PREFIX}_EMBEDDING_MODEL_NAME` through `lookup`. Empty values count
    /// as unset.
    pub fn from_env_with<F>(kind: ProviderKind, config: &LlmConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = kind.env_prefix();
        let read = |suffix: &str| {
            lookup(&format!("{prefix}_{suffix}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let missing = || LlmError::MissingCredentials {
            provider: kind.display_name().to_string(),
        };

        let model_name = read("MODEL_NAME").ok_or_else(missing)?;
        let api_key = read("API_KEY");
        if kind.requires_api_key() && api_key.is_none() {
            return Err(missing());
        }
        let embedding_model_name = read("EMBEDDING_MODEL_NAME");
        // Gemini embeddings are part of its required configuration.
        if kind == ProviderKind::Gemini && embedding_model_name.is_none() {
            return Err(missing());
        }

        Ok(Self {
            kind,
            api_key,
            model_name,
            embedding_model_name,
            base_url: read("BASE_URL")
                .unwrap_or_else(|| kind.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            token_limit: config.token_limit,
            max_retries: config.max_retries,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn from_env(kind: ProviderKind, config: &LlmConfig) -> Result<Self> {
        Self::from_env_with(kind, config, |key| std::env::var(key).ok())
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_name", &self.model_name)
            .field("embedding_model_name", &self.embedding_model_name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_registry_order() {
        assert_eq!(
            ProviderKind::available(),
            "gemini, claude, deepseek, groq, mistral, ollama, openai, openrouter, xai"
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("OpenRouter".parse::<ProviderKind>().unwrap(), ProviderKind::OpenRouter);
        let err = "bard".parse::<ProviderKind>().unwrap_err();
        assert!(err.to_string().starts_with("Unknown service 'bard'. Available: gemini"));
    }

    #[test]
    fn test_openai_settings_from_env() {
        let lookup = env(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL_NAME", "gpt-4o-mini"),
            ("OPENAI_EMBEDDING_MODEL_NAME", "text-embedding-3-small"),
        ]);
        let settings =
            ProviderSettings::from_env_with(ProviderKind::OpenAi, &LlmConfig::default(), lookup)
                .unwrap();
        assert_eq!(settings.model_name, "gpt-4o-mini");
        assert_eq!(settings.base_url, "https://api.openai.com/v1");
        assert_eq!(settings.token_limit, 1024);
        assert_eq!(settings.max_retries, 3);
        assert!(!format!("{settings:?}").contains("sk-test"));
    }

    #[test]
    fn test_missing_key_is_missing_credentials() {
        let lookup = env(&[("CLAUDE_MODEL_NAME", "claude-3-5-haiku")]);
        let err = ProviderSettings::from_env_with(ProviderKind::Claude, &LlmConfig::default(), lookup)
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing credentials for Claude");
    }

    #[test]
    fn test_empty_model_name_is_missing() {
        let lookup = env(&[("GROQ_API_KEY", "k"), ("GROQ_MODEL_NAME", "  ")]);
        assert!(matches!(
            ProviderSettings::from_env_with(ProviderKind::Groq, &LlmConfig::default(), lookup),
            Err(LlmError::MissingCredentials { .. })
        ));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let lookup = env(&[
            ("OLLAMA_MODEL_NAME", "llama3"),
            ("OLLAMA_BASE_URL", "http://gpu-box:11434/v1/"),
        ]);
        let settings =
            ProviderSettings::from_env_with(ProviderKind::Ollama, &LlmConfig::default(), lookup)
                .unwrap();
        assert!(settings.api_key.is_none());
        assert_eq!(settings.base_url, "http://gpu-box:11434/v1");
    }

    #[test]
    fn test_gemini_requires_embedding_model() {
        let lookup = env(&[("GEMINI_API_KEY", "k"), ("GEMINI_MODEL_NAME", "gemini-1.5-flash")]);
        assert!(
            ProviderSettings::from_env_with(ProviderKind::Gemini, &LlmConfig::default(), lookup)
                .is_err()
        );
    }
}
