//! Provider selection.
//!
//! A named provider is built or fails with its own error. Without a name,
//! providers are tried in registry order and the first one with valid
//! credentials wins.

use std::sync::Arc;

use tracing::{debug, info};

use agora_core::config::LlmConfig;

use crate::client::HttpModel;
use crate::error::{LlmError, Result};
use crate::model::LanguageModel;
use crate::provider::{ProviderKind, ProviderSettings};

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct ProviderRegistry {
    config: LlmConfig,
    lookup: Lookup,
}

impl ProviderRegistry {
    /// Registry reading credentials from the process environment.
    pub fn from_env(config: LlmConfig) -> Self {
        Self::with_lookup(config, |key| std::env::var(key).ok())
    }

    pub fn with_lookup<F>(config: LlmConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            config,
            lookup: Arc::new(lookup),
        }
    }

    pub fn settings(&self, kind: ProviderKind) -> Result<ProviderSettings> {
        ProviderSettings::from_env_with(kind, &self.config, |key| (self.lookup)(key))
    }

    /// Credential status of every provider, in registry order.
    pub fn status(&self) -> Vec<(ProviderKind, Result<ProviderSettings>)> {
        ProviderKind::ALL
            .into_iter()
            .map(|kind| (kind, self.settings(kind)))
            .collect()
    }

    /// Resolve settings for `name`, or for the first available provider.
    pub fn select_settings(&self, name: Option<&str>) -> Result<ProviderSettings> {
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            let kind: ProviderKind = name.parse()?;
            return self.settings(kind);
        }

        let mut errors = Vec::new();
        for (kind, settings) in self.status() {
            match settings {
                Ok(settings) => {
                    debug!(provider = %kind, "Selected first available provider");
                    return Ok(settings);
                }
                Err(e) => errors.push(format!("{kind}: {e}")),
            }
        }
        Err(LlmError::NoProviders(errors.join("\n- ")))
    }

    pub fn select(&self, name: Option<&str>) -> Result<Arc<dyn LanguageModel>> {
        let settings = self.select_settings(name)?;
        info!(
            provider = %settings.kind,
            model = %settings.model_name,
            "Language model selected"
        );
        Ok(Arc::new(HttpModel::new(settings)?))
    }

    /// The chat model named in config (or the first available one).
    pub fn chat_model(&self) -> Result<Arc<dyn LanguageModel>> {
        self.select(self.config.provider.as_deref())
    }

    /// The embedding model: `embedding_provider`, else `provider`, else the
    /// first available provider that supports embeddings.
    pub fn embedding_model(&self) -> Result<Arc<dyn LanguageModel>> {
        let preferred = self
            .config
            .embedding_provider
            .as_deref()
            .or(self.config.provider.as_deref());
        if preferred.is_some() {
            return self.select(preferred);
        }

        let mut errors = Vec::new();
        for (kind, settings) in self.status() {
            if !kind.supports_embeddings() {
                continue;
            }
            match settings {
                Ok(settings) if settings.embedding_model_name.is_some() => {
                    return Ok(Arc::new(HttpModel::new(settings)?));
                }
                Ok(_) => errors.push(format!("{kind}: no embedding model configured")),
                Err(e) => errors.push(format!("{kind}: {e}")),
            }
        }
        Err(LlmError::NoProviders(errors.join("\n- ")))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
