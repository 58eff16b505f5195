//! Agora LLM crate - language model providers.
//!
//! Provider settings come from the environment. [`ProviderRegistry`] picks a
//! provider, [`HttpModel`] talks to it over HTTP, and [`CachedModel`] keeps
//! responses in a [`DiskCache`] guarded by a [`CircuitBreaker`].

pub mod breaker;
pub mod cache;
pub mod client;
pub mod error;
pub mod mock;
pub mod model;
pub mod provider;
pub mod registry;
pub mod types;

pub use breaker::{BreakerState, CircuitBreaker};
pub use cache::{cache_key, CachedModel, DiskCache};
pub use client::HttpModel;
pub use error::LlmError;
pub use mock::MockModel;
pub use model::LanguageModel;
pub use provider::{ApiStyle, ProviderKind, ProviderSettings};
pub use registry::ProviderRegistry;
pub use types::{Completion, CompletionRequest, PromptMessage, Role};
