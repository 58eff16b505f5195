use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Completion, CompletionRequest};

/// A chat and embedding model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider registry key, e.g. "openai".
    fn provider(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Embed each text; output order matches input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    fn provider(&self) -> &str {
        (**self).provider()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        (**self).complete(request).await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts).await
    }
}
