//! Deterministic offline model.
//!
//! Embeddings hash each lowercase word into a signed bucket, so texts that
//! share words land close together. Completions are served from a script.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{LlmError, Result};
use crate::model::LanguageModel;
use crate::types::{Completion, CompletionRequest};

pub const MOCK_PROVIDER: &str = "mock";

#[derive(Debug)]
pub struct MockModel {
    dimensions: usize,
    script: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    completion_calls: AtomicUsize,
}

impl MockModel {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            completion_calls: AtomicUsize::new(0),
        }
    }

    /// Queue completions, served in order.
    pub fn with_completions<I, S>(self, completions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut script) = self.script.lock() {
            script.extend(completions.into_iter().map(Into::into));
        }
        self
    }

    /// Served once the script is exhausted.
    pub fn with_default_completion(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn completion_calls(&self) -> usize {
        self.completion_calls.load(Ordering::SeqCst)
    }

    pub fn hash_embedding(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    fn provider(&self) -> &str {
        MOCK_PROVIDER
    }

    fn model_name(&self) -> &str {
        "hash-embedding"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        self.completion_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .map_err(|e| LlmError::InvalidResponse(format!("mock script poisoned: {e}")))?
            .pop_front();
        let text = next
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| LlmError::InvalidResponse("mock model has no scripted completion".into()))?;
        Ok(Completion {
            text,
            model: self.model_name().to_string(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.hash_embedding(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_embedding_dimension_and_determinism() {
        let model = MockModel::new(64);
        let a = model.embed(&["hello world".into()]).await.unwrap();
        let b = model.embed(&["Hello, world!".into()]).await.unwrap();
        assert_eq!(a[0].len(), 64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let model = MockModel::new(256);
        let base = model.hash_embedding("rust borrow checker lifetimes");
        let near = model.hash_embedding("the rust borrow checker");
        let far = model.hash_embedding("pizza recipe with basil");
        assert!(cosine(&base, &near) > cosine(&base, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let model = MockModel::new(8);
        assert!(model.hash_embedding("").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_scripted_completions() {
        let model = MockModel::new(4)
            .with_completions(["one"])
            .with_default_completion("again");
        let request = CompletionRequest::new().with_user("x");
        assert_eq!(model.complete(&request).await.unwrap().text, "one");
        assert_eq!(model.complete(&request).await.unwrap().text, "again");
        assert_eq!(model.completion_calls(), 2);

        let empty = MockModel::new(4);
        assert!(empty.complete(&request).await.is_err());
    }
}
