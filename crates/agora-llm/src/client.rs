//! HTTP client for the supported provider APIs.
//!
//! Request bodies and response parsing are plain functions over
//! `serde_json::Value` so they can be tested without a network.
//! Rate limits and server errors are retried with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{LlmError, Result};
use crate::model::LanguageModel;
use crate::provider::{ApiStyle, ProviderSettings};
use crate::types::{Completion, CompletionRequest, Role};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Base delay for exponential backoff (in milliseconds)
const BACKOFF_BASE_MS: u64 = 500;

/// Upper bound for a single backoff sleep
const BACKOFF_MAX_MS: u64 = 30_000;

/// Default wait when a 429 carries no hint
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

#[derive(Clone)]
pub struct HttpModel {
    http: HttpClient,
    settings: ProviderSettings,
}

impl std::fmt::Debug for HttpModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModel")
            .field("settings", &self.settings)
            .finish()
    }
}

impl HttpModel {
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        let http = HttpClient::builder().timeout(settings.timeout).build()?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn embedding_model(&self) -> Result<&str> {
        if !self.settings.kind.supports_embeddings() {
            return Err(LlmError::Unsupported {
                provider: self.settings.kind.display_name().to_string(),
                operation: "embeddings",
            });
        }
        self.settings
            .embedding_model_name
            .as_deref()
            .ok_or_else(|| LlmError::MissingCredentials {
                provider: format!("{} embeddings", self.settings.kind.display_name()),
            })
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(url, body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt <= self.settings.max_retries => {
                    let hint = match &e {
                        LlmError::RateLimited { retry_after_secs } => *retry_after_secs,
                        _ => 0,
                    };
                    let wait_ms = calculate_backoff(attempt, hint);
                    warn!(
                        provider = %self.settings.kind,
                        attempt,
                        wait_ms,
                        error = %e,
                        "Request failed, retrying after backoff"
                    );
                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, url: &str, body: &Value) -> Result<Value> {
        let mut request = self.http.post(url).json(body);
        if let Some(key) = &self.settings.api_key {
            request = match self.settings.kind.api_style() {
                ApiStyle::OpenAi => request.bearer_auth(key),
                ApiStyle::Anthropic => request
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION),
                ApiStyle::Gemini => request.header("x-goog-api-key", key),
            };
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, retry_after, &body));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl LanguageModel for HttpModel {
    fn provider(&self) -> &str {
        self.settings.kind.name()
    }

    fn model_name(&self) -> &str {
        &self.settings.model_name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let style = self.settings.kind.api_style();
        let (url, body) = match style {
            ApiStyle::OpenAi => (
                format!("{}/chat/completions", self.settings.base_url),
                openai_chat_body(&self.settings, request),
            ),
            ApiStyle::Anthropic => (
                format!("{}/v1/messages", self.settings.base_url),
                anthropic_body(&self.settings, request),
            ),
            ApiStyle::Gemini => (
                format!(
                    "{}/models/{}:generateContent",
                    self.settings.base_url, self.settings.model_name
                ),
                gemini_body(&self.settings, request),
            ),
        };

        debug!(
            provider = %self.settings.kind,
            model = %self.settings.model_name,
            messages = request.messages.len(),
            "Sending completion request"
        );
        let response = self.post_json(&url, &body).await?;
        let mut completion = match style {
            ApiStyle::OpenAi => parse_openai_chat(&response)?,
            ApiStyle::Anthropic => parse_anthropic(&response)?,
            ApiStyle::Gemini => parse_gemini(&response)?,
        };
        if completion.model.is_empty() {
            completion.model = self.settings.model_name.clone();
        }
        Ok(completion)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.embedding_model()?;
        debug!(provider = %self.settings.kind, model, count = texts.len(), "Sending embedding request");

        let vectors = match self.settings.kind.api_style() {
            ApiStyle::OpenAi => {
                let url = format!("{}/embeddings", self.settings.base_url);
                let response = self.post_json(&url, &json!({ "model": model, "input": texts })).await?;
                parse_openai_embeddings(&response)?
            }
            ApiStyle::Gemini => {
                let url = format!("{}/models/{model}:batchEmbedContents", self.settings.base_url);
                let response = self.post_json(&url, &gemini_embed_body(model, texts)).await?;
                parse_gemini_embeddings(&response)?
            }
            ApiStyle::Anthropic => {
                return Err(LlmError::Unsupported {
                    provider: self.settings.kind.display_name().to_string(),
                    operation: "embeddings",
                })
            }
        };

        if vectors.len() != texts.len() {
            return Err(LlmError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

// =============================================================================
// Request bodies
// =============================================================================

fn sampling(settings: &ProviderSettings, request: &CompletionRequest) -> (f32, u32) {
    (
        request.temperature.unwrap_or(settings.temperature),
        request.max_tokens.unwrap_or(settings.token_limit),
    )
}

pub fn openai_chat_body(settings: &ProviderSettings, request: &CompletionRequest) -> Value {
    let (temperature, max_tokens) = sampling(settings, request);
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();
    let mut body = json!({
        "model": settings.model_name,
        "messages": messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });
    if let Some(top_p) = request.top_p {
        body["top_p"] = json!(top_p);
    }
    if request.json_output {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

pub fn anthropic_body(settings: &ProviderSettings, request: &CompletionRequest) -> Value {
    let (temperature, max_tokens) = sampling(settings, request);
    let messages: Vec<Value> = request
        .conversation()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();
    let mut body = json!({
        "model": settings.model_name,
        "max_tokens": max_tokens,
        "temperature": temperature,
        "messages": messages,
    });
    if let Some(system) = request.system_prompt() {
        body["system"] = json!(system);
    }
    if let Some(top_p) = request.top_p {
        body["top_p"] = json!(top_p);
    }
    body
}

pub fn gemini_body(settings: &ProviderSettings, request: &CompletionRequest) -> Value {
    let (temperature, max_tokens) = sampling(settings, request);
    let contents: Vec<Value> = request
        .conversation()
        .map(|m| {
            let role = if m.role == Role::Assistant { "model" } else { "user" };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();
    let mut generation = json!({
        "temperature": temperature,
        "maxOutputTokens": max_tokens,
    });
    if let Some(top_p) = request.top_p {
        generation["topP"] = json!(top_p);
    }
    if request.json_output {
        generation["responseMimeType"] = json!("application/json");
    }
    let mut body = json!({ "contents": contents, "generationConfig": generation });
    if let Some(system) = request.system_prompt() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

pub fn gemini_embed_body(model: &str, texts: &[String]) -> Value {
    let requests: Vec<Value> = texts
        .iter()
        .map(|t| json!({ "model": format!("models/{model}"), "content": { "parts": [{ "text": t }] } }))
        .collect();
    json!({ "requests": requests })
}

// =============================================================================
// Response parsing
// =============================================================================

fn token_count(value: &Value, pointer: &str) -> u32 {
    value.pointer(pointer).and_then(Value::as_u64).unwrap_or(0) as u32
}

fn model_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

pub fn parse_openai_chat(value: &Value) -> Result<Completion> {
    let text = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::InvalidResponse("no choices[0].message.content".into()))?;
    Ok(Completion {
        text: text.to_string(),
        model: model_field(value, "model"),
        input_tokens: token_count(value, "/usage/prompt_tokens"),
        output_tokens: token_count(value, "/usage/completion_tokens"),
    })
}

pub fn parse_anthropic(value: &Value) -> Result<Completion> {
    let blocks = value
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse("no content blocks".into()))?;
    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    Ok(Completion {
        text,
        model: model_field(value, "model"),
        input_tokens: token_count(value, "/usage/input_tokens"),
        output_tokens: token_count(value, "/usage/output_tokens"),
    })
}

pub fn parse_gemini(value: &Value) -> Result<Completion> {
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse("no candidates[0].content.parts".into()))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Ok(Completion {
        text,
        model: model_field(value, "modelVersion"),
        input_tokens: token_count(value, "/usageMetadata/promptTokenCount"),
        output_tokens: token_count(value, "/usageMetadata/candidatesTokenCount"),
    })
}

fn float_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

pub fn parse_openai_embeddings(value: &Value) -> Result<Vec<Vec<f32>>> {
    let data = value
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse("no embedding data".into()))?;
    let mut indexed: Vec<(u64, Vec<f32>)> = data
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let index = item.get("index").and_then(Value::as_u64).unwrap_or(i as u64);
            item.get("embedding")
                .and_then(float_vector)
                .map(|v| (index, v))
                .ok_or_else(|| LlmError::InvalidResponse("malformed embedding".into()))
        })
        .collect::<Result<_>>()?;
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

pub fn parse_gemini_embeddings(value: &Value) -> Result<Vec<Vec<f32>>> {
    value
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse("no embeddings".into()))?
        .iter()
        .map(|item| {
            item.get("values")
                .and_then(float_vector)
                .ok_or_else(|| LlmError::InvalidResponse("malformed embedding".into()))
        })
        .collect()
}

// =============================================================================
// Errors & backoff
// =============================================================================

fn retry_after_header(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Extract a retry-after hint from a JSON error body.
fn extract_retry_after(body: &str) -> Option<u64> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.get("retry_after")
        .or_else(|| json.pointer("/error/retry_after"))
        .and_then(Value::as_u64)
}

pub fn error_for_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Unauthorized(body.to_string()),
        429 => LlmError::RateLimited {
            retry_after_secs: retry_after
                .or_else(|| extract_retry_after(body))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        400 | 422 => LlmError::BadRequest(body.to_string()),
        404 => LlmError::NotFound(body.to_string()),
        code @ 500..=599 => LlmError::Server {
            status: code,
            body: body.to_string(),
        },
        code => LlmError::Http {
            status: code,
            body: body.to_string(),
        },
    }
}

/// Exponential backoff in milliseconds, never shorter than the server hint.
fn calculate_backoff(attempt: u32, suggested_wait_secs: u64) -> u64 {
    let exponential = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    let delay = exponential.max(suggested_wait_secs.saturating_mul(1000));
    let jitter = delay / 10;
    (delay + rand_jitter() % jitter.max(1)).min(BACKOFF_MAX_MS.max(suggested_wait_secs * 1000))
}

fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0)
}
