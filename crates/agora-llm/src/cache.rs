//! Persistent response cache with per-entry TTL.
//!
//! Cache failures never fail the caller: they are logged, counted by the
//! circuit breaker, and the computation runs uncached.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use agora_core::config::CacheConfig;

use crate::breaker::CircuitBreaker;
use crate::error::{LlmError, Result};
use crate::model::LanguageModel;
use crate::types::{Completion, CompletionRequest};

/// Build a cache key `module:function[:owner][:params-json]`.
pub fn cache_key<P: Serialize + ?Sized>(
    module: &str,
    function: &str,
    owner: Option<&str>,
    params: &P,
) -> Result<String> {
    let mut parts = vec![module.to_string(), function.to_string()];
    if let Some(owner) = owner.filter(|o| !o.is_empty()) {
        parts.push(owner.to_string());
    }
    let params = serde_json::to_value(params)?;
    let empty = match &params {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if !empty {
        parts.push(serde_json::to_string(&params)?);
    }
    Ok(parts.join(":"))
}

pub struct DiskCache {
    conn: Mutex<Connection>,
    ttl: Duration,
    breaker: CircuitBreaker,
}

impl DiskCache {
    pub fn open(path: &Path, config: &CacheConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LlmError::Cache(e.to_string()))?;
        }
        Self::with_connection(Connection::open(path)?, config)
    }

    pub fn in_memory(config: &CacheConfig) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    fn with_connection(conn: Connection, config: &CacheConfig) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS cache (
                 key         TEXT PRIMARY KEY NOT NULL,
                 value       TEXT NOT NULL,
                 expires_at  INTEGER NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl: Duration::from_secs(config.ttl_secs),
            breaker: CircuitBreaker::new(
                config.failure_threshold,
                Duration::from_secs(config.recovery_timeout_secs),
            ),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| LlmError::Cache(format!("cache lock poisoned: {e}")))?;
        f(&conn)
    }

    /// Fetch an unexpired entry. Expired entries are removed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let now = Utc::now().timestamp();
        self.with_conn(|conn| {
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT value, expires_at FROM cache WHERE key = ?1",
                    [key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some((value, expires_at)) if expires_at > now => {
                    Ok(Some(serde_json::from_str(&value)?))
                }
                Some(_) => {
                    conn.execute("DELETE FROM cache WHERE key = ?1", [key])?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.ttl)
    }

    pub fn set_with_ttl<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cache (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                rusqlite::params![key, json, expires_at],
            )?;
            Ok(())
        })
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM cache WHERE expires_at <= ?1", [now])?))
    }

    pub fn clear(&self) -> Result<()> {
        self.with_conn(|conn| Ok(conn.execute_batch("DELETE FROM cache;")?))
    }

    /// Return the cached value for `key`, or run `compute` and cache its
    /// result. Errors from `compute` are returned; cache errors are not.
    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.breaker.allow() {
            debug!(key, "Cache circuit open, computing directly");
            return compute().await;
        }

        match self.get::<T>(key) {
            Ok(Some(hit)) => {
                self.breaker.record_success();
                debug!(key, "Cache hit");
                return Ok(hit);
            }
            Ok(None) => self.breaker.record_success(),
            Err(e) => {
                warn!(key, error = %e, "Caching error");
                self.breaker.record_failure();
                return compute().await;
            }
        }

        let value = compute().await?;
        if let Err(e) = self.set(key, &value) {
            warn!(key, error = %e, "Caching error");
            self.breaker.record_failure();
        }
        Ok(value)
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("ttl", &self.ttl)
            .field("breaker", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

/// Caches completions and embeddings of the wrapped model.
pub struct CachedModel<M> {
    inner: M,
    cache: Arc<DiskCache>,
}

impl<M: LanguageModel> CachedModel<M> {
    pub fn new(inner: M, cache: Arc<DiskCache>) -> Self {
        Self { inner, cache }
    }

    fn owner(&self) -> String {
        format!("{}/{}", self.inner.provider(), self.inner.model_name())
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for CachedModel<M> {
    fn provider(&self) -> &str {
        self.inner.provider()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let key = cache_key("agora_llm", "complete", Some(&self.owner()), request)?;
        self.cache
            .get_or_compute(&key, || self.inner.complete(request))
            .await
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let key = cache_key("agora_llm", "embed", Some(&self.owner()), texts)?;
        self.cache.get_or_compute(&key, || self.inner.embed(texts)).await
    }
}
