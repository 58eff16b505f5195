use thiserror::Error;

use agora_core::error::AgoraError;

/// Errors raised by language model providers and the response cache.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing credentials for {provider}")]
    MissingCredentials { provider: String },

    #[error("Unknown service '{name}'. Available: {available}")]
    UnknownProvider { name: String, available: String },

    #[error("No available AI providers:\n- {0}")]
    NoProviders(String),

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Model or endpoint not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether the request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Server { .. } => true,
            LlmError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for LlmError {
    fn from(err: rusqlite::Error) -> Self {
        LlmError::Cache(err.to_string())
    }
}

impl From<LlmError> for AgoraError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingCredentials { provider } => AgoraError::MissingCredentials { provider },
            LlmError::Cache(msg) => AgoraError::Cache(msg),
            other => AgoraError::Llm(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = LlmError::MissingCredentials {
            provider: "Gemini".into(),
        };
        assert_eq!(err.to_string(), "Missing credentials for Gemini");

        let err = LlmError::UnknownProvider {
            name: "bard".into(),
            available: "gemini, claude".into(),
        };
        assert_eq!(err.to_string(), "Unknown service 'bard'. Available: gemini, claude");
    }

    #[test]
    fn test_retryable() {
        assert!(LlmError::RateLimited { retry_after_secs: 1 }.is_retryable());
        assert!(LlmError::Server {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!LlmError::Unauthorized("bad key".into()).is_retryable());
    }

    #[test]
    fn test_into_agora_error() {
        let err: AgoraError = LlmError::MissingCredentials {
            provider: "Claude".into(),
        }
        .into();
        assert!(matches!(err, AgoraError::MissingCredentials { .. }));

        let err: AgoraError = LlmError::BadRequest("oops".into()).into();
        assert!(matches!(err, AgoraError::Llm(_)));
    }
}
