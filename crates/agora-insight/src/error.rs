use agora_core::AgoraError;
use agora_llm::LlmError;
use thiserror::Error;

/// Errors that can occur in the insight pipeline.
#[derive(Error, Debug)]
pub enum InsightError {
    #[error("model error: {0}")]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Core(#[from] AgoraError),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("feature error: {0}")]
    Features(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}

impl From<InsightError> for AgoraError {
    fn from(err: InsightError) -> Self {
        match err {
            InsightError::Llm(e) => e.into(),
            InsightError::Core(e) => e,
            InsightError::InvalidResponse(msg) => AgoraError::Llm(msg),
            other => AgoraError::Validation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_features() {
        let e = InsightError::Features("3 embeddings for 4 messages".to_string());
        assert_eq!(e.to_string(), "feature error: 3 embeddings for 4 messages");
    }

    #[test]
    fn test_error_display_insufficient_data() {
        let e = InsightError::InsufficientData("no messages".to_string());
        assert_eq!(e.to_string(), "insufficient data: no messages");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let e: InsightError = AgoraError::Graph("down".into()).into();
        assert_eq!(e.to_string(), "Graph error: down");
        let back: AgoraError = e.into();
        assert!(matches!(back, AgoraError::Graph(_)));
    }

    #[test]
    fn test_llm_error_keeps_credentials_variant() {
        let e: InsightError = LlmError::MissingCredentials {
            provider: "Groq".into(),
        }
        .into();
        let core: AgoraError = e.into();
        assert!(matches!(core, AgoraError::MissingCredentials { .. }));
    }

    #[test]
    fn test_invalid_response_maps_to_llm() {
        let core: AgoraError = InsightError::InvalidResponse("not json".into()).into();
        assert_eq!(core.to_string(), "LLM error: not json");
    }
}
