//! Error types for the provider layer

use thiserror::Error;

/// Provider-layer error types
#[derive(Error, Debug)]
pub enum AiError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{provider} returned HTTP {status}: {message}")]
    LlmHttp {
        provider: String,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{provider}/{model} returned an empty response")]
    EmptyResponse { provider: String, model: String },

    #[error("invalid structured output: {0}")]
    InvalidJson(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    /// Whether a transport-level retry is worthwhile.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::LlmHttp { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            AiError::Http(e) => e.is_timeout() || e.is_connect(),
            AiError::Llm(message) => {
                let lower = message.to_lowercase();
                lower.contains("timeout")
                    || lower.contains("rate limit")
                    || lower.contains("overloaded")
            }
            _ => false,
        }
    }

    /// Server-requested retry delay, if the response carried one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AiError::LlmHttp {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, AiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_retryability() {
        let retryable = AiError::LlmHttp {
            provider: "Gemini".to_string(),
            status: 429,
            message: "rate limit".to_string(),
            retry_after_secs: None,
        };
        let non_retryable = AiError::LlmHttp {
            provider: "Gemini".to_string(),
            status: 401,
            message: "unauthorized".to_string(),
            retry_after_secs: None,
        };
        assert!(retryable.is_retryable());
        assert!(!non_retryable.is_retryable());
    }

    #[test]
    fn test_llm_string_fallback_retryability() {
        assert!(AiError::Llm("request timeout".to_string()).is_retryable());
        assert!(!AiError::Llm("bad request".to_string()).is_retryable());
    }
}
