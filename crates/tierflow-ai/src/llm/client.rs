//! LLM client trait and request/response types

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::error::{AiError, Result};

/// Token usage statistics reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single generation request. Clients are bound to one model, so the
/// request carries only per-call parameters.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_output_tokens: None,
            temperature: None,
        }
    }

    /// Set the system instruction
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Cap the output token count
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Set sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Plain-text completion plus usage metadata.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub usage: TokenUsage,
}

/// Structured-output completion: the parsed JSON value plus usage.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub value: Value,
    pub usage: TokenUsage,
}

/// Incremental streaming output. The final chunk carries the usage
/// metadata and an empty delta.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text: delta.into(),
            usage: None,
        }
    }

    pub fn final_chunk(usage: TokenUsage) -> Self {
        Self {
            text: String::new(),
            usage: Some(usage),
        }
    }
}

pub type StreamResult = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// LLM client trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Get provider name
    fn provider(&self) -> &str;

    /// Get model name
    fn model(&self) -> &str;

    /// Generate a plain-text completion
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse>;

    /// Generate structured JSON output conforming to `schema`
    async fn generate_json(&self, request: GenerationRequest, schema: Value)
    -> Result<JsonResponse>;

    /// Stream a completion; the default refuses for providers without
    /// streaming support.
    fn generate_stream(&self, _request: GenerationRequest) -> StreamResult {
        let provider = self.provider().to_string();
        Box::pin(futures::stream::once(async move {
            Err(AiError::Llm(format!(
                "{provider} does not support streaming"
            )))
        }))
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}
