//! Deterministic mock LLM client for engine and scheduler tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

use crate::error::{AiError, Result};

use super::{
    GenerationRequest, GenerationResponse, JsonResponse, LlmClient, StreamChunk, StreamResult,
    TokenUsage,
};

/// Deterministic step for scripted mock completions.
#[derive(Debug, Clone)]
pub enum MockStepKind {
    /// Return plain text.
    Text(String),
    /// Return a structured JSON value.
    Json(Value),
    /// Return an LLM error.
    Error(String),
    /// Return a timeout-like error after optional delay.
    Timeout,
}

/// Scripted completion step with optional delay.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay_ms: u64,
    pub kind: MockStepKind,
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Text(content.into()),
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Json(value),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Error(message.into()),
        }
    }

    pub fn timeout(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            kind: MockStepKind::Timeout,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A deterministic mock LLM client driven by scripted steps. When the
/// script runs dry it echoes the prompt (plain generation) or repeats
/// `json_default` if one was configured (structured generation).
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    model: String,
    script: Arc<Mutex<VecDeque<MockStep>>>,
    json_default: Option<Value>,
}

impl MockLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            json_default: None,
        }
    }

    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            model: model.into(),
            script: Arc::new(Mutex::new(VecDeque::from(steps))),
            json_default: None,
        }
    }

    /// Repeat `value` for every structured call once the script is empty.
    pub fn with_json_default(mut self, value: Value) -> Self {
        self.json_default = Some(value);
        self
    }

    pub async fn push_step(&self, step: MockStep) {
        self.script.lock().await.push_back(step);
    }

    pub async fn remaining_steps(&self) -> usize {
        self.script.lock().await.len()
    }

    async fn next_step(&self) -> Option<MockStep> {
        self.script.lock().await.pop_front()
    }

    fn usage_for(content_len: usize) -> TokenUsage {
        let completion_tokens = content_len as u32;
        TokenUsage {
            prompt_tokens: 1,
            completion_tokens,
            total_tokens: 1 + completion_tokens,
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let Some(step) = self.next_step().await else {
            let text = format!("mock-echo: {}", request.prompt);
            return Ok(GenerationResponse {
                usage: Self::usage_for(text.len()),
                text,
            });
        };

        if step.delay_ms > 0 {
            sleep(Duration::from_millis(step.delay_ms)).await;
        }

        match step.kind {
            MockStepKind::Text(content) => Ok(GenerationResponse {
                usage: Self::usage_for(content.len()),
                text: content,
            }),
            MockStepKind::Json(value) => {
                let text = value.to_string();
                Ok(GenerationResponse {
                    usage: Self::usage_for(text.len()),
                    text,
                })
            }
            MockStepKind::Error(message) => Err(AiError::Llm(message)),
            MockStepKind::Timeout => Err(AiError::Llm("mock timeout".to_string())),
        }
    }

    async fn generate_json(
        &self,
        _request: GenerationRequest,
        _schema: Value,
    ) -> Result<JsonResponse> {
        let step = self.next_step().await;
        let Some(step) = step else {
            if let Some(value) = &self.json_default {
                return Ok(JsonResponse {
                    value: value.clone(),
                    usage: Self::usage_for(value.to_string().len()),
                });
            }
            return Err(AiError::Llm("mock json script exhausted".to_string()));
        };

        if step.delay_ms > 0 {
            sleep(Duration::from_millis(step.delay_ms)).await;
        }

        match step.kind {
            MockStepKind::Json(value) => Ok(JsonResponse {
                usage: Self::usage_for(value.to_string().len()),
                value,
            }),
            MockStepKind::Text(content) => {
                let value: Value = serde_json::from_str(&content)
                    .map_err(|e| AiError::InvalidJson(e.to_string()))?;
                Ok(JsonResponse {
                    usage: Self::usage_for(content.len()),
                    value,
                })
            }
            MockStepKind::Error(message) => Err(AiError::Llm(message)),
            MockStepKind::Timeout => Err(AiError::Llm("mock timeout".to_string())),
        }
    }

    fn generate_stream(&self, request: GenerationRequest) -> StreamResult {
        let client = self.clone();
        Box::pin(try_stream! {
            let response = client.generate(request).await?;

            if !response.text.is_empty() {
                yield StreamChunk::text(response.text);
            }

            yield StreamChunk::final_chunk(response.usage);
        })
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}
