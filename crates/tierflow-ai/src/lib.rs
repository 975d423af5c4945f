//! TierFlow AI - provider layer for the scheduling engine
//!
//! Exposes a single `LlmClient` abstraction with plain, JSON-structured,
//! and streaming generation, a Gemini REST implementation, a scripted
//! mock client for deterministic tests, and a retry decorator.

pub mod error;
pub mod http_client;
pub mod llm;

pub use error::{AiError, Result};
pub use llm::{
    GeminiClient, GenerationRequest, GenerationResponse, JsonResponse, LlmClient, LlmRetryConfig,
    MockLlmClient, MockStep, MockStepKind, RetryingLlmClient, StreamChunk, StreamResult,
    TierClients, TokenUsage, tier_clients,
};
