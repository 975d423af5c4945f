//! LLM module - provider-agnostic client abstraction

mod client;
mod factory;
mod gemini;
mod mock_client;
mod retry;

pub use client::{
    GenerationRequest, GenerationResponse, JsonResponse, LlmClient, StreamChunk, StreamResult,
    TokenUsage,
};
pub use factory::{TierClients, tier_clients};
pub use gemini::GeminiClient;
pub use mock_client::{MockLlmClient, MockStep, MockStepKind};
pub use retry::{LlmRetryConfig, RetryingLlmClient};
