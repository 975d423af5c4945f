//! Gemini LLM provider

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AiError, Result};
use crate::http_client::build_http_client;
use crate::llm::client::{
    GenerationRequest, GenerationResponse, JsonResponse, LlmClient, StreamChunk, StreamResult,
    TokenUsage,
};
use crate::llm::retry::response_to_error;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini client bound to a single model.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
        })
    }

    /// Set a custom base URL (for Gemini-compatible endpoints)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn api_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base_url(),
            self.model
        )
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.api_base_url(),
            self.model
        )
    }

    async fn send(&self, url: &str, body: &GeminiRequest) -> Result<GeminiResponse> {
        let response = self
            .client
            .post(url)
            .headers(build_auth_headers(&self.api_key)?)
            .json(body)
            .send()
            .await
            .map_err(AiError::Http)?;

        if !response.status().is_success() {
            return Err(response_to_error(response, "Gemini").await);
        }

        Ok(response.json().await?)
    }
}

fn build_auth_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-goog-api-key"),
        HeaderValue::from_str(api_key)
            .map_err(|_| AiError::Llm("API key contains invalid header characters".to_string()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

impl GeminiRequest {
    fn from_request(request: &GenerationRequest, response_schema: Option<Value>) -> Self {
        let response_mime_type = response_schema
            .is_some()
            .then(|| "application/json".to_string());

        Self {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: request.system.as_ref().map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: text.clone() }],
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: request.max_output_tokens,
                temperature: request.temperature,
                response_mime_type,
                response_schema,
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl From<GeminiUsage> for TokenUsage {
    fn from(usage: GeminiUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        }
    }
}

impl GeminiResponse {
    fn text(&self) -> String {
        let parts: Vec<&str> = self
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        parts.join("\n")
    }

    fn usage(&self) -> TokenUsage {
        self.usage_metadata.unwrap_or_default().into()
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let body = GeminiRequest::from_request(&request, None);
        let data = self.send(&self.generate_url(), &body).await?;

        // An empty completion is not a transport error; the scheduler
        // decides what a zero-length output means.
        Ok(GenerationResponse {
            text: data.text(),
            usage: data.usage(),
        })
    }

    async fn generate_json(
        &self,
        request: GenerationRequest,
        schema: Value,
    ) -> Result<JsonResponse> {
        let body = GeminiRequest::from_request(&request, Some(schema));
        let data = self.send(&self.generate_url(), &body).await?;

        let text = data.text();
        if text.trim().is_empty() {
            return Err(AiError::EmptyResponse {
                provider: "gemini".to_string(),
                model: self.model.clone(),
            });
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| AiError::InvalidJson(format!("{e}: {}", truncate(&text, 200))))?;

        Ok(JsonResponse {
            value,
            usage: data.usage(),
        })
    }

    fn generate_stream(&self, request: GenerationRequest) -> StreamResult {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = self.stream_url();

        Box::pin(async_stream::stream! {
            let body = GeminiRequest::from_request(&request, None);

            let headers = match build_auth_headers(&api_key) {
                Ok(h) => h,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let response = match client.post(&url).headers(headers).json(&body).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    yield Err(AiError::Http(e));
                    return;
                }
            };

            if !response.status().is_success() {
                yield Err(response_to_error(response, "Gemini").await);
                return;
            }

            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut usage = TokenUsage::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(AiError::Http(e));
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Process complete SSE events from the buffer
                while let Some(pos) = buffer.find("\n\n") {
                    let event_str = buffer[..pos].to_string();
                    buffer = buffer[pos + 2..].to_string();

                    for line in event_str.lines() {
                        if let Some(data) = line.strip_prefix("data: ") {
                            if data.trim().is_empty() {
                                continue;
                            }
                            let event: GeminiResponse = match serde_json::from_str(data) {
                                Ok(e) => e,
                                Err(_) => continue,
                            };
                            if let Some(meta) = event.usage_metadata {
                                usage = meta.into();
                            }
                            let delta = event.text();
                            if !delta.is_empty() {
                                yield Ok(StreamChunk::text(delta));
                            }
                        }
                    }
                }
            }

            // Trailing event without the final \n\n (e.g. connection cut)
            let remaining = buffer.trim();
            if !remaining.is_empty() {
                for line in remaining.lines() {
                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Ok(event) = serde_json::from_str::<GeminiResponse>(data) {
                            if let Some(meta) = event.usage_metadata {
                                usage = meta.into();
                            }
                            let delta = event.text();
                            if !delta.is_empty() {
                                yield Ok(StreamChunk::text(delta));
                            }
                        }
                    }
                }
            }

            yield Ok(StreamChunk::final_chunk(usage));
        })
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
