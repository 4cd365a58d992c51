//! Structured LLM inference capability.
//!
//! [`Inference`] is the single seam through which the core asks a language
//! model questions: it takes a prompt that demands a JSON answer and returns
//! the parsed `serde_json::Value`. Prompt construction and schema validation
//! belong to the callers (extractor, relation builder, conflict scanner);
//! this layer only handles transport, fencing, and parsing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InferError, Result};
use crate::retry::with_retry;

// ─────────────────────────────────────────────────────────────────────────────
// Inference Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for structured model inference.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Send a prompt and parse the reply as JSON.
    ///
    /// Implementations strip markdown code fences before parsing; a reply
    /// that still fails to parse is an [`InferError::InvalidResponse`].
    async fn infer(&self, prompt: &str) -> Result<Value>;

    /// Name of this inference backend.
    fn name(&self) -> &str;
}

/// A shared inference backend usable across threads.
pub type SharedInference = Arc<dyn Inference>;

/// Strip markdown code fences from model output.
///
/// Models routinely wrap JSON in ```json ... ``` despite instructions not
/// to; tolerate it rather than failing the call.
pub fn strip_json_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Inference
// ─────────────────────────────────────────────────────────────────────────────

/// Scriptable inference backend for tests.
///
/// Returns pre-configured JSON values in order, the final one repeating for
/// any further calls, and records every prompt it received. A mock
/// constructed with no responses fails every call, mimicking an unavailable
/// service.
#[derive(Debug)]
pub struct MockInference {
    responses: std::sync::Mutex<Vec<Value>>,
    prompts: std::sync::Mutex<Vec<String>>,
}

impl MockInference {
    /// Create a mock that answers with the given values, in order.
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that answers every call with the same value.
    pub fn always(value: Value) -> Self {
        Self::new(vec![value])
    }

    /// Create a mock whose every call fails with an unavailable error.
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Inference for MockInference {
    async fn infer(&self, prompt: &str) -> Result<Value> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(InferError::Unavailable(
                "MockInference: no responses configured".into(),
            ));
        }
        if responses.len() == 1 {
            // Final response repeats.
            return Ok(responses[0].clone());
        }
        Ok(responses.remove(0))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Inference (OpenAI-compatible chat completions)
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpInferenceConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// Retries on transient failures, on top of the initial attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl HttpInferenceConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            max_tokens: 2048,
            // Low temperature: we want schema-following, not creativity.
            temperature: 0.2,
            timeout: Duration::from_secs(60),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Inference client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpInference {
    client: Client,
    config: HttpInferenceConfig,
}

impl HttpInference {
    /// Create a new HTTP inference backend.
    pub fn new(config: HttpInferenceConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(InferError::Config("inference API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InferError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    async fn request_completion(&self, request: &ChatRequest) -> Result<Value> {
        let response = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = response.text().await.unwrap_or_default();
            return Err(InferError::RateLimited {
                message,
                retry_after,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InferError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferError::InvalidResponse(format!("chat response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InferError::InvalidResponse("empty completion".into()))?;

        let stripped = strip_json_fences(&content);
        serde_json::from_str(stripped).map_err(|e| {
            InferError::InvalidResponse(format!("model did not return valid JSON: {e}"))
        })
    }
}

#[async_trait]
impl Inference for HttpInference {
    async fn infer(&self, prompt: &str) -> Result<Value> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        with_retry(
            self.config.max_retries,
            self.config.initial_backoff,
            "chat completion",
            || self.request_completion(&request),
        )
        .await
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
