//! Text embedding capability.
//!
//! The [`Embedder`] trait converts text into dense vectors with a fixed,
//! implementation-declared dimensionality. The same embedder must be used
//! for storage and queries or similarity scores are meaningless.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{InferError, Result};
use crate::retry::with_retry;

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in a batch.
    ///
    /// Default implementation calls `embed` sequentially; implementations
    /// may override for provider-side batching.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;

    /// Name of this embedder.
    fn name(&self) -> &str;
}

/// A shared embedder usable across threads.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic embedder for tests.
///
/// Hashes the text into a unit vector, so equal texts embed identically and
/// similar-prefix texts do not cluster in any meaningful way. Tests that
/// need controlled similarity should use [`MockEmbedder::with_fixture`].
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
    fixtures: Vec<(String, Vec<f32>)>,
}

impl MockEmbedder {
    /// Create a mock embedder with the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fixtures: Vec::new(),
        }
    }

    /// Pin an exact vector for a specific text.
    ///
    /// The vector must match the embedder's dimensionality.
    pub fn with_fixture(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimensions, "fixture dimension mismatch");
        self.fixtures.push((text.into(), vector));
        self
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        for (fixture_text, vector) in &self.fixtures {
            if fixture_text == text {
                return Ok(vector.clone());
            }
        }

        let mut embedding = Vec::with_capacity(self.dimensions);
        let mut hash = simple_hash(text);
        for _ in 0..self.dimensions {
            hash = hash.wrapping_mul(6364136223846793005).wrapping_add(1);
            // Map to [-1, 1]
            embedding.push(((hash >> 33) as f32 / (1u64 << 31) as f32) - 1.0);
        }

        // Normalize to unit length
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// djb2, good enough for deterministic test vectors.
fn simple_hash(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}

/// An embedder that always fails, for exercising degraded paths.
#[derive(Debug, Clone)]
pub struct FailingEmbedder {
    dimensions: usize,
}

impl FailingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(InferError::Unavailable("embedding service down".into()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Embedder (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
    /// Retries on transient failures, on top of the initial attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl HttpEmbedderConfig {
    /// Create a config with the given API key and defaults.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            timeout: Duration::from_secs(60),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embeddings client for any OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: Client,
    config: HttpEmbedderConfig,
}

impl HttpEmbedder {
    /// Create a new HTTP embedder.
    pub fn new(config: HttpEmbedderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(InferError::Config("embedder API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| InferError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/embeddings", self.config.base_url)
    }

    async fn request_embeddings(&self, request: &EmbeddingRequest) -> Result<Vec<Vec<f32>>> {
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

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| InferError::InvalidResponse(format!("embedding response: {e}")))?;

        if parsed.data.len() != request.input.len() {
            return Err(InferError::InvalidResponse(format!(
                "asked for {} embeddings, got {}",
                request.input.len(),
                parsed.data.len()
            )));
        }

        for data in &parsed.data {
            if data.embedding.len() != self.config.dimensions {
                return Err(InferError::InvalidResponse(format!(
                    "expected {} dimensions, got {}",
                    self.config.dimensions,
                    data.embedding.len()
                )));
            }
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text]).await?;
        results
            .pop()
            .ok_or_else(|| InferError::InvalidResponse("no embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: texts.iter().map(|s| s.to_string()).collect(),
        };
        with_retry(
            self.config.max_retries,
            self.config.initial_backoff,
            "embeddings",
            || self.request_embeddings(&request),
        )
        .await
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
