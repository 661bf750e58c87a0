//! Embedding Provider Abstraction
//!
//! Defines the async `EmbeddingProvider` trait and the remote
//! OpenAI-compatible implementation. Embedding is a distinct responsibility
//! from chat completion, so it gets its own trait and error type rather than
//! extending `LlmProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::settings::EmbeddingConfig;

/// Errors that can occur during embedding operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingError {
    /// Authentication failed (invalid or missing API key).
    AuthenticationFailed { message: String },

    /// A network or connection error occurred, including timeouts.
    NetworkError { message: String },

    /// The provider returned an unexpected or unparseable response.
    ParseError { message: String },

    /// The provider returned an HTTP error.
    ServerError {
        message: String,
        status: Option<u16>,
    },

    /// Rate limit exceeded.
    RateLimited { message: String },

    /// Any other error.
    Other { message: String },
}

impl fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed { message } => {
                write!(f, "authentication failed: {}", message)
            }
            Self::NetworkError { message } => write!(f, "network error: {}", message),
            Self::ParseError { message } => write!(f, "parse error: {}", message),
            Self::ServerError { message, status } => {
                if let Some(code) = status {
                    write!(f, "server error (HTTP {}): {}", code, message)
                } else {
                    write!(f, "server error: {}", message)
                }
            }
            Self::RateLimited { message } => write!(f, "rate limited: {}", message),
            Self::Other { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for EmbeddingError {}

impl EmbeddingError {
    /// Whether this error is transient and the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::RateLimited { .. } | Self::ServerError { .. }
        )
    }
}

/// Convenience alias for embedding operation results.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for embedding backends.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The dimension of vectors this provider produces.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;
}

/// Cosine similarity between two vectors. Returns 0.0 for mismatched or
/// empty inputs and for zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

// ---------------------------------------------------------------------------
// Remote provider
// ---------------------------------------------------------------------------

/// Request timeout for embedding calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote embedding provider for OpenAI-compatible `/embeddings` endpoints.
pub struct RemoteEmbeddingProvider {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl RemoteEmbeddingProvider {
    /// Create a new remote provider from configuration.
    pub fn new(config: EmbeddingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if self.config.api_key.is_empty() {
            return Err(EmbeddingError::AuthenticationFailed {
                message: "API key not configured for embeddings".to_string(),
            });
        }

        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| EmbeddingError::NetworkError {
                message: e.to_string(),
            })?;

        if status != 200 {
            return Err(match status {
                401 | 403 => EmbeddingError::AuthenticationFailed { message: text },
                429 => EmbeddingError::RateLimited { message: text },
                500..=599 => EmbeddingError::ServerError {
                    message: text,
                    status: Some(status),
                },
                _ => EmbeddingError::Other {
                    message: format!("HTTP {}: {}", status, text),
                },
            });
        }

        let parsed: EmbeddingsResponse =
            serde_json::from_str(&text).map_err(|e| EmbeddingError::ParseError {
                message: format!("Invalid embeddings response: {}", e),
            })?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::ParseError {
                message: format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                ),
            });
        }

        // Responses may arrive out of order; the index field is authoritative.
        let mut vectors = vec![Vec::new(); texts.len()];
        for item in parsed.data {
            if item.index >= vectors.len() {
                return Err(EmbeddingError::ParseError {
                    message: format!("Embedding index {} out of range", item.index),
                });
            }
            vectors[item.index] = item.embedding;
        }

        Ok(vectors)
    }
}

/// Embeddings API response.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
