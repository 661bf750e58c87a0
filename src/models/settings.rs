//! Settings Models
//!
//! Engine configuration with serde defaults and validation.

use serde::{Deserialize, Serialize};

/// Development-only key; deployments must provide their own 32-byte key.
const DEV_ENCRYPTION_KEY: &str =
    "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

fn default_database_path() -> String {
    "futureself.db".to_string()
}

fn default_encryption_key() -> String {
    DEV_ENCRYPTION_KEY.to_string()
}

fn default_max_user_turns() -> u32 {
    5
}

fn default_workers() -> usize {
    2
}

/// Generation provider settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// API base URL
    #[serde(default = "default_generation_api_base")]
    pub api_base: String,
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// Model for letter replies and reports
    #[serde(default = "default_model_standard")]
    pub model_standard: String,
    /// Model for interactive chat turns
    #[serde(default = "default_model_fast")]
    pub model_fast: String,
    /// Maximum completion tokens per request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_generation_api_base() -> String {
    "https://api.siliconflow.cn/v1".to_string()
}

fn default_model_standard() -> String {
    "zai-org/GLM-4.6".to_string()
}

fn default_model_fast() -> String {
    "zai-org/GLM-4.6".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: default_generation_api_base(),
            api_key: String::new(),
            model_standard: default_model_standard(),
            model_fast: default_model_fast(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Embedding provider settings (OpenAI-compatible embeddings endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// API base URL
    #[serde(default = "default_generation_api_base")]
    pub api_base: String,
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding vector dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

fn default_embedding_model() -> String {
    "BAAI/bge-m3".to_string()
}

fn default_embedding_dimension() -> usize {
    1024
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: default_generation_api_base(),
            api_key: String::new(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
        }
    }
}

/// Retry policy for generation jobs.
///
/// A transient failure re-enqueues the job after
/// `base_delay_secs * 2^attempt`; after `max_retries` completed retries the
/// next failure commits FAILED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

impl RetryConfig {
    /// Backoff delay before the retry following failure number
    /// `attempt` (0-based): 60s, 120s, 240s with the defaults.
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        std::time::Duration::from_secs(self.base_delay_secs.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file path
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// 32-byte AES-256 key, hex encoded (64 characters)
    #[serde(default = "default_encryption_key")]
    pub encryption_key: String,
    /// Maximum USER turns per (user, persona) conversation
    #[serde(default = "default_max_user_turns")]
    pub max_user_turns: u32,
    /// Number of job worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            encryption_key: default_encryption_key(),
            max_user_turns: default_max_user_turns(),
            workers: default_workers(),
            generation: GenerationConfig::default(),
            embedding: EmbeddingConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validate the configuration, returning a message for the first problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.encryption_key.len() != 64 || hex::decode(&self.encryption_key).is_err() {
            return Err("encryption_key must be 64 hex characters (32 bytes)".to_string());
        }
        if self.max_user_turns == 0 {
            return Err("max_user_turns must be at least 1".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be non-zero".to_string());
        }
        Ok(())
    }
}
