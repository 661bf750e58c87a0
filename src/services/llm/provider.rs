//! Generation Provider Trait
//!
//! Defines the common interface the engine uses to obtain generated text.
//! The executor treats a call as synchronous: it blocks on completion and
//! never cancels an in-flight request; a timed-out call is abandoned and
//! surfaces as a retryable `NetworkError`.

use async_trait::async_trait;

use super::types::{LlmError, LlmResult, ModelTier};

/// Trait that all generation providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Generate a completion for a system prompt plus one user message.
    ///
    /// # Arguments
    /// * `tier` - Latency/quality tier selecting the underlying model
    /// * `system` - System prompt carrying persona, memory and history blocks
    /// * `user` - The user-facing message for this request
    async fn complete(&self, tier: ModelTier, system: &str, user: &str) -> LlmResult<String>;
}

/// Helper function to create an error for a missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Helper function to map HTTP error status codes onto `LlmError`
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
            retry_after: None,
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}
