//! SiliconFlow Provider
//!
//! Implementation of the LlmProvider trait for SiliconFlow's
//! OpenAI-compatible chat completions API. Any OpenAI-compatible endpoint
//! works via the configured base URL.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::provider::{missing_api_key_error, parse_http_error, LlmProvider};
use super::types::{LlmError, LlmResult, ModelTier};
use crate::models::settings::GenerationConfig;

/// Request timeout. A call that exceeds it is abandoned, not cancelled
/// upstream, and classified as a retryable network error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Sampling temperature for the standard tier
const TEMPERATURE_STANDARD: f32 = 0.7;

/// Sampling temperature for the fast tier
const TEMPERATURE_FAST: f32 = 0.5;

/// SiliconFlow provider
pub struct SiliconFlowProvider {
    config: GenerationConfig,
    client: reqwest::Client,
}

impl SiliconFlowProvider {
    /// Create a new provider with the given configuration
    pub fn new(config: GenerationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    /// Chat completions endpoint URL
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    /// Model name for a tier
    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Standard => &self.config.model_standard,
            ModelTier::Fast => &self.config.model_fast,
        }
    }

    /// Build the request body for the API
    fn build_request_body(&self, tier: ModelTier, system: &str, user: &str) -> serde_json::Value {
        let temperature = match tier {
            ModelTier::Standard => TEMPERATURE_STANDARD,
            ModelTier::Fast => TEMPERATURE_FAST,
        };

        serde_json::json!({
            "model": self.model_for(tier),
            "max_tokens": self.config.max_tokens,
            "temperature": temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        })
    }
}

#[async_trait]
impl LlmProvider for SiliconFlowProvider {
    fn name(&self) -> &'static str {
        "siliconflow"
    }

    async fn complete(&self, tier: ModelTier, system: &str, user: &str) -> LlmResult<String> {
        if self.config.api_key.is_empty() {
            return Err(missing_api_key_error(self.name()));
        }

        let body = self.build_request_body(tier, system, user);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;

        if status != 200 {
            return Err(parse_http_error(status, &text, self.name()));
        }

        let parsed: CompletionsResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::ParseError {
                message: format!("Invalid completions response: {}", e),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::ParseError {
                message: "Completions response contained no choices".to_string(),
            })?;

        Ok(content)
    }
}

/// Chat completions API response
#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    choices: Vec<CompletionsChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionsChoice {
    message: CompletionsMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionsMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> SiliconFlowProvider {
        SiliconFlowProvider::new(GenerationConfig {
            api_base: "https://api.siliconflow.cn/v1/".into(),
            api_key: "sk-test".into(),
            model_standard: "standard-model".into(),
            model_fast: "fast-model".into(),
            max_tokens: 4096,
        })
    }

    #[test]
    fn test_completions_url_trims_slash() {
        let provider = test_provider();
        assert_eq!(
            provider.completions_url(),
            "https://api.siliconflow.cn/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_body_per_tier() {
        let provider = test_provider();

        let body = provider.build_request_body(ModelTier::Standard, "sys", "usr");
        assert_eq!(body["model"], "standard-model");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");

        let body = provider.build_request_body(ModelTier::Fast, "sys", "usr");
        assert_eq!(body["model"], "fast-model");
        assert!((body["temperature"].as_f64().unwrap() - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let provider = SiliconFlowProvider::new(GenerationConfig {
            api_key: String::new(),
            ..GenerationConfig::default()
        });
        let err = provider
            .complete(ModelTier::Fast, "sys", "usr")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: CompletionsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("hello")
        );
    }
}
