//! Embedding providers.
//!
//! - **[`DisabledProvider`]** (from the core crate) when `provider = "disabled"`;
//!   retrieval then runs keyword-only if `retrieval.keyword_fallback` is on.
//! - **[`OpenAIEmbedder`]** for any OpenAI-compatible `/v1/embeddings`
//!   endpoint, with retry and exponential backoff.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 250ms, 500ms, 1s, 2s (capped at 2^4 steps)

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use compliance_harness_core::embedding::{DisabledProvider, EmbeddingProvider};
use compliance_harness_core::error::EmbeddingError;

use crate::config::EmbeddingConfig;

const BACKOFF_BASE_MS: u64 = 250;

/// Embedding provider for OpenAI-compatible HTTP APIs.
///
/// Reads the bearer token from `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = String::from("no attempts made");

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(BACKOFF_BASE_MS << (attempt - 1).min(4));
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| unavailable(format!("invalid response body: {}", e)))?;
                        return parse_embedding(&json, self.dims);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = format!("embedding API error {}: {}", status, body_text);
                        continue;
                    }

                    return Err(unavailable(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = e.to_string();
                    continue;
                }
            }
        }

        Err(unavailable(last_err))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.request(text).await
    }
}

fn unavailable(reason: impl Into<String>) -> EmbeddingError {
    EmbeddingError::Unavailable {
        reason: reason.into(),
    }
}

/// Extract `data[0].embedding` and check its dimension.
fn parse_embedding(json: &serde_json::Value, dims: usize) -> Result<Vec<f32>, EmbeddingError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| unavailable("invalid response: missing data[0].embedding"))?;

    let vec: Vec<f32> = embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect();

    if vec.len() != dims {
        return Err(unavailable(format!(
            "model returned {} dimensions, expected {}",
            vec.len(),
            dims
        )));
    }
    Ok(vec)
}

/// Create the configured provider.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedding() {
        let json = serde_json::json!({"data": [{"embedding": [0.5, -1.0, 2.0], "index": 0}]});
        assert_eq!(parse_embedding(&json, 3).unwrap(), vec![0.5, -1.0, 2.0]);
        assert!(parse_embedding(&json, 4).is_err());
        assert!(parse_embedding(&serde_json::json!({}), 3).is_err());
    }

    #[test]
    fn test_create_disabled_provider() {
        let p = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(p.model_name(), "disabled");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "local".into(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
