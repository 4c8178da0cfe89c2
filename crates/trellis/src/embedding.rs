//! Embedding providers.
//!
//! Three providers implement the core [`Embedder`] trait:
//! - **disabled** — always errors; keeps query paths honest when no
//!   embedding backend is configured.
//! - **openai** — OpenAI-compatible `POST /v1/embeddings`; requires
//!   `OPENAI_API_KEY` in the environment.
//! - **ollama** — a local Ollama instance's `POST /api/embed`.
//!
//! # Retry strategy
//!
//! HTTP providers retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use trellis_core::error::{Error, Result};
use trellis_core::pipeline::Embedder;

use crate::config::EmbeddingConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434";

/// Instantiate the configured embedding provider.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(HttpEmbedder::openai(config)?)),
        "ollama" => Ok(Arc::new(HttpEmbedder::ollama(config)?)),
        "disabled" => Ok(Arc::new(DisabledEmbedder { dims: config.dims })),
        other => Err(Error::InvalidInput(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

/// Provider used when embeddings are not configured. Any attempt to embed
/// fails with a descriptive error.
pub struct DisabledEmbedder {
    dims: usize,
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Precondition(
            "embedding provider is disabled; set embedding.provider in the config".into(),
        ))
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn model_name(&self) -> &str {
        "disabled"
    }
}

enum Api {
    OpenAi,
    Ollama,
}

/// HTTP embedding provider for OpenAI-compatible and Ollama endpoints.
pub struct HttpEmbedder {
    api: Api,
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
    api_key: Option<String>,
    max_retries: u32,
}

impl HttpEmbedder {
    fn client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::storage)
    }

    fn model(config: &EmbeddingConfig) -> Result<String> {
        config
            .model
            .clone()
            .ok_or_else(|| Error::Precondition("embedding.model is required".into()))
    }

    pub fn openai(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            Error::Precondition("OPENAI_API_KEY environment variable not set".into())
        })?;
        Ok(Self {
            api: Api::OpenAi,
            client: Self::client(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: Self::model(config)?,
            dims: config.dims,
            api_key: Some(api_key),
            max_retries: config.max_retries,
        })
    }

    pub fn ollama(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            api: Api::Ollama,
            client: Self::client(config)?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            model: Self::model(config)?,
            dims: config.dims,
            api_key: None,
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, text: &str) -> std::result::Result<Vec<f32>, RequestError> {
        let (url, body) = match self.api {
            Api::OpenAi => (
                format!("{}/v1/embeddings", self.base_url),
                json!({ "model": self.model, "input": [text] }),
            ),
            Api::Ollama => (
                format!("{}/api/embed", self.base_url),
                json!({ "model": self.model, "input": text }),
            ),
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(RequestError::retryable)?;
        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(RequestError::retryable(format!(
                "embedding API returned {status}"
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RequestError::fatal(format!(
                "embedding API returned {status}: {detail}"
            )));
        }

        let payload: serde_json::Value =
            response.json().await.map_err(RequestError::retryable)?;
        let vector = match self.api {
            Api::OpenAi => payload["data"][0]["embedding"].clone(),
            Api::Ollama => payload["embeddings"][0].clone(),
        };
        let vector: Vec<f32> = serde_json::from_value(vector).map_err(|e| {
            RequestError::fatal(format!("malformed embedding response: {e}"))
        })?;
        Ok(vector)
    }
}

struct RequestError {
    message: String,
    retryable: bool,
}

impl RequestError {
    fn retryable(err: impl ToString) -> Self {
        Self {
            message: err.to_string(),
            retryable: true,
        }
    }
    fn fatal(err: impl ToString) -> Self {
        Self {
            message: err.to_string(),
            retryable: false,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_err = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
                warn!(attempt, "retrying embedding request");
            }
            match self.request(text).await {
                Ok(vector) => {
                    if vector.len() != self.dims {
                        return Err(Error::Internal(format!(
                            "embedding API returned {} dimensions, expected {}",
                            vector.len(),
                            self.dims
                        )));
                    }
                    return Ok(vector);
                }
                Err(err) if err.retryable => last_err = err.message,
                Err(err) => return Err(Error::storage(err.message)),
            }
        }
        Err(Error::storage(format!(
            "embedding request failed after {} retries: {last_err}",
            self.max_retries
        )))
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            model: Some("test-model".to_string()),
            dims: 8,
            base_url: None,
            max_retries: 0,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_disabled_provider_errors_on_embed() {
        let embedder = create_embedder(&config("disabled")).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        assert_eq!(embedder.dims(), 8);
        let err = embedder.embed("text").await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(create_embedder(&config("quantum")).is_err());
    }

    #[test]
    fn test_ollama_provider_defaults() {
        let embedder = HttpEmbedder::ollama(&config("ollama")).unwrap();
        assert_eq!(embedder.model_name(), "test-model");
        assert_eq!(embedder.base_url, OLLAMA_BASE_URL);
    }
}
