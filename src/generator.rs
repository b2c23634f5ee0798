use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::{ReplyError, Result};

/// Trait for reply generators (real model or mock)
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Produce reply text for cleaned inbound text
    async fn generate(&self, clean_text: &str) -> Result<String>;

    /// Whether an empty cleaned text may be passed to [`generate`](Self::generate)
    fn accepts_empty_input(&self) -> bool {
        true
    }
}

#[async_trait]
impl<T: ResponseGenerator + ?Sized> ResponseGenerator for Arc<T> {
    async fn generate(&self, clean_text: &str) -> Result<String> {
        (**self).generate(clean_text).await
    }

    fn accepts_empty_input(&self) -> bool {
        (**self).accepts_empty_input()
    }
}

/// Production generator calling an OpenAI-compatible chat completions endpoint
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    config: GeneratorConfig,
}

impl OpenAiGenerator {
    /// Create a new OpenAiGenerator with the given configuration
    pub fn new(config: GeneratorConfig, api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            config,
        }
    }

    fn parse_reply(body: &Value) -> Result<String> {
        let content = body["choices"]
            .as_array()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice["message"]["content"].as_str())
            .map(str::trim)
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ReplyError::EmptyGeneration);
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiGenerator {
    async fn generate(&self, clean_text: &str) -> Result<String> {
        debug!(
            "Requesting completion from {} ({} chars of input)",
            self.config.model,
            clean_text.chars().count()
        );
        let request = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [
                { "role": "system", "content": self.config.system_prompt },
                { "role": "user", "content": clean_text }
            ]
        });

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReplyError::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReplyError::Generation(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ReplyError::Generation(format!("invalid response body: {}", e)))?;
        Self::parse_reply(&body)
    }

    fn accepts_empty_input(&self) -> bool {
        false
    }
}
