//! Model RPC client
//!
//! The agent loop talks to the model only through [`ModelClient`]; the
//! production implementation is [`AnthropicClient`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::*;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Opaque request/response RPC to a language model
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one request and return the model's response.
    ///
    /// Implementations do not retry; failures surface as [`Error::Provider`]
    /// or [`Error::Http`].
    async fn create_message(&self, request: MessagesRequest) -> Result<MessagesResponse>;

    /// Exact token count of a system prompt, when the provider supports it.
    async fn count_system_tokens(&self, _model: &str, _system: &str) -> Result<u64> {
        Err(Error::Unsupported("token counting".to_string()))
    }
}

/// Anthropic Messages API client
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a new client from provider settings
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(Error::Http)?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create with custom base URL (for testing or custom endpoints)
    pub fn with_base_url(config: &LlmConfig, base_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into();
        Ok(client)
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: &impl serde::Serialize) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);

        debug!("Sending request to Anthropic API: {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            warn!("Anthropic API error: {} - {}", status, body);
            return Err(Error::Provider(format!("{}: {}", status, body)));
        }

        Ok(body)
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn create_message(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        let body = self.post("/messages", &request).await?;

        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|e| {
            Error::Provider(format!("Failed to parse response: {} - {}", e, body))
        })?;

        info!(
            stop_reason = ?parsed.stop_reason,
            input_tokens = parsed.usage.total_input(),
            output_tokens = parsed.usage.output_tokens,
            "Anthropic API response"
        );

        Ok(parsed)
    }

    async fn count_system_tokens(&self, model: &str, system: &str) -> Result<u64> {
        // The endpoint needs at least one message; "test" costs one token.
        let request = json!({
            "model": model,
            "system": system,
            "messages": [{"role": "user", "content": "test"}],
        });

        let body = self.post("/messages/count_tokens", &request).await?;
        let value: serde_json::Value = serde_json::from_str(&body)?;
        let count = value["input_tokens"]
            .as_u64()
            .ok_or_else(|| Error::Provider(format!("Missing input_tokens in: {}", body)))?;

        Ok(count.saturating_sub(1))
    }
}
