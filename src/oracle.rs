//! Text-in / text-out LLM access.
//!
//! The pipeline treats the model as an opaque oracle behind [`LlmOracle`];
//! [`AnthropicOracle`] talks to the Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ServiceError;

const SERVICE: &str = "anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

#[async_trait]
pub trait LlmOracle: Send + Sync {
    /// Sends one system + user turn and returns the first text block of the reply.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, ServiceError>;
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicOracle {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::http(SERVICE, e))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let api_key = config.require("ANTHROPIC_API_KEY", &config.anthropic_api_key)?;
        Ok(Self::new(api_key, &config.anthropic_model, config.http_timeout)?
            .with_base_url(&config.anthropic_base_url))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmOracle for AnthropicOracle {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, ServiceError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: [UserMessage {
                role: "user",
                content: user,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::http(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::decode(SERVICE, e.to_string()))?;

        match parsed.content.into_iter().next() {
            Some(ContentBlock {
                kind,
                text: Some(text),
            }) if kind == "text" => Ok(text),
            _ => Err(ServiceError::decode(
                SERVICE,
                "first content block is not text",
            )),
        }
    }
}
