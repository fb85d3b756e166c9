use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ModelClient, ModelError, ModelReply, ModelRequest};
use crate::config::ModelEndpoint;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_TOKENS: u32 = 4096;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Text of the first choice. Missing or blank content is a failed call.
fn reply_content(parsed: ChatResponse) -> Result<String, ModelError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ModelError::EmptyReply)
}

// =============================================================================
// Client
// =============================================================================

/// Client for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, OpenRouter, local gateways).
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    max_tokens: u32,
    http: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
            http: reqwest::Client::new(),
        }
    }

    /// Build a client from an endpoint config, reading the API key from the
    /// environment variable the endpoint names.
    pub fn from_endpoint(endpoint: &ModelEndpoint) -> Result<Self, ModelError> {
        let api_key = std::env::var(&endpoint.api_key_env).map_err(|_| {
            ModelError::Config(format!(
                "{} environment variable not set",
                endpoint.api_key_env
            ))
        })?;

        Ok(Self::new(api_key, &endpoint.model)
            .with_base_url(&endpoint.base_url)
            .with_timeout(Duration::from_secs(endpoint.timeout_secs)))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the timeout applied to every request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap, ModelError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| ModelError::Config(format!("invalid API key header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Build the `/chat/completions` call for `request`, timeout included.
    fn chat_request(
        &self,
        request: &ModelRequest,
    ) -> Result<reqwest::RequestBuilder, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: &request.user_message,
                },
            ],
            temperature: request.temperature,
            max_tokens: self.max_tokens,
        };

        Ok(self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .headers(self.headers()?)
            .timeout(self.timeout)
            .json(&body))
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            ModelError::from(e)
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        debug!(model = %self.model, temperature = request.temperature, "chat request");
        let started = Instant::now();

        let response = self
            .chat_request(request)?
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.map_send_error(e))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let content = reply_content(parsed)?;

        Ok(ModelReply {
            content,
            latency_ms,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
