//! Model-call interface.
//!
//! Every component that talks to a language model (the executor for the
//! model under test, and the evaluator, clustering analyzer and rewriter for
//! the judge) goes through [`ModelClient`]. Implementations:
//!
//! - [`OpenAiCompatibleClient`]: `/chat/completions` over HTTP
//! - [`fakes`]: deterministic in-memory clients for tests

pub mod fakes;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::OpenAiCompatibleClient;

/// One model call: instruction context, user turn, sampling temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub temperature: f32,
}

impl ModelRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_message: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_message: user_message.into(),
            temperature,
        }
    }
}

/// Reply content and the latency the provider took to produce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReply {
    pub content: String,
    pub latency_ms: u64,
}

/// Errors from the model-call interface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("model returned no content")]
    EmptyReply,

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        ModelError::Network(e.to_string())
    }
}

/// Backend-agnostic model endpoint.
///
/// Implementations must be safe to share across the parallel executions of a
/// round; no per-call state may leak between calls.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Issue a single completion request.
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError>;

    /// Model identifier, for logs and reports.
    fn model_name(&self) -> &str;
}
