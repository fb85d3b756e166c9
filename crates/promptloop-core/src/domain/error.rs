//! Domain-level error taxonomy for PromptLoop.

use crate::model::ModelError;

/// Errors produced by test case validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("system prompt must not be empty")]
    EmptySystemPrompt,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("execution count must be at least 1, got {count}")]
    ExecutionCount { count: u32 },

    #[error("temperature must be between {min} and {max}, got {value}")]
    Temperature { value: f32, min: f32, max: f32 },
}

/// PromptLoop domain errors.
#[derive(Debug, thiserror::Error)]
pub enum PromptLoopError {
    #[error("invalid test case: {0}")]
    InvalidTestCase(#[from] ValidationError),

    #[error("round {round} is out of order: last recorded round is {last}")]
    RoundOutOfOrder { round: u32, last: u32 },

    #[error("judge call failed: {0}")]
    Judge(#[source] ModelError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("session is {state}, cannot {action}")]
    InvalidState { state: String, action: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for PromptLoop domain operations.
pub type Result<T> = std::result::Result<T, PromptLoopError>;
