//! Judge-model components.
//!
//! # Module layout
//!
//! - [`parse`]: lenient JSON-in-prose decoding shared by every component
//! - [`prompts`]: instruction texts and request builders
//! - [`evaluator`]: `ResponseEvaluator`, the stability/correctness verdict
//! - [`clustering`]: `ClusteringAnalyzer`, style clusters (guided mode)
//! - [`rewriter`]: `FeedbackRewriter`, feedback-driven rewrite (guided mode)
//!
//! A parse failure never escapes these components; each has its own safe
//! fallback. A failed judge *call* is returned as `PromptLoopError::Judge`.

pub mod clustering;
pub mod evaluator;
pub mod parse;
pub mod prompts;
pub mod rewriter;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{PromptLoopError, Result};
use crate::metrics::METRICS;
use crate::model::{ModelClient, ModelRequest};

pub use clustering::{ClusteringAnalyzer, PREVIEW_CHARS};
pub use evaluator::ResponseEvaluator;
pub use parse::{
    balanced_objects, extract_balanced_object, extract_outer_object, parse_lenient,
    parse_lenient_where, JudgeParseError,
};
pub use rewriter::{FeedbackRewriter, Rewrite, SAMPLE_RESPONSES};

/// Sampling temperature for every judge call.
pub const JUDGE_TEMPERATURE: f32 = 0.2;

/// Issue one judge call, racing it against cancellation.
async fn call_judge(
    judge: &dyn ModelClient,
    system_prompt: &str,
    user_message: String,
    cancel: &CancellationToken,
) -> Result<String> {
    let request = ModelRequest::new(system_prompt, user_message, JUDGE_TEMPERATURE);
    METRICS.inc_model_calls();
    debug!(model = judge.model_name(), "judge request");

    let reply = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PromptLoopError::Cancelled),
        reply = judge.invoke(&request) => reply,
    };

    reply.map(|r| r.content).map_err(|e| {
        METRICS.inc_model_failures();
        PromptLoopError::Judge(e)
    })
}

/// Truncate to `max_chars` characters, appending `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
