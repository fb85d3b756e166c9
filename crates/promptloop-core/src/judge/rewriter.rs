//! Feedback-guided rewriter (guided mode).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::call_judge;
use super::parse::parse_lenient;
use super::prompts::{rewrite_request, REWRITE_INSTRUCTIONS};
use crate::domain::{
    successful, AgentResponse, DifferenceAnalysis, Result, TestCase, UserFeedback,
};
use crate::metrics::METRICS;
use crate::model::ModelClient;
use crate::obs;

/// Number of successful responses sent as samples, to bound the payload.
pub const SAMPLE_RESPONSES: usize = 2;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteVerdict {
    #[serde(default)]
    optimized_prompt: Option<String>,
    #[serde(default)]
    changes: Option<String>,
}

/// A rewritten prompt and an optional note on what changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub optimized_prompt: String,
    pub changes: Option<String>,
    /// True when the original prompt was returned because the reply was unusable.
    pub fallback: bool,
}

/// Turns operator feedback into a single rewritten prompt.
#[derive(Clone)]
pub struct FeedbackRewriter {
    judge: Arc<dyn ModelClient>,
}

impl FeedbackRewriter {
    pub fn new(judge: Arc<dyn ModelClient>) -> Self {
        Self { judge }
    }

    /// Rewrite the case's system prompt according to `feedback`.
    ///
    /// Feedback without a selected cluster or custom text carries no signal;
    /// the prompt is returned unchanged without calling the judge.
    #[instrument(skip_all)]
    pub async fn rewrite(
        &self,
        case: &TestCase,
        responses: &[AgentResponse],
        feedback: &UserFeedback,
        analysis: Option<&DifferenceAnalysis>,
        cancel: &CancellationToken,
    ) -> Result<Rewrite> {
        if !feedback.has_feedback() {
            debug!("no feedback, keeping prompt");
            return Ok(unchanged(case));
        }

        let samples: Vec<&AgentResponse> = successful(responses)
            .into_iter()
            .take(SAMPLE_RESPONSES)
            .collect();

        let reply = call_judge(
            self.judge.as_ref(),
            REWRITE_INSTRUCTIONS,
            rewrite_request(case, &samples, feedback, analysis),
            cancel,
        )
        .await?;
        Ok(parse_rewrite(&reply, case))
    }
}

/// Decode a rewrite reply; any failure returns the original prompt.
pub fn parse_rewrite(reply: &str, case: &TestCase) -> Rewrite {
    match parse_lenient::<RewriteVerdict>(reply) {
        Ok(RewriteVerdict {
            optimized_prompt: Some(prompt),
            changes,
        }) if !prompt.trim().is_empty() => Rewrite {
            optimized_prompt: prompt,
            changes: changes.filter(|c| !c.trim().is_empty()),
            fallback: false,
        },
        Ok(_) => {
            METRICS.inc_judge_fallbacks();
            obs::emit_judge_fallback("rewriter", &"verdict has no optimizedPrompt");
            unchanged_fallback(case)
        }
        Err(e) => {
            METRICS.inc_judge_fallbacks();
            obs::emit_judge_fallback("rewriter", &e);
            unchanged_fallback(case)
        }
    }
}

fn unchanged(case: &TestCase) -> Rewrite {
    Rewrite {
        optimized_prompt: case.system_prompt.clone(),
        changes: None,
        fallback: false,
    }
}

fn unchanged_fallback(case: &TestCase) -> Rewrite {
    Rewrite {
        fallback: true,
        ..unchanged(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fakes::ScriptedModel;

    fn case() -> TestCase {
        TestCase::new("Answer the question.", "Describe Rust.")
    }

    #[test]
    fn test_parse_rewrite() {
        let rewrite = parse_rewrite(
            r#"{"optimizedPrompt": "Answer in one sentence.", "changes": "shorter"}"#,
            &case(),
        );
        assert_eq!(rewrite.optimized_prompt, "Answer in one sentence.");
        assert_eq!(rewrite.changes.as_deref(), Some("shorter"));
        assert!(!rewrite.fallback);
    }

    #[test]
    fn test_parse_failure_keeps_original_prompt() {
        let rewrite = parse_rewrite("Sorry, I cannot help with that.", &case());
        assert_eq!(rewrite.optimized_prompt, "Answer the question.");
        assert!(rewrite.fallback);

        let rewrite = parse_rewrite(r#"{"changes": "none"}"#, &case());
        assert_eq!(rewrite.optimized_prompt, "Answer the question.");
        assert!(rewrite.fallback);
    }

    #[tokio::test]
    async fn test_samples_are_bounded() {
        let judge = Arc::new(ScriptedModel::new([r#"{"optimizedPrompt": "new"}"#]));
        let rewriter = FeedbackRewriter::new(judge.clone());
        let responses: Vec<AgentResponse> = (1..=4)
            .map(|i| AgentResponse::succeeded(i, format!("output-{i}"), 1))
            .collect();

        let rewrite = rewriter
            .rewrite(
                &case(),
                &responses,
                &UserFeedback::text("be brief"),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(rewrite.optimized_prompt, "new");
        let sent = &judge.requests()[0].user_message;
        assert!(sent.contains("output-1"));
        assert!(sent.contains("output-2"));
        assert!(!sent.contains("output-3"));
    }

    #[tokio::test]
    async fn test_blank_feedback_makes_no_call() {
        let judge = Arc::new(ScriptedModel::new([r#"{"optimizedPrompt": "new"}"#]));
        let rewriter = FeedbackRewriter::new(judge.clone());
        let rewrite = rewriter
            .rewrite(&case(), &[], &UserFeedback::default(), None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(rewrite.optimized_prompt, "Answer the question.");
        assert!(judge.requests().is_empty());
    }
}
