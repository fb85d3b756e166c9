//! Response evaluator: scores a response set and proposes a rewrite.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::call_judge;
use super::parse::{lenient_number, lenient_string_list, parse_lenient_where, JudgeParseError};
use super::prompts::{evaluation_request, EVALUATOR_INSTRUCTIONS};
use crate::domain::{clamp_score, AgentResponse, Evaluation, Result, TestCase, NEUTRAL_SCORE};
use crate::metrics::METRICS;
use crate::model::ModelClient;
use crate::obs;
use crate::strategy::Strategy;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationVerdict {
    #[serde(default, deserialize_with = "lenient_number")]
    stability_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    correctness_score: Option<f64>,
    #[serde(default)]
    evaluation_report: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    suggestions: Vec<String>,
    #[serde(default)]
    optimized_prompt: Option<String>,
}

impl EvaluationVerdict {
    /// An object with neither score is not a verdict.
    fn has_scores(&self) -> bool {
        self.stability_score.is_some() || self.correctness_score.is_some()
    }
}

/// Sends the full response set to the judge and reads back a verdict.
#[derive(Clone)]
pub struct ResponseEvaluator {
    judge: Arc<dyn ModelClient>,
}

impl ResponseEvaluator {
    pub fn new(judge: Arc<dyn ModelClient>) -> Self {
        Self { judge }
    }

    /// Evaluate one round's responses under the given strategy.
    ///
    /// The strategy's instruction fragment is prefixed to the judge's
    /// instructions. An unreadable verdict resolves to
    /// [`fallback_evaluation`]; only a failed call or cancellation errors.
    #[instrument(skip_all, fields(strategy = %strategy, runs = responses.len()))]
    pub async fn evaluate(
        &self,
        case: &TestCase,
        responses: &[AgentResponse],
        strategy: Strategy,
        cancel: &CancellationToken,
    ) -> Result<Evaluation> {
        let instructions = format!("{}{}", strategy.instruction(), EVALUATOR_INSTRUCTIONS);
        let reply = call_judge(
            self.judge.as_ref(),
            &instructions,
            evaluation_request(case, responses),
            cancel,
        )
        .await?;
        Ok(parse_evaluation(&reply, case))
    }
}

/// Decode a judge reply into an [`Evaluation`], falling back on failure.
///
/// Objects without any score are skipped, so an example quoted ahead of the
/// verdict does not shadow it.
pub fn parse_evaluation(reply: &str, case: &TestCase) -> Evaluation {
    match parse_lenient_where(reply, EvaluationVerdict::has_scores) {
        Ok(verdict) => from_verdict(verdict, case),
        Err(e) => {
            METRICS.inc_judge_fallbacks();
            obs::emit_judge_fallback("evaluator", &e);
            fallback_evaluation(reply, &e, case)
        }
    }
}

fn from_verdict(verdict: EvaluationVerdict, case: &TestCase) -> Evaluation {
    let optimized_prompt = verdict
        .optimized_prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| case.system_prompt.clone());

    Evaluation {
        stability_score: verdict.stability_score.map_or(NEUTRAL_SCORE, clamp_score),
        correctness_score: verdict.correctness_score.map_or(NEUTRAL_SCORE, clamp_score),
        report: verdict.evaluation_report.unwrap_or_default(),
        suggestions: verdict.suggestions,
        optimized_prompt,
        fallback: false,
    }
}

/// Neutral verdict used when the judge reply cannot be decoded: the raw
/// text becomes the report, both scores are 50, the prompt is kept.
pub fn fallback_evaluation(raw: &str, reason: &JudgeParseError, case: &TestCase) -> Evaluation {
    Evaluation {
        stability_score: NEUTRAL_SCORE,
        correctness_score: NEUTRAL_SCORE,
        report: raw.to_string(),
        suggestions: vec![format!(
            "The judge reply could not be parsed ({reason}); scores default to {NEUTRAL_SCORE}."
        )],
        optimized_prompt: case.system_prompt.clone(),
        fallback: true,
    }
}
