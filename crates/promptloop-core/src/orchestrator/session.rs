//! State shared by both session drivers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Guidance, RoundOutcome, SessionMode, SessionReport, StopReason};
use crate::domain::{AgentResponse, Evaluation, EvaluationRecord, PromptLoopError, Result, TestCase};
use crate::execution::run_parallel;
use crate::judge::ResponseEvaluator;
use crate::metrics::METRICS;
use crate::model::ModelClient;
use crate::obs;
use crate::store::{PromptVersion, SessionStore};
use crate::strategy::{Strategy, StrategyTracker, StrategyTransition};

/// A scored round waiting to be recorded.
pub(crate) struct RoundDraft {
    pub round: u32,
    pub strategy: Strategy,
    pub responses: Vec<AgentResponse>,
    pub evaluation: Evaluation,
    pub prompt_after: String,
    pub guidance: Option<Guidance>,
}

/// Per-session case, history and persistence handle.
pub(crate) struct SessionCore {
    pub id: Uuid,
    pub project: String,
    pub mode: SessionMode,
    case: TestCase,
    tracker: StrategyTracker,
    outcomes: Vec<RoundOutcome>,
    store: Option<Arc<dyn SessionStore>>,
}

impl SessionCore {
    pub fn new(
        mode: SessionMode,
        project: String,
        case: TestCase,
        store: Option<Arc<dyn SessionStore>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project,
            mode,
            case,
            tracker: StrategyTracker::new(),
            outcomes: Vec::new(),
            store,
        }
    }

    pub fn case(&self) -> &TestCase {
        &self.case
    }

    pub fn strategy(&self) -> Strategy {
        self.tracker.current()
    }

    pub fn next_round(&self) -> u32 {
        self.tracker.last_round() + 1
    }

    pub fn rounds(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcomes(&self) -> &[RoundOutcome] {
        &self.outcomes
    }

    pub fn tracker(&self) -> &StrategyTracker {
        &self.tracker
    }

    pub fn set_project(&mut self, project: String) {
        self.project = project;
    }

    pub fn set_store(&mut self, store: Arc<dyn SessionStore>) {
        self.store = Some(store);
    }

    /// Log the session start and hand the initial prompt to the store.
    pub async fn announce(&self) {
        obs::emit_session_started(
            &self.id.to_string(),
            &self.mode.to_string(),
            self.case.execution_count,
        );
        let Some(store) = &self.store else {
            return;
        };
        let version = PromptVersion::new(&self.project, 0, &self.case.system_prompt);
        if let Err(e) = store.save_prompt_version(&version).await {
            obs::emit_store_failed("save_prompt_version", &e);
        }
    }

    /// Record a completed round into the tracker and history, and move the
    /// case on to the round's resulting prompt.
    pub async fn commit(&mut self, draft: RoundDraft) -> Result<StrategyTransition> {
        let record = EvaluationRecord::new(
            draft.round,
            draft.evaluation.stability_score,
            draft.evaluation.correctness_score,
            self.case.system_prompt.clone(),
            draft.prompt_after,
        );
        let transition = self.tracker.record(record.clone())?;
        METRICS.inc_rounds();
        if transition.changed() {
            obs::emit_strategy_changed(draft.round, transition.from, transition.to);
        }

        self.persist(&record).await;
        if record.prompt_changed() {
            self.case = self.case.with_system_prompt(record.prompt_after.clone());
        }

        self.outcomes.push(RoundOutcome {
            record,
            strategy: draft.strategy,
            report: draft.evaluation.report,
            suggestions: draft.evaluation.suggestions,
            judge_fallback: draft.evaluation.fallback,
            responses: draft.responses,
            guidance: draft.guidance,
        });
        Ok(transition)
    }

    async fn persist(&self, record: &EvaluationRecord) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.append_record(self.id, record).await {
            obs::emit_store_failed("append_record", &e);
        }
        if record.prompt_changed() {
            let version = PromptVersion::new(&self.project, record.round, &record.prompt_after)
                .with_average_score(record.average_score);
            if let Err(e) = store.save_prompt_version(&version).await {
                obs::emit_store_failed("save_prompt_version", &e);
            }
        }
    }

    pub fn report(&self, stop_reason: StopReason) -> SessionReport {
        SessionReport {
            session_id: self.id,
            project: self.project.clone(),
            mode: self.mode,
            stop_reason,
            rounds: self.outcomes.clone(),
            final_prompt: self.case.system_prompt.clone(),
            best_round: self.tracker.best_record().cloned(),
            final_strategy: self.tracker.current(),
        }
    }

    pub fn emit_stopped(&self, reason: &StopReason) {
        obs::emit_session_stopped(&self.id.to_string(), &reason.to_string(), self.outcomes.len());
    }
}

/// Map a round error to the terminal reason it causes.
pub(crate) fn stop_reason_for(error: &PromptLoopError) -> StopReason {
    match error {
        PromptLoopError::Cancelled => StopReason::Cancelled,
        other => StopReason::Failed(other.to_string()),
    }
}

/// Run the parallel batch for `case` and score it under `strategy`.
pub(crate) async fn score_round(
    target: &Arc<dyn ModelClient>,
    evaluator: &ResponseEvaluator,
    case: &TestCase,
    round: u32,
    strategy: Strategy,
    cancel: &CancellationToken,
) -> Result<(Vec<AgentResponse>, Evaluation)> {
    let responses = run_parallel(Arc::clone(target), case, cancel).await?;
    let evaluation = evaluator
        .evaluate(case, &responses, strategy, cancel)
        .await?;

    let failed_runs = responses.iter().filter(|r| !r.success).count();
    obs::emit_round_scored(
        round,
        evaluation.stability_score,
        evaluation.correctness_score,
        failed_runs,
    );
    Ok((responses, evaluation))
}
