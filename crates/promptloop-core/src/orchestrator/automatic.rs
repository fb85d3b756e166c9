//! Automatic mode: the judge's own rewrite feeds the next round.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::session::{score_round, stop_reason_for, RoundDraft, SessionCore};
use super::{SessionMode, SessionReport, StopReason, DEFAULT_PROJECT};
use crate::config::OptimizerConfig;
use crate::domain::{Result, TestCase};
use crate::judge::ResponseEvaluator;
use crate::model::ModelClient;
use crate::obs;
use crate::store::SessionStore;

/// Runs execute → evaluate → record rounds until the target score is reached,
/// the round budget is used up, the token is cancelled or a round fails.
///
/// An `Optimizer` holds no session state; every [`run`](Self::run) starts a
/// fresh session with its own tracker, so one optimizer can drive several
/// sessions concurrently.
#[derive(Clone)]
pub struct Optimizer {
    target: Arc<dyn ModelClient>,
    evaluator: ResponseEvaluator,
    settings: OptimizerConfig,
    project: String,
    store: Option<Arc<dyn SessionStore>>,
}

impl Optimizer {
    pub fn new(
        target: Arc<dyn ModelClient>,
        judge: Arc<dyn ModelClient>,
        settings: OptimizerConfig,
    ) -> Self {
        Self {
            target,
            evaluator: ResponseEvaluator::new(judge),
            settings,
            project: DEFAULT_PROJECT.to_string(),
            store: None,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Hand every recorded round to `store`. Store failures are logged only.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn settings(&self) -> &OptimizerConfig {
        &self.settings
    }

    /// Optimize `case` in a new session.
    ///
    /// Round failures do not surface as errors: they end the session with
    /// [`StopReason::Failed`] or [`StopReason::Cancelled`] and the report keeps
    /// every round recorded before.
    ///
    /// # Errors
    ///
    /// Returns `PromptLoopError::InvalidTestCase` if the initial case is invalid.
    pub async fn run(&self, case: TestCase, cancel: &CancellationToken) -> Result<SessionReport> {
        case.validate()?;
        let mut session = SessionCore::new(
            SessionMode::Automatic,
            self.project.clone(),
            case,
            self.store.clone(),
        );
        let span = obs::session_span(&session.id.to_string());
        let stop = self.drive(&mut session, cancel).instrument(span).await;

        session.emit_stopped(&stop);
        Ok(session.report(stop))
    }

    async fn drive(&self, session: &mut SessionCore, cancel: &CancellationToken) -> StopReason {
        session.announce().await;

        loop {
            if cancel.is_cancelled() {
                return StopReason::Cancelled;
            }
            if session.rounds() >= self.settings.max_rounds as usize {
                return StopReason::BudgetExhausted;
            }

            let round = session.next_round();
            let strategy = session.strategy();
            obs::emit_round_started(round, strategy);

            let (responses, evaluation) = match score_round(
                &self.target,
                &self.evaluator,
                session.case(),
                round,
                strategy,
                cancel,
            )
            .await
            {
                Ok(scored) => scored,
                Err(e) => return stop_reason_for(&e),
            };

            let average = evaluation.average_score();
            let draft = RoundDraft {
                round,
                strategy,
                responses,
                prompt_after: evaluation.optimized_prompt.clone(),
                evaluation,
                guidance: None,
            };
            if let Err(e) = session.commit(draft).await {
                return stop_reason_for(&e);
            }

            if average >= self.settings.target_score {
                return StopReason::TargetReached;
            }
        }
    }
}
