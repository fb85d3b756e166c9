//! Guided mode: an operator picks the preferred response style each round.
//!
//! ```text
//! Idle ──begin_round──▶ AwaitingFeedback ──resume(feedback)──▶ Running ──begin_round──▶ ...
//!                          │      ▲
//!                          │      └── resume(no feedback): no-op, stays paused
//!                          └──finish──▶ Stopped(GuidedExit)
//! ```
//!
//! The pause is a state, not a blocked task: the session value can be held
//! for as long as the operator needs, or dropped to abandon it.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument, Span};

use super::session::{score_round, stop_reason_for, RoundDraft, SessionCore};
use super::{
    Guidance, RoundOutcome, SessionMode, SessionReport, SessionState, StopReason,
    DEFAULT_PROJECT,
};
use crate::domain::{
    AgentResponse, DifferenceAnalysis, Evaluation, EvaluationRecord, PromptLoopError, Result,
    TestCase, UserFeedback,
};
use crate::judge::{ClusteringAnalyzer, FeedbackRewriter, ResponseEvaluator, Rewrite};
use crate::model::ModelClient;
use crate::obs;
use crate::store::SessionStore;
use crate::strategy::{Strategy, StrategyTransition};

/// A scored and clustered round waiting for operator feedback.
#[derive(Debug, Clone, Serialize)]
pub struct PausedRound {
    pub round: u32,
    pub strategy: Strategy,
    pub responses: Vec<AgentResponse>,
    pub evaluation: Evaluation,
    pub analysis: DifferenceAnalysis,
}

/// Result of [`GuidedSession::resume`].
#[derive(Debug, Clone)]
pub enum ResumeOutcome {
    /// The feedback carried no selection and no text; the rewriter was not
    /// called and the session is still paused on the same round.
    NoFeedback,
    /// The rewrite was applied and the round recorded.
    Applied {
        rewrite: Rewrite,
        transition: StrategyTransition,
    },
}

/// One human-in-the-loop optimization session.
pub struct GuidedSession {
    target: Arc<dyn ModelClient>,
    evaluator: ResponseEvaluator,
    clustering: ClusteringAnalyzer,
    rewriter: FeedbackRewriter,
    core: SessionCore,
    state: SessionState,
    paused: Option<PausedRound>,
    span: Span,
}

impl GuidedSession {
    /// # Errors
    ///
    /// Returns `PromptLoopError::InvalidTestCase` if `case` is invalid.
    pub fn new(
        target: Arc<dyn ModelClient>,
        judge: Arc<dyn ModelClient>,
        case: TestCase,
    ) -> Result<Self> {
        case.validate()?;
        let core = SessionCore::new(SessionMode::Guided, DEFAULT_PROJECT.to_string(), case, None);
        let span = obs::session_span(&core.id.to_string());
        Ok(Self {
            target,
            evaluator: ResponseEvaluator::new(Arc::clone(&judge)),
            clustering: ClusteringAnalyzer::new(Arc::clone(&judge)),
            rewriter: FeedbackRewriter::new(judge),
            core,
            state: SessionState::Idle,
            paused: None,
            span,
        })
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.core.set_project(project.into());
        self
    }

    /// Hand every recorded round to `store`. Store failures are logged only.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.core.set_store(store);
        self
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.core.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The round awaiting feedback, if paused.
    pub fn paused(&self) -> Option<&PausedRound> {
        self.paused.as_ref()
    }

    /// The case the next round runs with.
    pub fn current_case(&self) -> &TestCase {
        self.core.case()
    }

    pub fn strategy(&self) -> Strategy {
        self.core.strategy()
    }

    pub fn history(&self) -> &[EvaluationRecord] {
        self.core.tracker().history()
    }

    pub fn rounds(&self) -> &[RoundOutcome] {
        self.core.outcomes()
    }

    /// Execute, score and cluster the next round, then pause for feedback.
    ///
    /// # Errors
    ///
    /// - `PromptLoopError::InvalidState` unless the session is idle or running.
    /// - Any round failure; the session then stops with the matching
    ///   [`StopReason`] and the interrupted round is not recorded.
    pub async fn begin_round(&mut self, cancel: &CancellationToken) -> Result<&PausedRound> {
        match self.state {
            SessionState::Idle => {
                self.core.announce().instrument(self.span.clone()).await;
                self.state = SessionState::Running;
            }
            SessionState::Running => {}
            _ => return Err(self.invalid("begin a round")),
        }

        let round = self.core.next_round();
        let strategy = self.core.strategy();
        let case = self.core.case();
        let (target, evaluator, clustering) = (&self.target, &self.evaluator, &self.clustering);

        let scored = async {
            obs::emit_round_started(round, strategy);
            let (responses, evaluation) =
                score_round(target, evaluator, case, round, strategy, cancel).await?;
            let analysis = clustering.analyze(case, &responses, cancel).await?;
            Ok::<_, PromptLoopError>((responses, evaluation, analysis))
        }
        .instrument(self.span.clone())
        .await;

        match scored {
            Ok((responses, evaluation, analysis)) => {
                self.state = SessionState::AwaitingFeedback;
                Ok(self.paused.insert(PausedRound {
                    round,
                    strategy,
                    responses,
                    evaluation,
                    analysis,
                }))
            }
            Err(e) => {
                self.stop(stop_reason_for(&e));
                Err(e)
            }
        }
    }

    /// Apply operator feedback to the paused round.
    ///
    /// Feedback with neither a selected cluster nor custom text is a no-op:
    /// the rewriter is not called and the session stays paused.
    ///
    /// # Errors
    ///
    /// - `PromptLoopError::InvalidState` unless the session is awaiting feedback.
    /// - Any rewrite failure; the session then stops and the paused round is
    ///   discarded.
    pub async fn resume(
        &mut self,
        feedback: UserFeedback,
        cancel: &CancellationToken,
    ) -> Result<ResumeOutcome> {
        if self.state != SessionState::AwaitingFeedback {
            return Err(self.invalid("resume"));
        }
        if !feedback.has_feedback() {
            debug!(parent: &self.span, "empty feedback, round stays paused");
            return Ok(ResumeOutcome::NoFeedback);
        }
        let Some(paused) = self.paused.as_ref() else {
            return Err(self.invalid("resume"));
        };

        let rewritten = self
            .rewriter
            .rewrite(
                self.core.case(),
                &paused.responses,
                &feedback,
                Some(&paused.analysis),
                cancel,
            )
            .instrument(self.span.clone())
            .await;
        let rewrite = match rewritten {
            Ok(rewrite) => rewrite,
            Err(e) => {
                self.paused = None;
                self.stop(stop_reason_for(&e));
                return Err(e);
            }
        };

        let Some(paused) = self.paused.take() else {
            return Err(self.invalid("resume"));
        };
        let draft = RoundDraft {
            round: paused.round,
            strategy: paused.strategy,
            responses: paused.responses,
            evaluation: paused.evaluation,
            prompt_after: rewrite.optimized_prompt.clone(),
            guidance: Some(Guidance {
                analysis: paused.analysis,
                feedback: Some(feedback),
                changes: rewrite.changes.clone(),
            }),
        };
        let transition = match self.core.commit(draft).instrument(self.span.clone()).await {
            Ok(transition) => transition,
            Err(e) => {
                self.stop(stop_reason_for(&e));
                return Err(e);
            }
        };

        self.state = SessionState::Running;
        Ok(ResumeOutcome::Applied {
            rewrite,
            transition,
        })
    }

    /// End the session and produce its report.
    ///
    /// A round paused for feedback is recorded with the prompt unchanged. A
    /// session that already stopped keeps its stop reason.
    pub async fn finish(mut self) -> SessionReport {
        if let Some(paused) = self.paused.take() {
            let draft = RoundDraft {
                round: paused.round,
                strategy: paused.strategy,
                responses: paused.responses,
                evaluation: paused.evaluation,
                prompt_after: self.core.case().system_prompt.clone(),
                guidance: Some(Guidance {
                    analysis: paused.analysis,
                    feedback: None,
                    changes: None,
                }),
            };
            if let Err(e) = self.core.commit(draft).instrument(self.span.clone()).await {
                tracing::warn!(parent: &self.span, error = %e, "paused round not recorded");
            }
        }

        let reason = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Stopped(reason) => reason,
            _ => {
                self.stop(StopReason::GuidedExit);
                StopReason::GuidedExit
            }
        };
        self.core.report(reason)
    }

    fn stop(&mut self, reason: StopReason) {
        let _entered = self.span.enter();
        self.core.emit_stopped(&reason);
        self.state = SessionState::Stopped(reason);
    }

    fn invalid(&self, action: &str) -> PromptLoopError {
        PromptLoopError::InvalidState {
            state: self.state.name().to_string(),
            action: action.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fakes::{CannedModel, ScriptedModel};
    use crate::model::ModelError;

    const EVAL: &str = r#"{"stabilityScore": 60, "correctnessScore": 70, "evaluationReport": "mixed", "optimizedPrompt": "ignored in guided mode"}"#;
    const CLUSTERS: &str = r#"{"clusters": [{"name": "Terse", "description": "number only", "responseIndices": [1, 2, 3]}], "summary": "uniform"}"#;
    const REWRITE: &str = r#"{"optimizedPrompt": "Reply with the number only.", "changes": "format rule"}"#;

    fn session(judge: Arc<ScriptedModel>) -> GuidedSession {
        GuidedSession::new(
            Arc::new(CannedModel::new("4")),
            judge,
            TestCase::new("Answer tersely", "2+2?").with_expected_answer("4"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_round_pauses_after_clustering() {
        let judge = Arc::new(ScriptedModel::new([EVAL, CLUSTERS]));
        let mut session = session(judge.clone());

        let paused = session.begin_round(&CancellationToken::new()).await.unwrap();
        assert_eq!(paused.round, 1);
        assert_eq!(paused.analysis.clusters[0].name, "Terse");
        assert_eq!(paused.evaluation.stability_score, 60);

        assert_eq!(session.state(), &SessionState::AwaitingFeedback);
        assert!(session.history().is_empty());
        assert_eq!(judge.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_feedback_is_a_no_op() {
        let judge = Arc::new(ScriptedModel::new([EVAL, CLUSTERS, REWRITE]));
        let mut session = session(judge.clone());
        let cancel = CancellationToken::new();
        session.begin_round(&cancel).await.unwrap();

        let outcome = session
            .resume(UserFeedback::text("   "), &cancel)
            .await
            .unwrap();

        assert!(matches!(outcome, ResumeOutcome::NoFeedback));
        assert_eq!(judge.requests().len(), 2);
        assert_eq!(session.state(), &SessionState::AwaitingFeedback);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_rewrites_and_records_round() {
        let judge = Arc::new(ScriptedModel::new([EVAL, CLUSTERS, REWRITE]));
        let mut session = session(judge.clone());
        let cancel = CancellationToken::new();
        session.begin_round(&cancel).await.unwrap();

        let outcome = session
            .resume(UserFeedback::cluster("Terse"), &cancel)
            .await
            .unwrap();

        let ResumeOutcome::Applied { rewrite, .. } = outcome else {
            panic!("expected applied rewrite");
        };
        assert_eq!(rewrite.optimized_prompt, "Reply with the number only.");
        assert_eq!(session.state(), &SessionState::Running);
        assert_eq!(session.current_case().system_prompt, "Reply with the number only.");
        assert_eq!(session.current_case().question, "2+2?");

        let record = &session.history()[0];
        assert_eq!(record.prompt_before, "Answer tersely");
        assert_eq!(record.average_score, 65.0);
        assert!(judge.requests()[2].user_message.contains("Terse"));
    }

    #[tokio::test]
    async fn test_finish_while_paused_records_unchanged_prompt() {
        let judge = Arc::new(ScriptedModel::new([EVAL, CLUSTERS]));
        let mut session = session(judge);
        session.begin_round(&CancellationToken::new()).await.unwrap();

        let report = session.finish().await;

        assert_eq!(report.stop_reason, StopReason::GuidedExit);
        assert_eq!(report.rounds.len(), 1);
        assert!(!report.rounds[0].record.prompt_changed());
        assert_eq!(report.final_prompt, "Answer tersely");
    }

    #[tokio::test]
    async fn test_resume_requires_pause() {
        let mut session = session(Arc::new(ScriptedModel::new([EVAL])));
        let err = session
            .resume(UserFeedback::text("shorter"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PromptLoopError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_begin_round_twice_is_rejected() {
        let judge = Arc::new(ScriptedModel::new([EVAL, CLUSTERS]));
        let mut session = session(judge);
        let cancel = CancellationToken::new();
        session.begin_round(&cancel).await.unwrap();

        let err = session.begin_round(&cancel).await.unwrap_err();
        assert!(matches!(err, PromptLoopError::InvalidState { .. }));
        assert_eq!(session.state(), &SessionState::AwaitingFeedback);
    }

    #[tokio::test]
    async fn test_judge_failure_stops_session() {
        let judge = Arc::new(ScriptedModel::from_results([Err(ModelError::Timeout {
            secs: 30,
        })]));
        let mut session = session(judge);

        assert!(session.begin_round(&CancellationToken::new()).await.is_err());
        assert!(session.state().is_terminal());

        let report = session.finish().await;
        assert!(report.stop_reason.is_failure());
        assert!(report.rounds.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_round_is_not_recorded() {
        let judge = Arc::new(ScriptedModel::new([EVAL, CLUSTERS]));
        let mut session = session(judge);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = session.begin_round(&cancel).await.unwrap_err();
        assert!(matches!(err, PromptLoopError::Cancelled));
        assert_eq!(
            session.state(),
            &SessionState::Stopped(StopReason::Cancelled)
        );
        assert!(session.finish().await.rounds.is_empty());
    }
}
