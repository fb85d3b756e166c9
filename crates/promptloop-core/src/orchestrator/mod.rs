//! Optimization sessions.
//!
//! A session owns its test case, its [`StrategyTracker`](crate::strategy::StrategyTracker)
//! and its round history; nothing is shared between sessions.
//!
//! - [`Optimizer`]: automatic mode, runs until the target score or the round budget
//! - [`GuidedSession`]: guided mode, pauses in [`SessionState::AwaitingFeedback`]
//!   between clustering and rewriting until [`GuidedSession::resume`] is called

pub mod automatic;
pub mod guided;
mod session;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AgentResponse, DifferenceAnalysis, EvaluationRecord, UserFeedback};
use crate::strategy::Strategy;

pub use automatic::Optimizer;
pub use guided::{GuidedSession, PausedRound, ResumeOutcome};

/// Project name used when none is given.
pub const DEFAULT_PROJECT: &str = "default";

/// Which loop drove a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Automatic,
    Guided,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Automatic => f.write_str("automatic"),
            SessionMode::Guided => f.write_str("guided"),
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StopReason {
    /// A round's average score reached the target.
    TargetReached,
    /// The round budget was used up.
    BudgetExhausted,
    /// The operator ended a guided session.
    GuidedExit,
    /// The cancellation token fired; the interrupted round was not recorded.
    Cancelled,
    /// A round failed outside the judge's fallback handling.
    Failed(String),
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Failed(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetReached => f.write_str("target_reached"),
            StopReason::BudgetExhausted => f.write_str("budget_exhausted"),
            StopReason::GuidedExit => f.write_str("guided_exit"),
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Lifecycle of a guided session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no round started yet.
    Idle,
    /// Between rounds.
    Running,
    /// A round is scored and clustered and waits for operator feedback.
    AwaitingFeedback,
    /// Terminal.
    Stopped(StopReason),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::AwaitingFeedback => "awaiting_feedback",
            SessionState::Stopped(_) => "stopped",
        }
    }
}

/// Guided-mode inputs that shaped a round's rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub analysis: DifferenceAnalysis,
    /// `None` when the session ended while the round was paused.
    pub feedback: Option<UserFeedback>,
    pub changes: Option<String>,
}

/// Everything produced by one recorded round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub record: EvaluationRecord,
    /// Strategy in force when the round was evaluated.
    pub strategy: Strategy,
    pub report: String,
    pub suggestions: Vec<String>,
    /// The judge verdict was unreadable and neutral scores were used.
    pub judge_fallback: bool,
    pub responses: Vec<AgentResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<Guidance>,
}

/// Final summary of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub project: String,
    pub mode: SessionMode,
    pub stop_reason: StopReason,
    pub rounds: Vec<RoundOutcome>,
    /// The system prompt the next round would have used.
    pub final_prompt: String,
    /// Highest-average round, earliest on ties.
    pub best_round: Option<EvaluationRecord>,
    pub final_strategy: Strategy,
}

impl SessionReport {
    pub fn history(&self) -> Vec<&EvaluationRecord> {
        self.rounds.iter().map(|r| &r.record).collect()
    }

    pub fn last_round(&self) -> Option<&RoundOutcome> {
        self.rounds.last()
    }
}
