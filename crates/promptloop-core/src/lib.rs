//! PromptLoop Core Library
//!
//! Adaptive prompt optimization: run a prompt N times in parallel, have a
//! judge model score the outputs for stability and correctness, and feed the
//! judge's rewrite (automatic mode) or an operator's choice (guided mode)
//! into the next round, biased by a history-driven strategy.

pub mod config;
pub mod domain;
pub mod execution;
pub mod judge;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod orchestrator;
pub mod store;
pub mod strategy;
pub mod telemetry;

pub use config::{CaseDefaults, ModelEndpoint, OptimizerConfig, PromptLoopConfig};

pub use domain::{
    AgentResponse, DifferenceAnalysis, Evaluation, EvaluationRecord, PromptLoopError,
    ResponseCluster, Result, TestCase, UserFeedback, ValidationError,
};

pub use execution::{execute_once, run_parallel};

pub use judge::{ClusteringAnalyzer, FeedbackRewriter, ResponseEvaluator, Rewrite};

pub use model::{ModelClient, ModelError, ModelReply, ModelRequest, OpenAiCompatibleClient};

pub use orchestrator::{
    GuidedSession, Optimizer, PausedRound, ResumeOutcome, RoundOutcome, SessionMode,
    SessionReport, SessionState, StopReason,
};

pub use store::{FsSessionStore, MemorySessionStore, PromptVersion, SessionStore, StoreError};

pub use strategy::{Strategy, StrategyTracker, StrategyTransition};

pub use telemetry::init_tracing;

/// Re-exported so callers can cancel sessions without naming `tokio-util`.
pub use tokio_util::sync::CancellationToken;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
