//! Domain models for PromptLoop.
//!
//! Canonical definitions for the core entities:
//! - `TestCase`: Immutable per-round input
//! - `AgentResponse`: One execution outcome
//! - `Evaluation` / `EvaluationRecord`: Judge verdict and round history entry
//! - `DifferenceAnalysis` / `UserFeedback`: Guided-mode artifacts

pub mod analysis;
pub mod error;
pub mod record;
pub mod response;
pub mod test_case;

// Re-export main types and errors
pub use analysis::{DifferenceAnalysis, ResponseCluster, UserFeedback};
pub use error::{PromptLoopError, Result, ValidationError};
pub use record::{average_score, clamp_score, Evaluation, EvaluationRecord, NEUTRAL_SCORE};
pub use response::{successful, AgentResponse};
pub use test_case::{TestCase, DEFAULT_EXECUTION_COUNT, DEFAULT_TEMPERATURE, TEMPERATURE_RANGE};
