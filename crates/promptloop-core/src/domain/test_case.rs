//! Per-round test case definition.

use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Default number of parallel executions per round.
pub const DEFAULT_EXECUTION_COUNT: u32 = 3;

/// Default sampling temperature for the model under test.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Inclusive bounds for the sampling temperature.
pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);

/// Immutable input for one round: the prompt under test and how to run it.
///
/// A rewrite never mutates a case; [`TestCase::with_system_prompt`] produces
/// the next round's case with every other field carried over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Instruction context given to the model under test.
    pub system_prompt: String,

    /// User turn sent with every execution.
    pub question: String,

    /// Reference answer for correctness scoring. May be empty.
    #[serde(default)]
    pub expected_answer: String,

    /// Number of parallel executions (N).
    pub execution_count: u32,

    /// Sampling temperature for every execution.
    pub temperature: f32,
}

impl TestCase {
    /// Create a case with default execution count and temperature.
    pub fn new(system_prompt: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            question: question.into(),
            expected_answer: String::new(),
            execution_count: DEFAULT_EXECUTION_COUNT,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_expected_answer(mut self, expected: impl Into<String>) -> Self {
        self.expected_answer = expected.into();
        self
    }

    pub fn with_execution_count(mut self, count: u32) -> Self {
        self.execution_count = count;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Derive the next round's case: new system prompt, everything else kept.
    pub fn with_system_prompt(&self, system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..self.clone()
        }
    }

    /// Whether an expected answer was supplied.
    pub fn has_expected_answer(&self) -> bool {
        !self.expected_answer.trim().is_empty()
    }

    /// Check the case before any model call is issued.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.system_prompt.trim().is_empty() {
            return Err(ValidationError::EmptySystemPrompt);
        }
        if self.question.trim().is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }
        if self.execution_count == 0 {
            return Err(ValidationError::ExecutionCount { count: 0 });
        }
        let (min, max) = TEMPERATURE_RANGE;
        if !(min..=max).contains(&self.temperature) {
            return Err(ValidationError::Temperature {
                value: self.temperature,
                min,
                max,
            });
        }
        Ok(())
    }
}
