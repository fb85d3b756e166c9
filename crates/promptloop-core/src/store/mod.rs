//! Persistence collaborator for round history and prompt versions.
//!
//! The optimization loop runs entirely in memory and only *hands* completed
//! rounds to a [`SessionStore`]; nothing in the loop reads them back.
//!
//! - [`MemorySessionStore`]: in-memory, for tests
//! - [`FsSessionStore`]: JSON files under a root directory

pub mod fs;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::EvaluationRecord;

pub use fs::FsSessionStore;
pub use memory::MemorySessionStore;

/// Errors from the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// SHA-256 hex digest of a prompt's text.
pub fn prompt_digest(prompt: &str) -> String {
    hex::encode(Sha256::digest(prompt.as_bytes()))
}

/// A prompt produced during a session, addressed by its content digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVersion {
    pub digest: String,
    pub project: String,
    /// Round whose rewrite produced this prompt; 0 for the initial prompt.
    pub round: u32,
    pub prompt: String,
    /// Average score of the round whose judge proposed this prompt.
    pub average_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl PromptVersion {
    pub fn new(project: impl Into<String>, round: u32, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        Self {
            digest: prompt_digest(&prompt),
            project: project.into(),
            round,
            prompt,
            average_score: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_average_score(mut self, score: f64) -> Self {
        self.average_score = Some(score);
        self
    }

    /// Short form of the digest (first 12 hex chars).
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

/// Storage for round history and prompt versions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a completed round to a session's history.
    async fn append_record(&self, session_id: Uuid, record: &EvaluationRecord) -> StoreResult<()>;

    /// All rounds of a session in recorded order. Empty if unknown.
    async fn records(&self, session_id: Uuid) -> StoreResult<Vec<EvaluationRecord>>;

    /// Store a prompt version. Returns `false` if the project already holds
    /// a version with the same digest.
    async fn save_prompt_version(&self, version: &PromptVersion) -> StoreResult<bool>;

    /// All prompt versions of a project in saved order. Empty if unknown.
    async fn prompt_versions(&self, project: &str) -> StoreResult<Vec<PromptVersion>>;
}
