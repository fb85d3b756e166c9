use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::{PromptVersion, SessionStore, StoreResult};
use crate::domain::EvaluationRecord;

/// In-memory store backed by two `HashMap`s.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<Uuid, Vec<EvaluationRecord>>>,
    prompts: Mutex<HashMap<String, Vec<PromptVersion>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn append_record(&self, session_id: Uuid, record: &EvaluationRecord) -> StoreResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(session_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn records(&self, session_id: Uuid) -> StoreResult<Vec<EvaluationRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&session_id).cloned().unwrap_or_default())
    }

    async fn save_prompt_version(&self, version: &PromptVersion) -> StoreResult<bool> {
        let mut prompts = self.prompts.lock().unwrap_or_else(PoisonError::into_inner);
        let versions = prompts.entry(version.project.clone()).or_default();
        if versions.iter().any(|v| v.digest == version.digest) {
            return Ok(false);
        }
        versions.push(version.clone());
        Ok(true)
    }

    async fn prompt_versions(&self, project: &str) -> StoreResult<Vec<PromptVersion>> {
        let prompts = self.prompts.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(prompts.get(project).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_are_per_session() {
        let store = MemorySessionStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store
            .append_record(a, &EvaluationRecord::new(1, 50, 50, "p", "q"))
            .await
            .unwrap();
        store
            .append_record(a, &EvaluationRecord::new(2, 60, 60, "q", "r"))
            .await
            .unwrap();

        assert_eq!(store.records(a).await.unwrap().len(), 2);
        assert!(store.records(b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_versions_dedupe_by_digest() {
        let store = MemorySessionStore::new();
        assert!(store
            .save_prompt_version(&PromptVersion::new("demo", 0, "v1"))
            .await
            .unwrap());
        assert!(!store
            .save_prompt_version(&PromptVersion::new("demo", 2, "v1"))
            .await
            .unwrap());
        assert!(store
            .save_prompt_version(&PromptVersion::new("demo", 1, "v2"))
            .await
            .unwrap());

        let versions = store.prompt_versions("demo").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].round, 0);
    }
}
