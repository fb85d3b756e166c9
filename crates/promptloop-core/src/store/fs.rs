use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PromptVersion, SessionStore, StoreError, StoreResult};
use crate::domain::EvaluationRecord;

/// Filesystem-backed store writing one JSON array per session and project.
///
/// Layout:
/// - `<root>/records/<session-id>.json`
/// - `<root>/prompts/<project>.json`
///
/// Writes are atomic (temp file in the same directory, then rename) and
/// serialised through an in-process lock.
pub struct FsSessionStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsSessionStore {
    /// Create a store rooted at `root`, creating its directories if needed.
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("records"))?;
        std::fs::create_dir_all(root.join("prompts"))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn records_path(&self, session_id: Uuid) -> PathBuf {
        self.root.join("records").join(format!("{session_id}.json"))
    }

    fn prompts_path(&self, project: &str) -> PathBuf {
        self.root
            .join("prompts")
            .join(format!("{}.json", sanitize_file_stem(project)))
    }
}

/// Map a project name to a safe file stem.
fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "default".to_string()
    } else {
        stem
    }
}

async fn read_list<T>(path: PathBuf) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> StoreResult<Vec<T>> {
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    })
    .await
    .map_err(|e| StoreError::Backend(e.to_string()))?
}

async fn write_list<T>(path: PathBuf, items: Vec<T>) -> StoreResult<()>
where
    T: Serialize + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> StoreResult<()> {
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Backend(format!("{} has no parent", path.display())))?;
        let bytes = serde_json::to_vec_pretty(&items)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Backend(e.to_string()))?
}

#[async_trait]
impl SessionStore for FsSessionStore {
    async fn append_record(&self, session_id: Uuid, record: &EvaluationRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.records_path(session_id);
        let mut records: Vec<EvaluationRecord> = read_list(path.clone()).await?;
        records.push(record.clone());
        write_list(path, records).await
    }

    async fn records(&self, session_id: Uuid) -> StoreResult<Vec<EvaluationRecord>> {
        read_list(self.records_path(session_id)).await
    }

    async fn save_prompt_version(&self, version: &PromptVersion) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.prompts_path(&version.project);
        let mut versions: Vec<PromptVersion> = read_list(path.clone()).await?;
        if versions.iter().any(|v| v.digest == version.digest) {
            return Ok(false);
        }
        versions.push(version.clone());
        write_list(path, versions).await?;
        Ok(true)
    }

    async fn prompt_versions(&self, project: &str) -> StoreResult<Vec<PromptVersion>> {
        read_list(self.prompts_path(project)).await
    }
}
