//! In-memory model clients for tests
//!
//! Provides `CannedModel`, `ScriptedModel` and `FailingModel`, which satisfy
//! the [`ModelClient`] contract without any network access. Every fake keeps
//! the requests it received so tests can inspect what was sent.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{ModelClient, ModelError, ModelReply, ModelRequest};

#[derive(Debug, Default)]
struct RequestLog {
    requests: Mutex<Vec<ModelRequest>>,
}

impl RequestLog {
    fn push(&self, request: &ModelRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
    }

    fn snapshot(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// CannedModel
// ---------------------------------------------------------------------------

/// Returns the same reply on every call.
///
/// Calls are numbered in arrival order starting at 0. `with_delays` assigns a
/// delay to each call number (calls past the end get none) and `failing_on`
/// makes selected call numbers fail with a network error.
#[derive(Debug)]
pub struct CannedModel {
    reply: String,
    delays: Vec<Duration>,
    fail_calls: HashSet<usize>,
    calls: AtomicUsize,
    log: RequestLog,
}

impl CannedModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            delays: Vec::new(),
            fail_calls: HashSet::new(),
            calls: AtomicUsize::new(0),
            log: RequestLog::default(),
        }
    }

    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    pub fn failing_on(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.fail_calls.extend(calls);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.log.snapshot()
    }
}

#[async_trait]
impl ModelClient for CannedModel {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(request);

        let delay = self.delays.get(call).copied().unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_calls.contains(&call) {
            return Err(ModelError::Network(format!("injected failure on call {call}")));
        }

        Ok(ModelReply {
            content: self.reply.clone(),
            latency_ms: delay.as_millis() as u64,
        })
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

/// Replays a fixed script of outcomes in call order; the last entry repeats
/// once the script is exhausted.
#[derive(Debug)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    last: Mutex<Option<Result<String, ModelError>>>,
    log: RequestLog,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn from_results(results: impl IntoIterator<Item = Result<String, ModelError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            last: Mutex::new(None),
            log: RequestLog::default(),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.log.snapshot()
    }

    fn next_outcome(&self) -> Result<String, ModelError> {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(outcome) = script.pop_front() {
            *last = Some(outcome.clone());
            return outcome;
        }
        last.clone().unwrap_or(Err(ModelError::EmptyReply))
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        self.log.push(request);
        self.next_outcome().map(|content| ModelReply {
            content,
            latency_ms: 0,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// FailingModel
// ---------------------------------------------------------------------------

/// Fails every call with the given error.
#[derive(Debug)]
pub struct FailingModel {
    error: ModelError,
    log: RequestLog,
}

impl FailingModel {
    pub fn new(error: ModelError) -> Self {
        Self {
            error,
            log: RequestLog::default(),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.log.snapshot()
    }
}

#[async_trait]
impl ModelClient for FailingModel {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        self.log.push(request);
        Err(self.error.clone())
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}
