//! Parallel fan-out of one test case.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::executor::execute_once;
use crate::domain::{AgentResponse, PromptLoopError, Result, TestCase};
use crate::model::ModelClient;

/// Run `case.execution_count` executions concurrently and wait for all of them.
///
/// The returned list always holds exactly N entries sorted by ascending
/// index, independent of completion order. Individual failures stay inside
/// their entry; there is no short-circuit on the first failure.
///
/// # Errors
///
/// - `PromptLoopError::InvalidTestCase` if the case fails validation.
/// - `PromptLoopError::Cancelled` if `cancel` fired before the batch finished;
///   no partial results are returned.
#[instrument(skip_all, fields(runs = case.execution_count))]
pub async fn run_parallel(
    model: Arc<dyn ModelClient>,
    case: &TestCase,
    cancel: &CancellationToken,
) -> Result<Vec<AgentResponse>> {
    case.validate()?;

    let tasks: Vec<_> = (1..=case.execution_count)
        .map(|index| {
            let model = Arc::clone(&model);
            let case = case.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                execute_once(model.as_ref(), &case, index, &cancel).await
            });
            (index, handle)
        })
        .collect();

    let (indices, handles): (Vec<u32>, Vec<_>) = tasks.into_iter().unzip();
    let joined = join_all(handles).await;

    let mut responses: Vec<AgentResponse> = indices
        .into_iter()
        .zip(joined)
        .map(|(index, joined)| {
            joined.unwrap_or_else(|e| {
                warn!(index, error = %e, "execution task aborted");
                AgentResponse::failed(index, format!("execution task aborted: {e}"), 0)
            })
        })
        .collect();

    if cancel.is_cancelled() {
        return Err(PromptLoopError::Cancelled);
    }

    responses.sort_by_key(|r| r.index);

    let failed = responses.iter().filter(|r| !r.success).count();
    info!(total = responses.len(), failed, "parallel runs complete");
    Ok(responses)
}
