//! Single execution of a test case.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{AgentResponse, TestCase};
use crate::metrics::METRICS;
use crate::model::{ModelClient, ModelRequest};

/// Error text stored on executions interrupted by cancellation.
pub const CANCELLED_ERROR: &str = "cancelled";

/// Run the test case once and capture the outcome.
///
/// The system prompt is the instruction context and the question the user
/// turn. Transport and model errors, as well as cancellation, are folded into
/// a failed [`AgentResponse`] carrying the elapsed time up to the failure, so
/// one bad execution can never abort its batch.
pub async fn execute_once(
    model: &dyn ModelClient,
    case: &TestCase,
    index: u32,
    cancel: &CancellationToken,
) -> AgentResponse {
    let request = ModelRequest::new(&case.system_prompt, &case.question, case.temperature);
    let started = Instant::now();
    METRICS.inc_model_calls();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = model.invoke(&request) => Some(result),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Some(Ok(reply)) => {
            debug!(index, elapsed_ms, "execution succeeded");
            AgentResponse::succeeded(index, reply.content, elapsed_ms)
        }
        Some(Err(e)) => {
            METRICS.inc_model_failures();
            warn!(index, error = %e, "execution failed");
            AgentResponse::failed(index, e.to_string(), elapsed_ms)
        }
        None => {
            debug!(index, "execution cancelled");
            AgentResponse::failed(index, CANCELLED_ERROR, elapsed_ms)
        }
    }
}
