//! Shared worker/state-machine plumbing for [`super::parallel_any`] and
//! [`super::parallel_all`] (spec.md §4.3.2, §4.3.3, §5).
//!
//! Grounded in `original_source`'s
//! `adapter/core/parallel/coordinators/{any,base}.py`: each provider slot
//! moves through `PENDING → RUNNING → {OK, FAIL, CANCELLED}`, bounded
//! concurrency comes from a semaphore sized to `max_concurrency`, and
//! cancellation is the `tokio_util::sync::CancellationToken` the teacher
//! uses for per-connection cancellation propagation in `gateway.rs`.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::AttemptResult;

/// Per-provider attempt closure for parallel executors: takes the
/// provider's batch index and a child cancellation token it should observe
/// at safe points (before invocation, before registering success).
pub type ParallelAttemptFn = dyn Fn(usize, CancellationToken) -> BoxFuture<'static, AttemptResult> + Send + Sync;

/// Synthetic result for a slot never scheduled (§4.3.3: cancelled before
/// `RUNNING`).
pub fn synthetic_cancelled(provider: &str, mode: &str, run_id: &str, prompt_id: &str, message: &str) -> AttemptResult {
    use crate::metrics::{Outcome, RunMetrics, Status};
    use std::collections::HashMap;

    AttemptResult {
        metrics: RunMetrics {
            timestamp_ms: 0,
            run_id: run_id.to_string(),
            provider: provider.to_string(),
            model: String::new(),
            mode: mode.to_string(),
            prompt_id: prompt_id.to_string(),
            seed: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            input_tokens: 0,
            output_tokens: 0,
            latency_ms: 0,
            cost_usd: 0.0,
            status: Status::Skip,
            failure_kind: Some("cancelled".to_string()),
            error_message: Some(message.to_string()),
            error_type: Some("CancelledError".to_string()),
            outcome: Outcome::Skip,
            output_text: None,
            output_hash: None,
            attempts: 0,
            retries: 0,
            providers: vec![],
            shadow_provider_id: None,
            shadow_latency_ms: None,
            shadow_status: None,
            shadow_outcome: None,
            shadow_error_message: None,
            eval: None,
            budget: None,
            ci_meta: HashMap::new(),
        },
        raw_output: None,
        stop_reason: None,
        error_message: None,
        backoff_next_provider: false,
        aggregate_output: false,
    }
}

/// Launches one bounded worker per provider; `attempt` is called once per
/// index with a cancellation token scoped to the whole batch. Returns
/// results in completion order (§5 ordering guarantee: within an attempt,
/// completion order, not submission order).
pub async fn run_to_completion(
    provider_count: usize,
    max_concurrency: usize,
    cancel: CancellationToken,
    attempt: Arc<ParallelAttemptFn>,
) -> Vec<(usize, AttemptResult)> {
    let max_concurrency = max_concurrency.clamp(1, provider_count.max(1));
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let mut join_set = tokio::task::JoinSet::new();

    for index in 0..provider_count {
        let semaphore = semaphore.clone();
        let attempt = attempt.clone();
        let worker_cancel = cancel.child_token();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let result = attempt(index, worker_cancel).await;
            (index, result)
        });
    }

    let mut results = Vec::with_capacity(provider_count);
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(pair) => results.push(pair),
            Err(join_err) => {
                tracing::warn!(error = %join_err, "parallel worker task panicked");
            }
        }
    }
    results
}
