//! Parallel-Any executor (spec.md §4.3.3): races bounded concurrent
//! workers, the first `ok` wins, the rest are cooperatively cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::parallel::{synthetic_cancelled, ParallelAttemptFn};
use super::{AttemptResult, Batch, FailureSummary};
use crate::error::ParallelExecutionError;
use crate::metrics::Status;

pub struct ParallelAnyParams<'a> {
    pub provider_names: &'a [String],
    pub mode: &'a str,
    pub run_id: &'a str,
    pub prompt_id: &'a str,
    pub max_concurrency: usize,
}

/// Runs `attempt` against every provider concurrently (bounded by
/// `max_concurrency`) and returns once a winner is found, or the
/// `ParallelExecutionError` once every worker has terminated without one.
pub async fn run(params: ParallelAnyParams<'_>, attempt: Arc<ParallelAttemptFn>) -> Result<Batch, ParallelExecutionError> {
    let provider_count = params.provider_names.len();
    let max_concurrency = params.max_concurrency.clamp(1, provider_count.max(1));
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let cancel = CancellationToken::new();
    let winner_declared = Arc::new(AtomicBool::new(false));

    let mut join_set = tokio::task::JoinSet::new();
    for index in 0..provider_count {
        let semaphore = semaphore.clone();
        let attempt = attempt.clone();
        let cancel = cancel.clone();
        let winner_declared = winner_declared.clone();
        let provider_name = params.provider_names[index].clone();
        let mode = params.mode.to_string();
        let run_id = params.run_id.to_string();
        let prompt_id = params.prompt_id.to_string();

        join_set.spawn(async move {
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit.expect("semaphore never closed"),
                _ = cancel.cancelled() => {
                    return (index, synthetic_cancelled(&provider_name, &mode, &run_id, &prompt_id, "parallel_any cancelled after winner"));
                }
            };

            if cancel.is_cancelled() {
                drop(permit);
                return (index, synthetic_cancelled(&provider_name, &mode, &run_id, &prompt_id, "parallel_any cancelled after winner"));
            }

            let worker_token = cancel.child_token();
            let mut result = attempt(index, worker_token).await;
            drop(permit);

            if result.metrics.status == Status::Ok {
                let won = winner_declared.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok();
                if won {
                    cancel.cancel();
                } else {
                    // Another worker already won the race (§9 open question:
                    // winner-wins, later successes become skip).
                    result.metrics.status = Status::Skip;
                    result.metrics.outcome = crate::metrics::Outcome::Skip;
                    result.metrics.failure_kind = Some("cancelled".to_string());
                    result.metrics.error_message = Some("parallel_any cancelled after winner".to_string());
                    result.metrics.cost_usd = 0.0;
                    result.metrics.input_tokens = 0;
                    result.metrics.output_tokens = 0;
                }
            }

            (index, result)
        });
    }

    let mut batch: Batch = Vec::with_capacity(provider_count);
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(pair) => batch.push(pair),
            Err(join_err) => tracing::warn!(error = %join_err, "parallel_any worker task panicked"),
        }
    }
    batch.sort_by_key(|(index, _)| *index);

    if batch.iter().any(|(_, r)| r.metrics.status == Status::Ok) {
        return Ok(batch);
    }

    let failures: Vec<FailureSummary> = batch
        .iter()
        .filter(|(_, r)| r.metrics.status != Status::Ok)
        .map(|(index, r)| FailureSummary::from_attempt(*index, &r.metrics.provider, r))
        .collect();

    Err(ParallelExecutionError { batch, failures, cause: None })
}
