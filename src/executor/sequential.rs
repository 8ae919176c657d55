//! Sequential executor (spec.md §4.3.1).
//!
//! Grounded in `gateway/failover.rs`'s `FailoverManager`: walk providers in
//! priority order, advance past a failed one when it signals the run should
//! fail over, stop on the first success.

use futures_util::future::BoxFuture;

use super::{AttemptResult, Batch};
use crate::error::AllFailedError;
use crate::metrics::Status;

/// Per-provider attempt closure: given a provider's index into the
/// configured list, runs it (including retries, shadow, budget/schema
/// evaluation) and returns the resulting [`AttemptResult`]. Kept generic
/// over the closure so this module only orchestrates ordering, not the
/// domain logic the runner assembles per attempt.
pub type AttemptFn<'a> = dyn Fn(usize) -> BoxFuture<'a, AttemptResult> + Send + Sync + 'a;

/// Runs `provider_count` providers in order, stopping at the first success,
/// a budget-requested stop, or a terminal failure that doesn't fail over.
pub async fn run(provider_count: usize, attempt: &AttemptFn<'_>) -> Result<Batch, AllFailedError> {
    let mut batch: Batch = Vec::with_capacity(provider_count);

    for index in 0..provider_count {
        let result = attempt(index).await;
        let stop_requested = result.stop_reason.is_some();
        let succeeded = result.metrics.status == Status::Ok;
        let should_fail_over = result.backoff_next_provider;

        batch.push((index, result));

        if stop_requested || succeeded || !should_fail_over {
            if succeeded || stop_requested {
                return Ok(batch);
            }
            break;
        }
    }

    if batch.iter().any(|(_, r)| r.metrics.status == Status::Ok) {
        return Ok(batch);
    }

    let failures = batch
        .iter()
        .map(|(index, result)| super::FailureSummary::from_attempt(*index, &result.metrics.provider, result))
        .collect();

    Err(AllFailedError { batch, failures, cause: None })
}
