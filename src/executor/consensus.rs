//! Consensus executor (spec.md §4.3.4): collects a batch exactly like
//! Parallel-All, then the runner applies [`apply_quorum`] once aggregation
//! has picked a winning bucket.

use std::sync::Arc;

use super::parallel::ParallelAttemptFn;
use super::{Batch, FailureSummary};
use crate::error::ParallelExecutionError;
use crate::metrics::Status;

pub async fn run(provider_count: usize, max_concurrency: usize, attempt: Arc<ParallelAttemptFn>) -> Batch {
    super::parallel_all::run(provider_count, max_concurrency, attempt).await
}

/// Downgrades every `ok` metric in `batch` to `status=error,
/// failure_kind=consensus_quorum` when `winning_bucket_size < quorum`
/// (§4.3.4, §8 invariant 5), returning the propagated error in that case.
pub fn apply_quorum(batch: &mut Batch, winning_bucket_size: usize, quorum: u32) -> Option<ParallelExecutionError> {
    if winning_bucket_size as u32 >= quorum {
        return None;
    }

    let message = format!("votes={winning_bucket_size}, quorum={quorum}");
    for (_, attempt) in batch.iter_mut() {
        if attempt.metrics.status == Status::Ok {
            attempt.metrics.downgrade("consensus_quorum", message.clone());
        }
    }

    let failures = batch
        .iter()
        .map(|(index, attempt)| FailureSummary::from_attempt(*index, &attempt.metrics.provider, attempt))
        .collect();

    Some(ParallelExecutionError { batch: batch.clone(), failures, cause: None })
}
