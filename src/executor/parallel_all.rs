//! Parallel-All executor (spec.md §4.3.2): every provider runs to
//! completion independently; only an explicit external cancel interrupts a
//! worker. [`super::consensus`] reuses this unchanged — Consensus differs
//! only in how the runner interprets the resulting batch.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::parallel::{run_to_completion, ParallelAttemptFn};
use super::Batch;

pub async fn run(provider_count: usize, max_concurrency: usize, attempt: Arc<ParallelAttemptFn>) -> Batch {
    let mut batch = run_to_completion(provider_count, max_concurrency, CancellationToken::new(), attempt).await;
    batch.sort_by_key(|(index, _)| *index);
    batch
}
