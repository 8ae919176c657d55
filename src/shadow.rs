//! Shadow Runner (spec.md §4.4): fires a secondary provider invocation
//! concurrently with the primary. Its result is folded into the primary's
//! metrics but never affects the run's outcome — shadow failures never
//! abort or retry the primary.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use crate::metrics::{Outcome, Status};
use crate::provider::{Provider, ProviderRequest};

/// Folded into the primary's `RunMetrics` as `shadow_*` fields.
pub struct ShadowOutcome {
    pub provider_id: String,
    pub latency_ms: u64,
    pub status: Status,
    pub outcome: Outcome,
    pub error_message: Option<String>,
}

/// A background shadow invocation joined when the primary finalizes.
pub struct ShadowHandle {
    handle: JoinHandle<ShadowOutcome>,
}

impl ShadowHandle {
    /// Starts the shadow call immediately; non-blocking.
    pub fn spawn(provider: Arc<dyn Provider>, request: ProviderRequest) -> Self {
        let provider_id = provider.name().to_string();
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            let result = provider.invoke(&request).await;
            let latency_ms = start.elapsed().as_millis() as u64;
            match result {
                Ok(_response) => ShadowOutcome {
                    provider_id,
                    latency_ms,
                    status: Status::Ok,
                    outcome: Outcome::Success,
                    error_message: None,
                },
                Err(err) => ShadowOutcome {
                    provider_id,
                    latency_ms,
                    status: Status::Error,
                    outcome: Outcome::Error,
                    error_message: Some(err.to_string()),
                },
            }
        });
        Self { handle }
    }

    /// Blocks until the shadow call completes, bounded by the provider's
    /// own `timeout_s` (the provider itself is responsible for honoring
    /// it, per §4.1) — joining a task that panicked is surfaced as an
    /// error-status shadow outcome rather than propagated.
    pub async fn join(self, provider_id: &str) -> ShadowOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => ShadowOutcome {
                provider_id: provider_id.to_string(),
                latency_ms: 0,
                status: Status::Error,
                outcome: Outcome::Error,
                error_message: Some(format!("shadow task failed: {join_err}")),
            },
        }
    }
}
