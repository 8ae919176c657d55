//! Ambient `/metrics` endpoint, grounded in the teacher's `metrics.rs`
//! Prometheus registration pattern. Entirely observability plumbing: it
//! mirrors counts already recorded in [`super::RunMetrics`], it does not
//! replace the JSONL event stream, and a run that never serves it still
//! emits fully correct metrics.

use std::net::SocketAddr;

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::info;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
    pub static ref PROVIDER_CALLS_TOTAL: IntCounterVec = {
        let counter = IntCounterVec::new(
            Opts::new("llm_runner_provider_calls_total", "Provider calls by provider and status"),
            &["provider", "status"],
        )
        .expect("metric construction is infallible for static opts");
        REGISTRY.register(Box::new(counter.clone())).ok();
        counter
    };
    pub static ref IN_FLIGHT_ATTEMPTS: IntGauge = {
        let gauge = IntGauge::new("llm_runner_in_flight_attempts", "Provider attempts currently running")
            .expect("metric construction is infallible for static opts");
        REGISTRY.register(Box::new(gauge.clone())).ok();
        gauge
    };
}

fn render() -> String {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    encoder.encode_to_string(&families).unwrap_or_default()
}

/// Serves `/metrics` on `addr` until the process exits. Spawned as a
/// detached background task by the CLI when `metrics-server` is enabled;
/// never awaited by the run itself.
pub async fn serve(addr: SocketAddr) {
    use warp::Filter;

    let route = warp::path("metrics").map(render);
    info!(%addr, "serving prometheus metrics");
    warp::serve(route).run(addr).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        PROVIDER_CALLS_TOTAL.with_label_values(&["p1", "ok"]).inc();
        let body = render();
        assert!(body.contains("llm_runner_provider_calls_total"));
    }
}
