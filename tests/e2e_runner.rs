//! End-to-end scenarios (spec.md §8's literal table), driven against the
//! public `Runner` API with `MockProvider` doubles rather than a built
//! binary — the runner's behavior is the contract under test, not the CLI
//! process wrapper.

use std::sync::Arc;
use std::time::Duration;

use llm_runner::budget::BudgetManager;
use llm_runner::clock::FakeClock;
use llm_runner::config::{
    AggregateKind, BackoffPolicy, BudgetBook, ExecutionMode, PricingConfig, ProviderConfig, QualityGatesConfig,
    RateLimitConfig, RetriesConfig, RunnerConfig,
};
use llm_runner::error::{AllFailedError, ParallelExecutionError, RunnerError};
use llm_runner::metrics::events::Event;
use llm_runner::metrics::logger::{EventLogger, MemoryLogger};
use llm_runner::metrics::Status;
use llm_runner::provider::Provider;
use llm_runner::runner::{Runner, RunnerProvider};
use llm_runner::testing::{sample_request, MockProvider, Scripted};

fn provider_config(id: &str, max_retries: u32, backoff_s: f64) -> ProviderConfig {
    ProviderConfig {
        provider: id.into(),
        model: format!("{id}-model"),
        auth_env: None,
        endpoint: None,
        max_tokens: None,
        temperature: None,
        top_p: None,
        seed: None,
        timeout_s: 5.0,
        retries: RetriesConfig { max: max_retries, backoff_s },
        pricing: PricingConfig::default(),
        rate_limit: RateLimitConfig::default(),
        quality_gates: QualityGatesConfig::default(),
        options: Default::default(),
        env: Default::default(),
    }
}

fn runner_config(mode: ExecutionMode) -> RunnerConfig {
    RunnerConfig {
        mode,
        aggregate: AggregateKind::MajorityVote,
        quorum: None,
        tie_breaker: None,
        provider_weights: None,
        schema_path: None,
        judge_provider: None,
        max_concurrency: 4,
        rpm: 0,
        shadow_provider: None,
        metrics_path: None,
        allow_overrun: false,
        backoff_policy: BackoffPolicy::default(),
    }
}

fn build_runner(config: RunnerConfig, providers: Vec<RunnerProvider>, logger: Arc<dyn EventLogger>) -> Arc<Runner> {
    Arc::new(Runner::new(
        config,
        providers,
        None,
        None,
        None,
        Arc::new(BudgetManager::new(BudgetBook::default())),
        logger,
        FakeClock::new(1),
        "test-run",
    ))
}

fn run_metrics(logger: &MemoryLogger) -> Vec<llm_runner::metrics::RunMetrics> {
    logger
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::RunMetric(m) => Some(*m),
            _ => None,
        })
        .collect()
}

/// Scenario 1: Sequential, single provider, single ok call.
#[tokio::test]
async fn sequential_single_provider_ok() {
    let p1 = Arc::new(MockProvider::new("P1", vec![Scripted::Ok("A")]));
    let providers = vec![RunnerProvider { config: provider_config("P1", 0, 0.0), handle: p1 }];
    let logger = Arc::new(MemoryLogger::new());
    let runner = build_runner(runner_config(ExecutionMode::Sequential), providers, logger.clone());

    let outcome = runner.run_prompt("t1", sample_request("hi")).await.unwrap();

    assert_eq!(outcome.batch.len(), 1);
    let metrics = run_metrics(&logger);
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].provider, "P1");
    assert_eq!(metrics[0].status, Status::Ok);
    assert_eq!(metrics[0].output_text.as_deref(), Some("A"));
    assert_eq!(metrics[0].attempts, 1);
}

/// Scenario 2: Sequential, rate-limited twice then ok, retries.max=2.
#[tokio::test]
async fn sequential_retries_on_rate_limit_then_succeeds() {
    use llm_runner::error::ProviderError;
    let p1 = Arc::new(MockProvider::new(
        "P1",
        vec![
            Scripted::Err(ProviderError::RateLimit("slow".into())),
            Scripted::Err(ProviderError::RateLimit("slow".into())),
            Scripted::Ok("ok"),
        ],
    ));
    let providers = vec![RunnerProvider { config: provider_config("P1", 2, 0.05), handle: p1 }];
    let logger = Arc::new(MemoryLogger::new());
    let runner = build_runner(runner_config(ExecutionMode::Sequential), providers, logger.clone());

    let outcome = runner.run_prompt("t2", sample_request("r")).await.unwrap();

    let metrics = run_metrics(&logger);
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].status, Status::Ok);
    assert_eq!(metrics[0].attempts, 3);
    assert_eq!(metrics[0].retries, 2);
    assert_eq!(outcome.batch[0].1.metrics.attempts, 3);
}

/// Scenario 3: Parallel-Any, fast vs. slow — fast wins, slow is cancelled.
#[tokio::test]
async fn parallel_any_fast_wins_slow_cancelled() {
    let fast = Arc::new(MockProvider::new("fast", vec![Scripted::Ok("fast-ok")]));
    let slow =
        Arc::new(MockProvider::new("slow", vec![Scripted::Ok("slow-ok")]).with_delay(Duration::from_millis(20)));
    let providers = vec![
        RunnerProvider { config: provider_config("fast", 0, 0.0), handle: fast },
        RunnerProvider { config: provider_config("slow", 0, 0.0), handle: slow },
    ];
    let logger = Arc::new(MemoryLogger::new());
    let runner = build_runner(runner_config(ExecutionMode::ParallelAny), providers, logger.clone());

    let outcome = runner.run_prompt("t3", sample_request("p")).await.unwrap();

    let winner = outcome.batch.iter().find(|(_, a)| a.metrics.status == Status::Ok).unwrap();
    assert_eq!(winner.1.metrics.provider, "fast");

    let slow_metrics = outcome.batch.iter().find(|(_, a)| a.metrics.provider == "slow").unwrap();
    assert_eq!(slow_metrics.1.metrics.status, Status::Skip);
    assert_eq!(slow_metrics.1.metrics.failure_kind.as_deref(), Some("cancelled"));
    assert_eq!(slow_metrics.1.metrics.cost_usd, 0.0);
}

/// Scenario 4: Parallel-Any, both providers fail — ParallelExecutionError
/// with classified failures.
#[tokio::test]
async fn parallel_any_all_fail_raises_classified_error() {
    use llm_runner::error::ProviderError;
    let skip = Arc::new(MockProvider::new("skip", vec![Scripted::Err(ProviderError::Skip("x".into()))]));
    let timeout = Arc::new(MockProvider::new(
        "timeout",
        vec![Scripted::Err(ProviderError::Timeout(Duration::from_secs(1)))],
    ));
    let providers = vec![
        RunnerProvider { config: provider_config("skip", 0, 0.0), handle: skip },
        RunnerProvider { config: provider_config("timeout", 0, 0.0), handle: timeout },
    ];
    let logger = Arc::new(MemoryLogger::new());
    let runner = build_runner(runner_config(ExecutionMode::ParallelAny), providers, logger.clone());

    let err = runner.run_prompt("t4", sample_request("any")).await.unwrap_err();

    let failures = match err {
        RunnerError::ParallelExecution(ParallelExecutionError { failures, .. }) => failures,
        other => panic!("expected ParallelExecutionError, got {other:?}"),
    };
    let skip_failure = failures.iter().find(|f| f.provider == "skip").unwrap();
    assert_eq!(skip_failure.failure_kind.as_deref(), Some("skip"));
    assert!(skip_failure.backoff_next_provider);
    assert_eq!(skip_failure.error_type.as_deref(), Some("ProviderSkip"));

    let timeout_failure = failures.iter().find(|f| f.provider == "timeout").unwrap();
    assert_eq!(timeout_failure.failure_kind.as_deref(), Some("timeout"));
    assert_eq!(timeout_failure.error_type.as_deref(), Some("TimeoutError"));
}

/// Scenario 5: Consensus quorum=2, three providers return A, A, B — A wins.
#[tokio::test]
async fn consensus_meets_quorum_majority_wins() {
    let p1 = Arc::new(MockProvider::new("P1", vec![Scripted::Ok("A")]));
    let p2 = Arc::new(MockProvider::new("P2", vec![Scripted::Ok("A")]));
    let p3 = Arc::new(MockProvider::new("P3", vec![Scripted::Ok("B")]));
    let providers = vec![
        RunnerProvider { config: provider_config("P1", 0, 0.0), handle: p1 },
        RunnerProvider { config: provider_config("P2", 0, 0.0), handle: p2 },
        RunnerProvider { config: provider_config("P3", 0, 0.0), handle: p3 },
    ];
    let mut config = runner_config(ExecutionMode::Consensus);
    config.quorum = Some(2);
    let logger = Arc::new(MemoryLogger::new());
    let runner = build_runner(config, providers, logger.clone());

    let outcome = runner.run_prompt("t5", sample_request("any")).await.unwrap();
    let agg = outcome.aggregation.unwrap();
    let winner = &outcome.batch[agg.winner_index].1;
    assert_eq!(winner.metrics.output_text.as_deref(), Some("A"));
    assert_eq!(agg.metadata["bucket_size"], serde_json::json!(2));
}

/// Scenario 6: Consensus quorum=3, two providers both return A — quorum
/// fails, every ok candidate downgrades to consensus_quorum.
#[tokio::test]
async fn consensus_below_quorum_downgrades_whole_batch() {
    let p1 = Arc::new(MockProvider::new("P1", vec![Scripted::Ok("A")]));
    let p2 = Arc::new(MockProvider::new("P2", vec![Scripted::Ok("A")]));
    let providers = vec![
        RunnerProvider { config: provider_config("P1", 0, 0.0), handle: p1 },
        RunnerProvider { config: provider_config("P2", 0, 0.0), handle: p2 },
    ];
    let mut config = runner_config(ExecutionMode::Consensus);
    config.quorum = Some(3);
    let logger = Arc::new(MemoryLogger::new());
    let runner = build_runner(config, providers, logger.clone());

    let err = runner.run_prompt("t6", sample_request("any")).await.unwrap_err();

    match err {
        RunnerError::AllFailed(AllFailedError { batch, .. }) | RunnerError::ParallelExecution(ParallelExecutionError { batch, .. }) => {
            assert_eq!(batch.len(), 2);
            for (_, attempt) in &batch {
                assert_eq!(attempt.metrics.status, Status::Error);
                assert_eq!(attempt.metrics.failure_kind.as_deref(), Some("consensus_quorum"));
            }
        }
        other => panic!("expected a quorum failure, got {other:?}"),
    }
}

/// Boundary: quorum greater than candidate count always fails consensus,
/// even with every provider returning the same winning text.
#[tokio::test]
async fn quorum_greater_than_candidate_count_always_fails() {
    let p1 = Arc::new(MockProvider::new("P1", vec![Scripted::Ok("A")]));
    let providers = vec![RunnerProvider { config: provider_config("P1", 0, 0.0), handle: p1 }];
    let mut config = runner_config(ExecutionMode::Consensus);
    config.quorum = Some(5);
    let logger = Arc::new(MemoryLogger::new());
    let runner = build_runner(config, providers, logger.clone());

    let err = runner.run_prompt("t7", sample_request("any")).await;
    assert!(err.is_err());
}

/// Boundary: max_concurrency greater than provider count does not panic or
/// deadlock — it is effectively clamped by there only being N attempts to run.
#[tokio::test]
async fn max_concurrency_above_provider_count_does_not_hang() {
    let p1 = Arc::new(MockProvider::new("P1", vec![Scripted::Ok("A")]));
    let p2 = Arc::new(MockProvider::new("P2", vec![Scripted::Ok("B")]));
    let providers = vec![
        RunnerProvider { config: provider_config("P1", 0, 0.0), handle: p1 },
        RunnerProvider { config: provider_config("P2", 0, 0.0), handle: p2 },
    ];
    let mut config = runner_config(ExecutionMode::ParallelAll);
    config.max_concurrency = 64;
    let logger = Arc::new(MemoryLogger::new());
    let runner = build_runner(config, providers, logger.clone());

    let outcome = runner.run_prompt("t8", sample_request("any")).await.unwrap();
    assert_eq!(outcome.batch.len(), 2);
}

/// Dispatch sanity: each provider handle actually sees its own configured
/// model name in the request it's invoked with (runner.rs sets this per
/// attempt rather than sharing one request across heterogeneous providers).
#[tokio::test]
async fn each_provider_is_invoked_with_its_own_model() {
    #[derive(Debug)]
    struct ModelCapturingProvider {
        id: String,
        seen_model: std::sync::Mutex<Option<String>>,
    }

    #[async_trait::async_trait]
    impl Provider for ModelCapturingProvider {
        fn name(&self) -> &str {
            &self.id
        }

        async fn invoke(
            &self,
            request: &llm_runner::provider::ProviderRequest,
        ) -> Result<llm_runner::provider::ProviderResponse, llm_runner::error::ProviderError> {
            *self.seen_model.lock().unwrap() = Some(request.model.clone());
            Ok(llm_runner::provider::ProviderResponse {
                text: "ok".into(),
                latency_ms: 0,
                token_usage: llm_runner::provider::TokenUsage { prompt: 1, completion: 1 },
                model: request.model.clone(),
                finish_reason: None,
                raw: None,
            })
        }
    }

    let provider = Arc::new(ModelCapturingProvider { id: "p1".into(), seen_model: std::sync::Mutex::new(None) });
    let mut config = provider_config("p1", 0, 0.0);
    config.model = "configured-model".into();
    let providers = vec![RunnerProvider { config, handle: provider.clone() }];
    let logger = Arc::new(MemoryLogger::new());
    let runner = build_runner(runner_config(ExecutionMode::Sequential), providers, logger);

    runner.run_prompt("t9", sample_request("hi")).await.unwrap();

    assert_eq!(provider.seen_model.lock().unwrap().as_deref(), Some("configured-model"));
}
