//! Top-level Runner (spec.md §2, §4): resolves mode, builds the per-attempt
//! context, drives the mode-specific executor, applies aggregation, and
//! emits the terminal `run_metric` events — the runner, not the invoker,
//! owns the final emit (§9 cyclic-reference note).

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{candidates_from_batch, strategies, tie_break, AggregationResult};
use crate::budget::BudgetManager;
use crate::clock::Clock;
use crate::config::{AggregateKind, ExecutionMode, ProviderConfig, RunnerConfig};
use crate::error::RunnerError;
use crate::executor::parallel::ParallelAttemptFn;
use crate::executor::{self, AttemptResult, Batch};
use crate::invoker::ProviderInvoker;
use crate::metrics::events::{Event, ProviderCallEvent};
use crate::metrics::logger::EventLogger;
use crate::metrics::{RunMetrics, Status};
use crate::provider::{Provider, ProviderRequest};
use crate::schema::{self, Schema};
use crate::token_bucket::TokenBucket;

/// A configured provider plus its live handle.
pub struct RunnerProvider {
    pub config: ProviderConfig,
    pub handle: Arc<dyn Provider>,
}

/// Everything one run needs, assembled once by the CLI (or a test) and
/// shared across every prompt repetition.
pub struct Runner {
    config: RunnerConfig,
    providers: Vec<RunnerProvider>,
    shadow: Option<RunnerProvider>,
    judge: Option<RunnerProvider>,
    schema: Option<Schema>,
    budget: Arc<BudgetManager>,
    logger: Arc<dyn EventLogger>,
    clock: Arc<dyn Clock>,
    invoker: Arc<ProviderInvoker>,
    run_id: String,
}

/// Outcome of one prompt repetition: the finalized batch plus, when
/// aggregation ran, its result.
#[derive(Debug)]
pub struct RunOutcome {
    pub batch: Batch,
    pub aggregation: Option<AggregationResult>,
}

impl Runner {
    pub fn new(
        config: RunnerConfig,
        providers: Vec<RunnerProvider>,
        shadow: Option<RunnerProvider>,
        judge: Option<RunnerProvider>,
        schema: Option<Schema>,
        budget: Arc<BudgetManager>,
        logger: Arc<dyn EventLogger>,
        clock: Arc<dyn Clock>,
        run_id: impl Into<String>,
    ) -> Self {
        let token_bucket = Arc::new(TokenBucket::new(config.rpm, clock.clone()));
        let invoker = Arc::new(ProviderInvoker::new(clock.clone(), token_bucket));
        Self { config, providers, shadow, judge, schema, budget, logger, clock, invoker, run_id: run_id.into() }
    }

    /// Runs one prompt repetition to completion under the configured mode.
    ///
    /// Takes `self` behind an `Arc` because the parallel executors need a
    /// `'static` attempt closure to hand to spawned tasks; `Arc<Self>` lets
    /// that closure share the runner without `unsafe`.
    pub async fn run_prompt(self: &Arc<Self>, prompt_id: &str, request: ProviderRequest) -> Result<RunOutcome, RunnerError> {
        let provider_count = self.providers.len();
        if provider_count == 0 {
            return Err(RunnerError::Config("no providers configured".into()));
        }

        let mut batch = match self.config.mode {
            ExecutionMode::Sequential => {
                let attempt = |index: usize| -> BoxFuture<'_, AttemptResult> {
                    Box::pin(self.run_one_attempt(index, prompt_id, &request))
                };
                executor::sequential::run(provider_count, &attempt).await?
            }
            ExecutionMode::ParallelAny => {
                let names: Vec<String> = self.providers.iter().map(|p| p.config.provider.clone()).collect();
                let attempt = self.parallel_attempt_fn(prompt_id, request.clone());
                executor::parallel_any::run(
                    executor::parallel_any::ParallelAnyParams {
                        provider_names: &names,
                        mode: "parallel_any",
                        run_id: &self.run_id,
                        prompt_id,
                        max_concurrency: self.config.max_concurrency,
                    },
                    attempt,
                )
                .await?
            }
            ExecutionMode::ParallelAll => {
                let attempt = self.parallel_attempt_fn(prompt_id, request.clone());
                executor::parallel_all::run(provider_count, self.config.max_concurrency, attempt).await
            }
            ExecutionMode::Consensus => {
                let attempt = self.parallel_attempt_fn(prompt_id, request.clone());
                executor::consensus::run(provider_count, self.config.max_concurrency, attempt).await
            }
        };

        let aggregation = self.aggregate_batch(&batch).await?;

        if self.config.mode == ExecutionMode::Consensus {
            if let Some(agg) = &aggregation {
                let bucket_size = agg
                    .metadata
                    .get("bucket_size")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(1) as usize;
                if let Some(err) = executor::consensus::apply_quorum(&mut batch, bucket_size, self.config.effective_quorum()) {
                    self.emit_batch(&batch, None);
                    return Err(RunnerError::from(err));
                }
            }
        }

        if let Some(agg) = &aggregation {
            for (index, attempt) in batch.iter_mut() {
                attempt.aggregate_output = *index == agg.winner_index;
            }
        }

        self.emit_batch(&batch, aggregation.as_ref());

        Ok(RunOutcome { batch, aggregation })
    }

    fn parallel_attempt_fn(self: &Arc<Self>, prompt_id: &str, request: ProviderRequest) -> Arc<ParallelAttemptFn> {
        let runner = self.clone();
        let prompt_id = prompt_id.to_string();
        Arc::new(move |index: usize, _cancel: CancellationToken| -> BoxFuture<'static, AttemptResult> {
            let runner = runner.clone();
            let request = request.clone();
            let prompt_id = prompt_id.clone();
            Box::pin(async move { runner.run_one_attempt(index, &prompt_id, &request).await })
        })
    }

    async fn run_one_attempt(&self, index: usize, prompt_id: &str, request: &ProviderRequest) -> AttemptResult {
        let rp = &self.providers[index];
        let mut request = request.clone();
        request.model = rp.config.model.clone();

        let shadow_pair = if index == 0 {
            self.shadow.as_ref().map(|s| {
                let mut shadow_request = request.clone();
                shadow_request.model = s.config.model.clone();
                (s.handle.clone(), shadow_request)
            })
        } else {
            None
        };

        let call = self
            .invoker
            .invoke(&rp.config, rp.handle.as_ref(), &request, &self.config.backoff_policy, shadow_pair)
            .await;

        let (input_tokens, output_tokens, cost_usd) = match &call.response {
            Some(response) => {
                let cost = rp.config.pricing.cost_usd(response.token_usage.prompt, response.token_usage.completion);
                (response.token_usage.prompt, response.token_usage.completion, cost)
            }
            None => (0, 0, 0.0),
        };

        let mut status = call.status;
        let mut failure_kind = call.failure_kind.clone();
        let mut error_message = call.error_message.clone();
        let mut output_text = call.response.as_ref().map(|r| r.text.clone());

        if status == Status::Ok {
            if let Some(schema) = &self.schema {
                let errors = schema.validate(output_text.as_deref().unwrap_or_default());
                if !errors.is_empty() {
                    status = Status::Error;
                    failure_kind = Some("schema_violation".to_string());
                    error_message = Some(schema::join_errors(&errors));
                }
            }
        }

        let is_cancelled_attempt = status == Status::Skip && failure_kind.as_deref() == Some("cancelled");
        let (cost_usd, input_tokens, output_tokens) =
            if is_cancelled_attempt { (0.0, 0, 0) } else { (cost_usd, input_tokens, output_tokens) };

        let budget_eval = self.budget.evaluate(
            &rp.config.provider,
            cost_usd,
            status,
            failure_kind.clone(),
            error_message.clone(),
            self.config.allow_overrun,
        );
        status = budget_eval.status;
        failure_kind = budget_eval.failure_kind;
        error_message = budget_eval.error_message;
        if status != Status::Ok {
            output_text = None;
        }

        let mut metrics = RunMetrics {
            timestamp_ms: self.clock.now_ms(),
            run_id: self.run_id.clone(),
            provider: rp.config.provider.clone(),
            model: rp.config.model.clone(),
            mode: mode_name(self.config.mode).to_string(),
            prompt_id: prompt_id.to_string(),
            seed: rp.config.seed,
            temperature: rp.config.temperature,
            top_p: rp.config.top_p,
            max_tokens: rp.config.max_tokens,
            input_tokens,
            output_tokens,
            latency_ms: if is_cancelled_attempt { 0 } else { call.latency_ms },
            cost_usd,
            status,
            failure_kind,
            error_message,
            error_type: call.error_type.clone(),
            outcome: status.into(),
            output_text,
            output_hash: None,
            attempts: call.retries + 1,
            retries: 0,
            providers: self.providers.iter().map(|p| p.config.provider.clone()).collect(),
            shadow_provider_id: call.shadow.as_ref().map(|s| s.provider_id.clone()),
            shadow_latency_ms: call.shadow.as_ref().map(|s| s.latency_ms),
            shadow_status: call.shadow.as_ref().map(|s| s.status),
            shadow_outcome: call.shadow.as_ref().map(|s| s.outcome),
            shadow_error_message: call.shadow.as_ref().and_then(|s| s.error_message.clone()),
            eval: None,
            budget: Some(budget_eval.snapshot),
            ci_meta: HashMap::new(),
        };
        metrics.reconcile_retries(0);

        self.emit_provider_call(&metrics);

        AttemptResult {
            metrics,
            raw_output: call.response,
            stop_reason: budget_eval.stop_reason,
            error_message: call.error_message,
            backoff_next_provider: call.backoff_next_provider,
            aggregate_output: false,
        }
    }

    async fn aggregate_batch(&self, batch: &Batch) -> Result<Option<AggregationResult>, RunnerError> {
        let candidates = candidates_from_batch(batch);
        if candidates.is_empty() {
            return Ok(None);
        }
        if candidates.len() == 1 {
            let only = &candidates[0];
            let mut metadata = HashMap::new();
            metadata.insert("bucket_size".to_string(), serde_json::json!(1));
            return Ok(Some(AggregationResult {
                winner_index: only.index,
                candidates: candidates.clone(),
                strategy: "single_candidate".to_string(),
                reason: "only one candidate in batch".to_string(),
                tie_breaker_used: "stable_order",
                metadata,
            }));
        }

        let tie_breaker = tie_break::resolve(self.config.tie_breaker.as_deref());
        let schema_present = self.schema.is_some();

        match self.config.aggregate {
            AggregateKind::MajorityVote => Ok(Some(strategies::majority_vote(&candidates, schema_present, tie_breaker))),
            AggregateKind::WeightedVote => {
                let weights = self.config.provider_weights.as_ref().ok_or(RunnerError::MissingProviderWeights)?;
                Ok(Some(strategies::weighted_vote(&candidates, schema_present, tie_breaker, weights)?))
            }
            AggregateKind::MaxScore => {
                let judge = self.judge.as_ref().ok_or(RunnerError::MissingJudgeProvider)?;
                let prompt_id_model = judge.config.model.clone();
                Ok(Some(
                    strategies::max_score(&candidates, judge.handle.as_ref(), |candidate| {
                        judge_request(&judge.config.model, format!("Score this response from 0-10: {}", candidate.text))
                    })
                    .await
                    .map(|mut r| {
                        r.metadata.insert("judge_model".to_string(), serde_json::json!(prompt_id_model));
                        r
                    })?,
                ))
            }
            AggregateKind::Judge => {
                let judge = self.judge.as_ref().ok_or(RunnerError::MissingJudgeProvider)?;
                Ok(Some(
                    strategies::judge_select(&candidates, judge.handle.as_ref(), |candidates| {
                        let options = candidates
                            .iter()
                            .enumerate()
                            .map(|(i, c)| format!("{i}: {}", c.text))
                            .collect::<Vec<_>>()
                            .join("\n");
                        judge_request(&judge.config.model, format!("Pick the best response by index:\n{options}"))
                    })
                    .await?,
                ))
            }
        }
    }

    fn emit_provider_call(&self, metrics: &RunMetrics) {
        self.logger.emit(&Event::ProviderCall(ProviderCallEvent {
            run_id: metrics.run_id.clone(),
            provider: metrics.provider.clone(),
            attempt: metrics.attempts,
            status: metrics.status,
            latency_ms: metrics.latency_ms,
            input_tokens: metrics.input_tokens,
            output_tokens: metrics.output_tokens,
            failure_kind: metrics.failure_kind.clone(),
            error_type: metrics.error_type.clone(),
            error_message: metrics.error_message.clone(),
            request_fingerprint: format!("{}:{}", metrics.prompt_id, metrics.model),
            metadata: HashMap::new(),
        }));
    }

    fn emit_batch(&self, batch: &Batch, aggregation: Option<&AggregationResult>) {
        for (index, attempt) in batch {
            let mut metrics = attempt.metrics.clone();
            if let Some(agg) = aggregation {
                metrics.ci_meta.insert("aggregation_strategy".to_string(), serde_json::json!(agg.strategy));
                metrics.ci_meta.insert("tie_breaker_used".to_string(), serde_json::json!(agg.tie_breaker_used));
                metrics.ci_meta.insert("aggregate_winner".to_string(), serde_json::json!(*index == agg.winner_index));
                for (key, value) in &agg.metadata {
                    metrics.ci_meta.insert(key.clone(), value.clone());
                }
            }
            self.logger.emit(&Event::RunMetric(Box::new(metrics)));
        }
    }
}

fn judge_request(model: &str, prompt: String) -> ProviderRequest {
    ProviderRequest {
        model: model.to_string(),
        prompt,
        messages: None,
        max_tokens: None,
        temperature: None,
        top_p: None,
        stop: vec![],
        timeout: std::time::Duration::from_secs(30),
        options: HashMap::new(),
        metadata: HashMap::new(),
    }
}

fn mode_name(mode: ExecutionMode) -> &'static str {
    match mode {
        ExecutionMode::Sequential => "sequential",
        ExecutionMode::ParallelAny => "parallel_any",
        ExecutionMode::ParallelAll => "parallel_all",
        ExecutionMode::Consensus => "consensus",
    }
}
