//! Aggregation strategies (spec.md §4.5), grounded in `original_source`'s
//! `adapter/core/aggregation_selector.py`.

use std::collections::HashMap;

use crate::config::AggregateKind;
use crate::error::RunnerError;
use crate::provider::Provider;

use super::tie_break::{self, TieBreaker, TieCandidate};
use super::{AggregationCandidate, AggregationResult};

/// Normalizes text for majority-vote keying (§4.5): trim, collapse interior
/// whitespace runs, lowercase.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Keys a candidate for bucketing: normalized JSON (key-order-independent)
/// when `schema_present` and the text parses as JSON, else normalized text.
fn bucket_key(text: &str, schema_present: bool) -> String {
    if schema_present {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
            if let Ok(canonical) = serde_json::to_string(&canonicalize(&value)) {
                return canonical;
            }
        }
    }
    normalize_text(text)
}

/// Recursively sorts object keys so structurally-equal JSON values compare
/// equal regardless of member order.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(entries.into_iter().collect())
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn group_by_bucket<'a>(candidates: &'a [AggregationCandidate], schema_present: bool) -> HashMap<String, Vec<&'a AggregationCandidate>> {
    let mut buckets: HashMap<String, Vec<&AggregationCandidate>> = HashMap::new();
    for candidate in candidates {
        buckets.entry(bucket_key(&candidate.text, schema_present)).or_default().push(candidate);
    }
    buckets
}

fn resolve_winner(bucket: &[&AggregationCandidate], tie_breaker: TieBreaker) -> (usize, &'static str) {
    if bucket.len() == 1 {
        return (bucket[0].index, tie_breaker.to_string_placeholder());
    }
    let tie_candidates: Vec<TieCandidate> =
        bucket.iter().map(|c| TieCandidate { index: c.index, attempt: &c.attempt, cost_usd: c.cost_usd() }).collect();
    let (winner_pos, axis) = tie_break::break_tie(tie_breaker, &tie_candidates);
    (tie_candidates[winner_pos].index, axis)
}

pub fn majority_vote(
    candidates: &[AggregationCandidate],
    schema_present: bool,
    tie_breaker: TieBreaker,
) -> AggregationResult {
    let buckets = group_by_bucket(candidates, schema_present);
    let (key, bucket) = buckets.iter().max_by_key(|(_, members)| members.len()).expect("candidates non-empty");
    let bucket_size = bucket.len();
    let (winner_index, tie_breaker_used) = resolve_winner(bucket, tie_breaker);

    let mut metadata = HashMap::new();
    metadata.insert("bucket_size".to_string(), serde_json::json!(bucket_size));
    metadata.insert("bucket_key".to_string(), serde_json::json!(key));

    AggregationResult {
        winner_index,
        candidates: candidates.to_vec(),
        strategy: "majority_vote".to_string(),
        reason: format!("majority vote: {bucket_size} of {} candidates agreed", candidates.len()),
        tie_breaker_used,
        metadata,
    }
}

pub fn weighted_vote(
    candidates: &[AggregationCandidate],
    schema_present: bool,
    tie_breaker: TieBreaker,
    provider_weights: &HashMap<String, f64>,
) -> Result<AggregationResult, RunnerError> {
    for candidate in candidates {
        if !provider_weights.contains_key(&candidate.provider) {
            return Err(RunnerError::UnknownWeightedProvider(candidate.provider.clone()));
        }
    }

    let buckets = group_by_bucket(candidates, schema_present);
    let mut weighted_votes: HashMap<String, f64> = HashMap::new();
    for (key, members) in &buckets {
        let weight: f64 = members.iter().map(|c| provider_weights[&c.provider]).sum();
        weighted_votes.insert(key.clone(), weight);
    }

    let (key, bucket) = buckets
        .iter()
        .max_by(|(a, _), (b, _)| weighted_votes[*a].total_cmp(&weighted_votes[*b]))
        .expect("candidates non-empty");
    let bucket_weight = weighted_votes[key];
    let bucket_size = bucket.len();
    let (winner_index, tie_breaker_used) = resolve_winner(bucket, tie_breaker);

    let mut metadata = HashMap::new();
    metadata.insert("bucket_weight".to_string(), serde_json::json!(bucket_weight));
    metadata.insert("bucket_size".to_string(), serde_json::json!(bucket_size));
    metadata.insert("weighted_votes".to_string(), serde_json::json!(weighted_votes));
    metadata.insert("provider_weights".to_string(), serde_json::json!(provider_weights));

    Ok(AggregationResult {
        winner_index,
        candidates: candidates.to_vec(),
        strategy: "weighted_vote".to_string(),
        reason: format!("weighted vote: bucket weight {bucket_weight:.3}"),
        tie_breaker_used,
        metadata,
    })
}

pub async fn max_score(
    candidates: &[AggregationCandidate],
    judge: &dyn Provider,
    build_score_request: impl Fn(&AggregationCandidate) -> crate::provider::ProviderRequest,
) -> Result<AggregationResult, RunnerError> {
    let mut scores = HashMap::new();
    let mut best: Option<(usize, f64)> = None;

    for candidate in candidates {
        let request = build_score_request(candidate);
        let score = match judge.invoke(&request).await {
            Ok(response) => response.text.trim().parse::<f64>().unwrap_or(0.0),
            Err(_) => 0.0,
        };
        scores.insert(candidate.provider.clone(), serde_json::json!(score));
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((candidate.index, score));
        }
    }

    let (winner_index, _) = best.ok_or(RunnerError::Config("max_score requires at least one candidate".into()))?;
    let mut metadata = HashMap::new();
    metadata.insert("scores".to_string(), serde_json::json!(scores));

    Ok(AggregationResult {
        winner_index,
        candidates: candidates.to_vec(),
        strategy: "max_score".to_string(),
        reason: "highest judge score".to_string(),
        tie_breaker_used: "judge_score",
        metadata,
    })
}

pub async fn judge_select(
    candidates: &[AggregationCandidate],
    judge: &dyn Provider,
    build_select_request: impl Fn(&[AggregationCandidate]) -> crate::provider::ProviderRequest,
) -> Result<AggregationResult, RunnerError> {
    let request = build_select_request(candidates);
    let response = judge
        .invoke(&request)
        .await
        .map_err(|e| RunnerError::Config(format!("judge provider failed: {e}")))?;

    let selected: usize = response
        .text
        .trim()
        .parse()
        .map_err(|_| RunnerError::Config(format!("judge did not return a candidate index: '{}'", response.text)))?;
    let candidate = candidates
        .get(selected)
        .ok_or_else(|| RunnerError::Config(format!("judge selected out-of-range index {selected}")))?;

    let mut metadata = HashMap::new();
    metadata.insert("reason".to_string(), serde_json::json!(response.text));

    Ok(AggregationResult {
        winner_index: candidate.index,
        candidates: candidates.to_vec(),
        strategy: "judge".to_string(),
        reason: response.text,
        tie_breaker_used: "judge_selected",
        metadata,
    })
}

/// Entry point dispatching on `kind`; callers needing `max_score`/`judge`
/// use [`max_score`]/[`judge_select`] directly since they're async and need
/// a judge handle.
pub fn dispatch_sync(
    kind: AggregateKind,
    candidates: &[AggregationCandidate],
    schema_present: bool,
    tie_breaker: TieBreaker,
    provider_weights: Option<&HashMap<String, f64>>,
) -> Result<AggregationResult, RunnerError> {
    match kind {
        AggregateKind::MajorityVote => Ok(majority_vote(candidates, schema_present, tie_breaker)),
        AggregateKind::WeightedVote => {
            let weights = provider_weights.ok_or(RunnerError::MissingProviderWeights)?;
            weighted_vote(candidates, schema_present, tie_breaker, weights)
        }
        AggregateKind::MaxScore | AggregateKind::Judge => {
            Err(RunnerError::Config(format!("{kind:?} requires an async judge call")))
        }
    }
}

trait TieBreakerDisplay {
    fn to_string_placeholder(self) -> &'static str;
}

impl TieBreakerDisplay for TieBreaker {
    fn to_string_placeholder(self) -> &'static str {
        match self {
            TieBreaker::MinLatency => "latency",
            TieBreaker::MinCost => "cost",
            TieBreaker::StableOrder | TieBreaker::Composite => "stable_order",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::AttemptResult;
    use crate::metrics::{Outcome, RunMetrics, Status};

    fn candidate(index: usize, provider: &str, text: &str, latency_ms: u64) -> AggregationCandidate {
        let attempt = AttemptResult {
            metrics: RunMetrics {
                timestamp_ms: 0,
                run_id: "r".into(),
                provider: provider.into(),
                model: "m".into(),
                mode: "consensus".into(),
                prompt_id: "0".into(),
                seed: None,
                temperature: None,
                top_p: None,
                max_tokens: None,
                input_tokens: 0,
                output_tokens: 0,
                latency_ms,
                cost_usd: 0.0,
                status: Status::Ok,
                failure_kind: None,
                error_message: None,
                error_type: None,
                outcome: Outcome::Success,
                output_text: Some(text.to_string()),
                output_hash: None,
                attempts: 1,
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
        };
        AggregationCandidate { index, provider: provider.into(), text: text.into(), score: None, attempt }
    }

    #[test]
    fn majority_vote_is_whitespace_and_case_invariant() {
        let a = candidate(0, "p1", "  Hello   World  ", 10);
        let b = candidate(1, "p2", "hello world", 5);
        let c = candidate(2, "p3", "something else", 1);
        let result = majority_vote(&[a, b, c], false, TieBreaker::Composite);
        assert_eq!(result.metadata["bucket_size"], serde_json::json!(2));
    }

    #[test]
    fn weighted_vote_with_uniform_weights_matches_majority_vote() {
        let a = candidate(0, "p1", "A", 10);
        let b = candidate(1, "p2", "A", 5);
        let c = candidate(2, "p3", "B", 1);
        let weights = HashMap::from([("p1".to_string(), 1.0), ("p2".to_string(), 1.0), ("p3".to_string(), 1.0)]);
        let weighted = weighted_vote(&[a.clone(), b.clone(), c.clone()], false, TieBreaker::Composite, &weights).unwrap();
        let majority = majority_vote(&[a, b, c], false, TieBreaker::Composite);
        assert_eq!(weighted.winner_index, majority.winner_index);
    }

    #[test]
    fn weighted_vote_rejects_unknown_provider() {
        let a = candidate(0, "p1", "A", 10);
        let weights = HashMap::from([("other".to_string(), 1.0)]);
        let err = weighted_vote(std::slice::from_ref(&a), false, TieBreaker::Composite, &weights).unwrap_err();
        assert!(matches!(err, RunnerError::UnknownWeightedProvider(_)));
    }
}
