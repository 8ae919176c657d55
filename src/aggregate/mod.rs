//! Aggregation Selector (spec.md §4.5): turns a batch of ok candidates into
//! a single winner plus metadata, following `original_source`'s
//! `adapter/core/aggregation_selector.py`.

pub mod strategies;
pub mod tie_break;

use std::collections::HashMap;

use crate::executor::{AttemptResult, Batch};

/// An ok `AttemptResult` with non-empty output, eligible for aggregation
/// (glossary: Candidate).
#[derive(Debug, Clone)]
pub struct AggregationCandidate {
    pub index: usize,
    pub provider: String,
    pub text: String,
    pub score: Option<f64>,
    pub attempt: AttemptResult,
}

impl AggregationCandidate {
    pub fn cost_usd(&self) -> f64 {
        self.attempt.metrics.cost_usd
    }
}

/// Builds the candidate list from a batch (§3: "Built by aggregation
/// selector from ok attempts with non-empty output").
pub fn candidates_from_batch(batch: &Batch) -> Vec<AggregationCandidate> {
    batch
        .iter()
        .filter(|(_, attempt)| attempt.is_candidate())
        .map(|(index, attempt)| AggregationCandidate {
            index: *index,
            provider: attempt.metrics.provider.clone(),
            text: attempt.metrics.output_text.clone().unwrap_or_default(),
            score: None,
            attempt: attempt.clone(),
        })
        .collect()
}

/// Returned to the runner; drives `ci_meta` tagging (§3).
#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub winner_index: usize,
    pub candidates: Vec<AggregationCandidate>,
    pub strategy: String,
    pub reason: String,
    pub tie_breaker_used: &'static str,
    pub metadata: HashMap<String, serde_json::Value>,
}
