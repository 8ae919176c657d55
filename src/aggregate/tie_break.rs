//! Deterministic tie-breaking (spec.md §4.5 "Tie-breakers").
//!
//! Grounded in `original_source`'s `adapter/core/aggregation_selector.py`
//! `_CompositeTieBreaker`: when multiple candidates share the winning
//! bucket, break ties by latency, then cost, then stable input order,
//! reporting the first axis that actually discriminated.

use crate::executor::AttemptResult;

/// A tied candidate plus the fields tie-breaking needs, indexed by its
/// position in the original batch (stable order).
pub struct TieCandidate<'a> {
    pub index: usize,
    pub attempt: &'a AttemptResult,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreaker {
    MinLatency,
    MinCost,
    StableOrder,
    /// Unset: composite latency → cost → stable_order (the default).
    Composite,
}

impl TieBreaker {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().replace('-', "_").as_str() {
            "latency" | "min_latency" => Some(Self::MinLatency),
            "cost" | "min_cost" => Some(Self::MinCost),
            "first" | "stable_order" => Some(Self::StableOrder),
            _ => None,
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            Self::MinLatency => "latency",
            Self::MinCost => "cost",
            Self::StableOrder => "stable_order",
            Self::Composite => "stable_order",
        }
    }
}

/// Resolves `config.tie_breaker`, defaulting to composite when unset.
pub fn resolve(raw: Option<&str>) -> TieBreaker {
    raw.and_then(TieBreaker::parse).unwrap_or(TieBreaker::Composite)
}

/// Breaks a tie among `candidates` (already narrowed to the winning
/// bucket), returning the chosen candidate's index into `candidates` and
/// the axis name that discriminated (or the breaker's own display name if
/// every axis tied, e.g. a single-axis breaker applied to identical
/// values).
pub fn break_tie(breaker: TieBreaker, candidates: &[TieCandidate]) -> (usize, &'static str) {
    debug_assert!(!candidates.is_empty());
    if candidates.len() == 1 {
        return (0, breaker.display_name());
    }

    match breaker {
        TieBreaker::MinLatency => (min_by_latency(candidates), "latency"),
        TieBreaker::MinCost => (min_by_cost(candidates), "cost"),
        TieBreaker::StableOrder => (stable_order(candidates), "stable_order"),
        TieBreaker::Composite => composite(candidates),
    }
}

fn min_by_latency(candidates: &[TieCandidate]) -> usize {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| c.attempt.metrics.latency_ms)
        .map(|(i, _)| i)
        .unwrap()
}

fn min_by_cost(candidates: &[TieCandidate]) -> usize {
    candidates
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cost_usd.total_cmp(&b.cost_usd))
        .map(|(i, _)| i)
        .unwrap()
}

fn stable_order(candidates: &[TieCandidate]) -> usize {
    candidates.iter().enumerate().min_by_key(|(_, c)| c.index).map(|(i, _)| i).unwrap()
}

/// Composite: try latency first; if every candidate shares the same
/// latency, fall through to cost; if that also ties, fall through to
/// stable order (which always discriminates, since indices are unique).
fn composite(candidates: &[TieCandidate]) -> (usize, &'static str) {
    let first_latency = candidates[0].attempt.metrics.latency_ms;
    if candidates.iter().any(|c| c.attempt.metrics.latency_ms != first_latency) {
        return (min_by_latency(candidates), "latency");
    }

    let first_cost = candidates[0].cost_usd;
    if candidates.iter().any(|c| c.cost_usd != first_cost) {
        return (min_by_cost(candidates), "cost");
    }

    (stable_order(candidates), "stable_order")
}
