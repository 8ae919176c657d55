//! Budget Manager (spec.md §4.6): per-provider and daily USD accounting
//! that can veto further calls.
//!
//! Grounded in `original_source` `adapter/core/budgets.py`'s
//! `BudgetManager.notify_cost` / `should_stop_run`: cost is accumulated
//! per provider for the run and for the calendar day, and a breach either
//! stops the run (`stop_on_budget_exceed`) or downgrades the attempt to
//! `guard_violation` when overrun is disallowed.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::config::{BudgetBook, BudgetRule};
use crate::metrics::{BudgetSnapshot, Status};

/// A rule's cap is treated as unlimited when `<= 0.0` — the budget book's
/// zero-valued `Default` otherwise breaches on the very first call, which
/// is never the intent of an unconfigured budget (§9 open question,
/// decided here and recorded in DESIGN.md).
fn is_unlimited(cap_usd: f64) -> bool {
    cap_usd <= 0.0
}

struct ProviderState {
    spent_run_usd: f64,
    spent_today_usd: f64,
    day: NaiveDate,
}

impl ProviderState {
    fn new(today: NaiveDate) -> Self {
        Self { spent_run_usd: 0.0, spent_today_usd: 0.0, day: today }
    }

    fn roll_over_if_needed(&mut self, today: NaiveDate) {
        if self.day != today {
            self.day = today;
            self.spent_today_usd = 0.0;
        }
    }
}

/// Outcome of one [`BudgetManager::evaluate`] call: a snapshot of spend
/// plus any overrides `RunMetrics` fields should take.
pub struct BudgetEvaluation {
    pub snapshot: BudgetSnapshot,
    /// Truthy reason string when the run must stop after recording this
    /// attempt.
    pub stop_reason: Option<String>,
    pub status: Status,
    pub failure_kind: Option<String>,
    pub error_message: Option<String>,
}

pub struct BudgetManager {
    book: BudgetBook,
    state: Mutex<HashMap<String, ProviderState>>,
}

impl BudgetManager {
    pub fn new(book: BudgetBook) -> Self {
        Self { book, state: Mutex::new(HashMap::new()) }
    }

    fn rule_for(&self, provider: &str) -> BudgetRule {
        self.book.rule_for(provider).clone()
    }

    /// Records `cost_usd` against `provider` and returns the evaluation the
    /// runner applies to the in-flight `RunMetrics` (§4.6).
    pub fn evaluate(
        &self,
        provider: &str,
        cost_usd: f64,
        status: Status,
        failure_kind: Option<String>,
        error_message: Option<String>,
        allow_overrun: bool,
    ) -> BudgetEvaluation {
        let rule = self.rule_for(provider);
        let today = chrono::Utc::now().date_naive();

        let (spent_run, spent_today) = {
            let mut state = self.state.lock().unwrap();
            let entry = state.entry(provider.to_string()).or_insert_with(|| ProviderState::new(today));
            entry.roll_over_if_needed(today);
            entry.spent_run_usd += cost_usd;
            entry.spent_today_usd += cost_usd;
            (entry.spent_run_usd, entry.spent_today_usd)
        };

        let run_breach = !is_unlimited(rule.run_budget_usd) && spent_run > rule.run_budget_usd;
        let daily_breach = !is_unlimited(rule.daily_budget_usd) && spent_today > rule.daily_budget_usd;
        let breached = run_breach || daily_breach;

        let snapshot = BudgetSnapshot {
            spent_run_usd: spent_run,
            spent_today_usd: spent_today,
            run_budget_usd: rule.run_budget_usd,
            daily_budget_usd: rule.daily_budget_usd,
        };

        if !breached {
            return BudgetEvaluation { snapshot, stop_reason: None, status, failure_kind, error_message };
        }

        let reason = if run_breach {
            format!("run budget exceeded: spent ${spent_run:.4} > ${:.4}", rule.run_budget_usd)
        } else {
            format!("daily budget exceeded: spent ${spent_today:.4} > ${:.4}", rule.daily_budget_usd)
        };

        let stop_reason = rule.stop_on_budget_exceed.then(|| reason.clone());

        if allow_overrun {
            return BudgetEvaluation { snapshot, stop_reason, status, failure_kind, error_message };
        }

        let downgraded_message = match error_message {
            Some(existing) if !existing.is_empty() => format!("{existing}|{reason}"),
            _ => reason,
        };

        BudgetEvaluation {
            snapshot,
            stop_reason,
            status: Status::Error,
            failure_kind: Some("guard_violation".to_string()),
            error_message: Some(downgraded_message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BudgetRule;

    fn manager_with(run_budget_usd: f64, stop_on_budget_exceed: bool) -> BudgetManager {
        let mut book = BudgetBook::default();
        book.default = BudgetRule { run_budget_usd, daily_budget_usd: 0.0, stop_on_budget_exceed };
        BudgetManager::new(book)
    }

    #[test]
    fn unlimited_by_default_never_breaches() {
        let manager = manager_with(0.0, false);
        let eval = manager.evaluate("p1", 1_000_000.0, Status::Ok, None, None, false);
        assert_eq!(eval.status, Status::Ok);
        assert!(eval.stop_reason.is_none());
    }

    #[test]
    fn run_breach_downgrades_to_guard_violation_unless_overrun_allowed() {
        let manager = manager_with(1.0, true);
        let eval = manager.evaluate("p1", 2.0, Status::Ok, None, None, false);
        assert_eq!(eval.status, Status::Error);
        assert_eq!(eval.failure_kind.as_deref(), Some("guard_violation"));
        assert_eq!(eval.stop_reason, Some(format!("run budget exceeded: spent $2.0000 > $1.0000")));

        let allowed = manager.evaluate("p1", 0.0, Status::Ok, None, None, true);
        assert_eq!(allowed.status, Status::Ok);
    }

    #[test]
    fn accounting_accumulates_across_calls() {
        let manager = manager_with(5.0, false);
        manager.evaluate("p1", 2.0, Status::Ok, None, None, false);
        let eval = manager.evaluate("p1", 2.0, Status::Ok, None, None, false);
        assert_eq!(eval.snapshot.spent_run_usd, 4.0);
    }
}
