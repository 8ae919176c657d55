//! Golden-task loading and scoring (spec.md §3 supplement).
//!
//! A narrow collaborator, not part of the runner core (§6): the CLI loads a
//! JSONL dataset, renders each task's prompt template, runs it through the
//! runner, and scores the winning output against `expected`. Grounded in
//! `original_source`'s `adapter/core/datasets.py` (loading/templating) and
//! `adapter/core/compare_runner_support/metrics_builder.py`'s `_evaluate`
//! (scoring by `expected.type`).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::metrics::EvalMetrics;

/// One entry from a golden-task JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenTask {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub input: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub prompt_template: String,
    #[serde(default)]
    pub expected: ExpectedOutcome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedOutcome {
    #[serde(rename = "type", default = "default_expected_type")]
    pub kind: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

fn default_expected_type() -> String {
    "regex".to_string()
}

impl GoldenTask {
    /// Display name, falling back to the task id (§3, matching
    /// `datasets.py`'s `data.get("name", data["id"])`).
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Substitutes `{{ dotted.key }}` placeholders from `input`, matching
    /// `datasets.py`'s `render_prompt`.
    pub fn render_prompt(&self) -> String {
        let pattern = Regex::new(r"\{\{\s*([a-zA-Z0-9_.]+)\s*\}\}").expect("static pattern is valid");
        pattern
            .replace_all(&self.prompt_template, |caps: &regex::Captures| {
                lookup_nested(&self.input, &caps[1]).map(value_to_display).unwrap_or_default()
            })
            .into_owned()
    }
}

fn lookup_nested<'a>(input: &'a serde_json::Map<String, serde_json::Value>, dotted_key: &str) -> Option<&'a serde_json::Value> {
    let mut current = input.get(dotted_key.split('.').next()?)?;
    let mut parts = dotted_key.split('.');
    parts.next();
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn value_to_display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Loads `path` as newline-delimited JSON, one [`GoldenTask`] per line,
/// skipping blank lines (`datasets.py`'s `load_golden_tasks`).
pub fn load(path: &Path) -> Result<Vec<GoldenTask>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read golden tasks {}", path.display()))?;
    let mut tasks = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let task: GoldenTask = serde_json::from_str(line)
            .with_context(|| format!("{}: invalid golden task on line {}", path.display(), line_no + 1))?;
        tasks.push(task);
    }
    Ok(tasks)
}

/// Score of a golden task against a winning output (§3 `EvalMetrics`).
pub struct ScoreResult {
    pub eval: EvalMetrics,
    /// Set to `parsing` when `json_equal` scoring hit invalid JSON output
    /// (mirrors `metrics_builder.py`'s `_evaluate` failure_kind).
    pub failure_kind: Option<String>,
}

/// Scores `output_text` against `task.expected` (`metrics_builder.py`'s
/// `_evaluate`): `regex` searches, `literal` trims-and-compares, `json_equal`
/// parses both sides and compares structurally.
pub fn score(task: &GoldenTask, output_text: Option<&str>) -> ScoreResult {
    let Some(output_text) = output_text else {
        return ScoreResult { eval: EvalMetrics { expected_kind: Some(task.expected.kind.clone()), ..Default::default() }, failure_kind: None };
    };

    let (passed, detail, failure_kind) = match (task.expected.kind.as_str(), &task.expected.value) {
        ("regex", Some(serde_json::Value::String(pattern))) => match Regex::new(pattern) {
            Ok(re) => (re.is_match(output_text), None, None),
            Err(err) => (false, Some(format!("invalid regex '{pattern}': {err}")), Some("parsing".to_string())),
        },
        ("literal", Some(serde_json::Value::String(expected))) => {
            (output_text.trim() == expected.trim(), None, None)
        }
        ("json_equal", Some(expected_value)) => match serde_json::from_str::<serde_json::Value>(output_text) {
            Ok(actual) => (&actual == expected_value, None, None),
            Err(err) => (false, Some(format!("output is not valid JSON: {err}")), Some("parsing".to_string())),
        },
        (kind, _) => (false, Some(format!("unsupported or missing expected value for kind '{kind}'")), None),
    };

    let eval = EvalMetrics { expected_kind: Some(task.expected.kind.clone()), passed: Some(passed), detail };
    ScoreResult { eval, failure_kind }
}
