//! Field-level comparison of an original and a replayed run.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use tessera_core::canonical;
use tessera_runtime::{RunResult, StepResult};

/// One diverging field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayDifference {
    /// Dotted path of the field
    pub path: String,
    /// Value in the original run
    pub original: Value,
    /// Value in the replayed run
    pub replayed: Value,
}

impl ReplayDifference {
    fn new(path: impl Into<String>, original: Value, replayed: Value) -> Self {
        Self {
            path: path.into(),
            original,
            replayed,
        }
    }
}

impl fmt::Display for ReplayDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.path, self.original, self.replayed)
    }
}

/// Summary fields compared by [`compare_results`], in order
pub const COMPARED_PATHS: [&str; 6] = [
    "status",
    "steps_executed",
    "steps_succeeded",
    "steps_failed",
    "steps_skipped",
    "error",
];

fn summary_field(result: &RunResult, path: &str) -> Value {
    match path {
        "status" => json!(result.status),
        "steps_executed" => json!(result.steps_executed()),
        "steps_succeeded" => json!(result.steps_succeeded()),
        "steps_failed" => json!(result.steps_failed()),
        "steps_skipped" => json!(result.steps_skipped()),
        "error" => json!(result.error()),
        _ => Value::Null,
    }
}

/// Compare run summaries. An empty list means the replay matched.
#[must_use]
pub fn compare_results(original: &RunResult, replayed: &RunResult) -> Vec<ReplayDifference> {
    COMPARED_PATHS
        .iter()
        .filter_map(|path| {
            let a = summary_field(original, path);
            let b = summary_field(replayed, path);
            (a != b).then(|| ReplayDifference::new(*path, a, b))
        })
        .collect()
}

/// Compare individual steps by id: status, output, error message and error
/// context. Output and context are compared by canonical encoding, so `2.0`
/// and `2` are the same value.
///
/// Paths look like `steps.<id>.status`. A step present on one side only is
/// reported once at `steps.<id>` with `null` on the missing side.
#[must_use]
pub fn compare_steps(original: &RunResult, replayed: &RunResult) -> Vec<ReplayDifference> {
    let mut differences = Vec::new();

    for before in &original.steps {
        let path = format!("steps.{}", before.step_id);
        match replayed.step(&before.step_id) {
            Some(after) => diff_step(&path, before, after, &mut differences),
            None => differences.push(ReplayDifference::new(path, step_value(before), Value::Null)),
        }
    }
    for after in &replayed.steps {
        if original.step(&after.step_id).is_none() {
            differences.push(ReplayDifference::new(
                format!("steps.{}", after.step_id),
                Value::Null,
                step_value(after),
            ));
        }
    }
    differences
}

fn diff_step(path: &str, before: &StepResult, after: &StepResult, out: &mut Vec<ReplayDifference>) {
    if before.status != after.status {
        out.push(ReplayDifference::new(
            format!("{path}.status"),
            json!(before.status),
            json!(after.status),
        ));
    }
    if !canonical_eq(before.output.as_ref(), after.output.as_ref()) {
        out.push(ReplayDifference::new(
            format!("{path}.output"),
            json!(before.output),
            json!(after.output),
        ));
    }
    if before.error_message() != after.error_message() {
        out.push(ReplayDifference::new(
            format!("{path}.error"),
            json!(before.error_message()),
            json!(after.error_message()),
        ));
    }
    let before_context = before.error.as_ref().and_then(|e| e.context.as_ref());
    let after_context = after.error.as_ref().and_then(|e| e.context.as_ref());
    if !canonical_eq(before_context, after_context) {
        out.push(ReplayDifference::new(
            format!("{path}.context"),
            json!(before_context),
            json!(after_context),
        ));
    }
}

fn canonical_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => match (canonical::encode(x), canonical::encode(y)) {
            (Ok(x), Ok(y)) => x == y,
            _ => x == y,
        },
        _ => a.is_none() && b.is_none(),
    }
}

fn step_value(step: &StepResult) -> Value {
    serde_json::to_value(step).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_runtime::{ErrorCode, RunStatus, StepError, run_hash};

    fn result(steps: Vec<StepResult>) -> RunResult {
        let status = RunStatus::from_steps(&steps);
        RunResult {
            run_id: "run".to_string(),
            status,
            hash: run_hash("run", status, &steps).unwrap(),
            steps,
            error: None,
            started_at: String::new(),
            completed_at: String::new(),
            duration_ms: 0,
        }
    }

    fn ok(id: &str) -> StepResult {
        StepResult::success(id, json!(id))
    }

    fn failed(id: &str, message: &str) -> StepResult {
        StepResult::failure(id, StepError::new(ErrorCode::AdapterError, message))
    }

    #[test]
    fn test_identical_results_match() {
        let a = result(vec![ok("a"), ok("b")]);
        assert!(compare_results(&a, &a.clone()).is_empty());
        assert!(compare_steps(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_reports_every_divergent_summary_field() {
        let original = result(vec![ok("a"), ok("b")]);
        let replayed = result(vec![ok("a"), failed("b", "flaky")]);
        let diffs = compare_results(&original, &replayed);
        let paths: Vec<&str> = diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["status", "steps_succeeded", "steps_failed", "error"]);
        assert_eq!(diffs[0].original, json!("SUCCESS"));
        assert_eq!(diffs[0].replayed, json!("PARTIAL"));
        assert_eq!(diffs[3].original, Value::Null);
        assert_eq!(diffs[3].replayed, json!("flaky"));
    }

    #[test]
    fn test_error_message_change_detected() {
        let a = result(vec![failed("a", "one")]);
        let b = result(vec![failed("a", "two")]);
        let diffs = compare_results(&a, &b);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].to_string(), r#"error: "one" -> "two""#);
    }

    #[test]
    fn test_step_level_diff() {
        let a = result(vec![ok("a"), ok("b")]);
        let mut changed = ok("b");
        changed.output = Some(json!("other"));
        let b = result(vec![ok("a"), changed, ok("c")]);
        let diffs = compare_steps(&a, &b);
        let paths: Vec<&str> = diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["steps.b.output", "steps.c"]);
        assert_eq!(diffs[1].original, Value::Null);
    }

    #[test]
    fn test_integral_float_output_is_not_a_difference() {
        let mut a = ok("a");
        a.output = Some(json!({ "w": 2.0 }));
        let mut b = ok("a");
        b.output = Some(json!({ "w": 2 }));
        assert!(compare_steps(&result(vec![a]), &result(vec![b])).is_empty());
    }

    #[test]
    fn test_error_context_change_detected() {
        let mut a = failed("a", "same");
        a.error.as_mut().unwrap().context = Some(json!({ "n": 1.0 }));
        let mut b = failed("a", "same");
        b.error.as_mut().unwrap().context = Some(json!({ "n": 1 }));
        assert!(compare_steps(&result(vec![a.clone()]), &result(vec![b])).is_empty());

        let mut c = failed("a", "same");
        c.error.as_mut().unwrap().context = Some(json!({ "n": 2 }));
        let diffs = compare_steps(&result(vec![a]), &result(vec![c]));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "steps.a.context");
        assert_eq!(diffs[0].replayed, json!({ "n": 2 }));
    }

    #[test]
    fn test_missing_replayed_step() {
        let a = result(vec![ok("a"), ok("b")]);
        let b = result(vec![ok("a")]);
        let diffs = compare_steps(&a, &b);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "steps.b");
        assert_eq!(diffs[0].replayed, Value::Null);
    }
}
