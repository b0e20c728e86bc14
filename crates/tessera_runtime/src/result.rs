//! Step and run results.
//!
//! The run hash covers exactly `{run_id, status, steps}`. Timing fields and
//! the run-level error ride along for reporting but never change the hash.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tessera_core::{EncodeError, canonical};
use tessera_plan::StepStatus;

/// Why a step (or a whole run) did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No handler registered for the step kind
    AdapterNotFound,
    /// Handler returned an error
    AdapterError,
    /// Handler exceeded the step's declared timeout
    StepTimeout,
    /// Handler panicked
    StepCrash,
    /// A dependency failed or was skipped
    DependencyFailed,
    /// Plan failed validation before any step ran
    PlanInvalid,
}

impl ErrorCode {
    /// Wire label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AdapterNotFound => "ADAPTER_NOT_FOUND",
            Self::AdapterError => "ADAPTER_ERROR",
            Self::StepTimeout => "STEP_TIMEOUT",
            Self::StepCrash => "STEP_CRASH",
            Self::DependencyFailed => "DEPENDENCY_FAILED",
            Self::PlanInvalid => "PLAN_INVALID",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded on a step or run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    /// Error code
    pub code: ErrorCode,
    /// Message, verbatim from the handler where there is one
    pub message: String,
    /// Structured detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StepError {
    /// Error without context
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    /// Attach context
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step id
    pub step_id: String,
    /// Terminal status
    pub status: StepStatus,
    /// Handler output on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error on failure or skip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepResult {
    /// Successful step
    #[must_use]
    pub fn success(step_id: impl Into<String>, output: Value) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Success,
            output: Some(output),
            error: None,
        }
    }

    /// Failed step
    #[must_use]
    pub fn failure(step_id: impl Into<String>, error: StepError) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failure,
            output: None,
            error: Some(error),
        }
    }

    /// Skipped step
    #[must_use]
    pub fn skipped(step_id: impl Into<String>, error: StepError) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            output: None,
            error: Some(error),
        }
    }

    /// Error message, if any
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Every step succeeded and none was skipped
    Success,
    /// At least one success mixed with failures or skips
    Partial,
    /// No step succeeded
    Failure,
}

impl RunStatus {
    /// Derive the run status from step results.
    ///
    /// No steps, or no successful step, is a failure.
    #[must_use]
    pub fn from_steps(steps: &[StepResult]) -> Self {
        let succeeded = steps
            .iter()
            .filter(|s| s.status == StepStatus::Success)
            .count();
        if succeeded == 0 {
            Self::Failure
        } else if succeeded == steps.len() {
            Self::Success
        } else {
            Self::Partial
        }
    }

    /// Wire label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hashed projection of a run
#[derive(Serialize)]
struct HashedRun<'a> {
    run_id: &'a str,
    status: RunStatus,
    steps: &'a [StepResult],
}

/// Compute the content hash of a run
///
/// # Errors
///
/// Returns error if a step output cannot be canonically encoded
pub fn run_hash(run_id: &str, status: RunStatus, steps: &[StepResult]) -> Result<String, EncodeError> {
    canonical::hash(&HashedRun {
        run_id,
        status,
        steps,
    })
}

/// Result of executing a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Run id from the run context
    pub run_id: String,
    /// Overall status
    pub status: RunStatus,
    /// Resolved steps in declaration order
    pub steps: Vec<StepResult>,
    /// SHA-256 over `{run_id, status, steps}`
    pub hash: String,
    /// Run-level error, e.g. plan validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    /// Run clock at start
    pub started_at: String,
    /// Run clock at completion
    pub completed_at: String,
    /// Run clock milliseconds between start and completion
    pub duration_ms: i64,
}

impl RunResult {
    /// Whether the run succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Steps whose handler was attempted (everything but skips)
    #[must_use]
    pub fn steps_executed(&self) -> usize {
        self.count(|s| s != StepStatus::Skipped)
    }

    /// Successful steps
    #[must_use]
    pub fn steps_succeeded(&self) -> usize {
        self.count(|s| s == StepStatus::Success)
    }

    /// Failed steps
    #[must_use]
    pub fn steps_failed(&self) -> usize {
        self.count(|s| s == StepStatus::Failure)
    }

    /// Skipped steps
    #[must_use]
    pub fn steps_skipped(&self) -> usize {
        self.count(|s| s == StepStatus::Skipped)
    }

    fn count(&self, pred: impl Fn(StepStatus) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(s.status)).count()
    }

    /// Run-level error message, else the first failed step's message
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        if let Some(err) = &self.error {
            return Some(err.message.as_str());
        }
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Failure)
            .and_then(StepResult::error_message)
    }

    /// Result for a step id
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_id == id)
    }

    /// Recompute the hash from the hashed fields
    ///
    /// # Errors
    ///
    /// Returns error if a step output cannot be canonically encoded
    pub fn compute_hash(&self) -> Result<String, EncodeError> {
        run_hash(&self.run_id, self.status, &self.steps)
    }

    /// Whether the stored hash matches the content
    #[must_use]
    pub fn verify_hash(&self) -> bool {
        self.compute_hash().is_ok_and(|h| h == self.hash)
    }
}

/// Severity of a run log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detail
    Debug,
    /// Progress
    Info,
    /// Step failures and skips
    Warn,
    /// Run-level failures
    Error,
}

/// Line of a run log, timestamped by the run clock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO timestamp from the run clock
    pub timestamp: String,
    /// Severity
    pub level: LogLevel,
    /// Text
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(id: &str) -> StepResult {
        StepResult::success(id, json!(id))
    }

    fn failed(id: &str) -> StepResult {
        StepResult::failure(id, StepError::new(ErrorCode::AdapterError, "boom"))
    }

    fn skipped(id: &str) -> StepResult {
        StepResult::skipped(id, StepError::new(ErrorCode::DependencyFailed, "dep"))
    }

    fn result(steps: Vec<StepResult>) -> RunResult {
        let status = RunStatus::from_steps(&steps);
        let hash = run_hash("run-1", status, &steps).unwrap();
        RunResult {
            run_id: "run-1".to_string(),
            status,
            steps,
            hash,
            error: None,
            started_at: "t0".to_string(),
            completed_at: "t1".to_string(),
            duration_ms: 1,
        }
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(RunStatus::from_steps(&[]), RunStatus::Failure);
        assert_eq!(RunStatus::from_steps(&[ok("a"), ok("b")]), RunStatus::Success);
        assert_eq!(RunStatus::from_steps(&[ok("a"), failed("b")]), RunStatus::Partial);
        assert_eq!(RunStatus::from_steps(&[ok("a"), skipped("b")]), RunStatus::Partial);
        assert_eq!(RunStatus::from_steps(&[failed("a"), skipped("b")]), RunStatus::Failure);
    }

    #[test]
    fn test_counts_and_error() {
        let r = result(vec![ok("a"), failed("b"), skipped("c")]);
        assert_eq!(r.steps_executed(), 2);
        assert_eq!(r.steps_succeeded(), 1);
        assert_eq!(r.steps_failed(), 1);
        assert_eq!(r.steps_skipped(), 1);
        assert_eq!(r.error(), Some("boom"));
        assert_eq!(r.step("c").unwrap().status, StepStatus::Skipped);
        assert!(!r.is_success());
    }

    #[test]
    fn test_run_level_error_wins() {
        let mut r = result(vec![]);
        r.error = Some(StepError::new(ErrorCode::PlanInvalid, "bad plan"));
        assert_eq!(r.error(), Some("bad plan"));
    }

    #[test]
    fn test_hash_ignores_timing() {
        let a = result(vec![ok("a")]);
        let mut b = a.clone();
        b.started_at = "other".to_string();
        b.duration_ms = 99;
        assert_eq!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
        assert!(b.verify_hash());
    }

    #[test]
    fn test_hash_detects_tampering() {
        let mut r = result(vec![ok("a")]);
        r.steps[0].output = Some(json!("changed"));
        assert!(!r.verify_hash());
    }

    #[test]
    fn test_wire_shape() {
        let r = result(vec![failed("a")]);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], json!("FAILURE"));
        assert_eq!(v["steps"][0]["status"], json!("FAILURE"));
        assert_eq!(v["steps"][0]["error"]["code"], json!("ADAPTER_ERROR"));
        assert!(v["steps"][0].get("output").is_none());
        let back: RunResult = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_log_level_wire() {
        let entry = LogEntry {
            timestamp: "t".to_string(),
            level: LogLevel::Warn,
            message: "m".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"timestamp": "t", "level": "warn", "message": "m"})
        );
    }
}
