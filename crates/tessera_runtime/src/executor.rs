//! Plan executor.
//!
//! Walks the plan once in declaration order, one handler at a time. A step
//! runs only when every dependency succeeded; otherwise it is skipped under
//! the continue policy. Under the stop policy the first failure ends the run
//! and later steps never appear in the result.

use crate::result::{
    ErrorCode, LogEntry, LogLevel, RunResult, RunStatus, StepError, StepResult, run_hash,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tessera_adapter::AdapterRegistry;
use tessera_core::{CoreError, EncodeError, RunContext, canonical};
use tessera_plan::{HookEvent, HookPhase, Plan, Step, StepHook, StepStatus};
use thiserror::Error;
use tracing::{debug, info, warn};

/// What happens after a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Halt at the first failure
    #[default]
    StopOnFailure,
    /// Keep going; skip steps whose dependencies did not succeed
    ContinueOnFailure,
}

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Failure propagation policy
    pub failure_policy: FailurePolicy,
    /// Run-clock milliseconds added after each resolved step
    pub step_tick_ms: u64,
    /// Enforce each step's declared `timeout_ms`
    pub enforce_timeouts: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::StopOnFailure,
            step_tick_ms: 1,
            enforce_timeouts: true,
        }
    }
}

/// Hard failure of a whole execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// A step output has no canonical encoding
    #[error("Failed to encode run result: {0}")]
    Encoding(#[from] EncodeError),
}

impl From<ExecutionError> for CoreError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Encoding(e) => CoreError::Encoding(e),
        }
    }
}

/// Executes plans against a registry
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    /// Create an executor
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Executor with the default config and the given policy
    #[must_use]
    pub fn with_policy(policy: FailurePolicy) -> Self {
        Self::new(ExecutorConfig {
            failure_policy: policy,
            ..ExecutorConfig::default()
        })
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a plan
    ///
    /// Step-level failures never surface as `Err`; they are recorded on the
    /// step. An invalid plan yields a `FAILURE` result with no steps.
    ///
    /// # Errors
    ///
    /// Returns error if a handler output has no canonical encoding or the
    /// result cannot be hashed
    pub async fn execute(
        &self,
        plan: &Plan,
        registry: &AdapterRegistry,
        ctx: &RunContext,
    ) -> Result<RunResult, ExecutionError> {
        self.execute_logged(plan, registry, ctx)
            .await
            .map(|(result, _)| result)
    }

    /// Execute a plan and also return the run log
    ///
    /// # Errors
    ///
    /// See [`Executor::execute`]
    pub async fn execute_logged(
        &self,
        plan: &Plan,
        registry: &AdapterRegistry,
        ctx: &RunContext,
    ) -> Result<(RunResult, Vec<LogEntry>), ExecutionError> {
        let mut log = RunLog::new(ctx);
        let started_ms = ctx.now_ms();
        let started_at = ctx.now_iso();

        info!(
            run_id = ctx.run_id(),
            plan = %plan.id,
            version = %plan.version,
            steps = plan.len(),
            policy = ?self.config.failure_policy,
            "run started"
        );
        log.push(
            LogLevel::Info,
            format!("run started: plan {}@{}", plan.id, plan.version),
        );

        let mut run_error = None;
        let mut results: Vec<StepResult> = Vec::with_capacity(plan.len());

        if let Err(errors) = plan.validate() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            warn!(run_id = ctx.run_id(), errors = ?messages, "plan failed validation");
            log.push(
                LogLevel::Error,
                format!("plan invalid: {}", messages.join("; ")),
            );
            run_error = Some(
                StepError::new(ErrorCode::PlanInvalid, messages.join("; "))
                    .with_context(json!({ "errors": messages })),
            );
        } else {
            self.run_steps(plan, registry, ctx, &mut results, &mut log)
                .await?;
        }

        let status = RunStatus::from_steps(&results);
        let hash = run_hash(ctx.run_id(), status, &results)?;
        let completed_at = ctx.now_iso();
        let duration_ms = ctx.now_ms() - started_ms;

        info!(run_id = ctx.run_id(), %status, hash = %hash, "run finished");
        log.push(LogLevel::Info, format!("run finished: {status}"));

        let result = RunResult {
            run_id: ctx.run_id().to_string(),
            status,
            steps: results,
            hash,
            error: run_error,
            started_at,
            completed_at,
            duration_ms,
        };
        Ok((result, log.into_entries()))
    }

    async fn run_steps(
        &self,
        plan: &Plan,
        registry: &AdapterRegistry,
        ctx: &RunContext,
        results: &mut Vec<StepResult>,
        log: &mut RunLog<'_>,
    ) -> Result<(), ExecutionError> {
        let mut statuses: HashMap<&str, StepStatus> = HashMap::with_capacity(plan.len());

        for step in &plan.steps {
            let blocker = step
                .depends_on
                .iter()
                .find(|dep| statuses.get(dep.as_str()) != Some(&StepStatus::Success));

            let result = if let Some(dep) = blocker {
                let message = format!("dependency '{dep}' did not succeed");
                debug!(run_id = ctx.run_id(), step = %step.id, dependency = %dep, "step skipped");
                log.push(LogLevel::Warn, format!("step {} skipped: {message}", step.id));
                StepResult::skipped(
                    &step.id,
                    StepError::new(ErrorCode::DependencyFailed, message)
                        .with_context(json!({ "dependency": dep })),
                )
            } else {
                call_hook(
                    plan.hooks.pre_step.as_ref(),
                    &HookEvent {
                        phase: HookPhase::PreStep,
                        run_id: ctx.run_id(),
                        step,
                        status: StepStatus::Pending,
                        output: None,
                        error: None,
                    },
                );
                let result = self.run_step(step, registry, ctx).await?;
                match &result.error {
                    None => {
                        debug!(run_id = ctx.run_id(), step = %step.id, "step succeeded");
                        log.push(LogLevel::Info, format!("step {} succeeded", step.id));
                    }
                    Some(err) => {
                        debug!(run_id = ctx.run_id(), step = %step.id, code = %err.code, "step failed");
                        log.push(LogLevel::Warn, format!("step {} failed: {err}", step.id));
                    }
                }
                result
            };

            call_hook(
                plan.hooks.post_step.as_ref(),
                &HookEvent {
                    phase: HookPhase::PostStep,
                    run_id: ctx.run_id(),
                    step,
                    status: result.status,
                    output: result.output.as_ref(),
                    error: result.error_message(),
                },
            );

            ctx.clock().advance(self.config.step_tick_ms);
            statuses.insert(step.id.as_str(), result.status);
            let failed = result.status == StepStatus::Failure;
            results.push(result);

            if failed && self.config.failure_policy == FailurePolicy::StopOnFailure {
                debug!(run_id = ctx.run_id(), step = %step.id, "halting after failure");
                break;
            }
        }
        Ok(())
    }

    /// Outputs and error contexts are normalized to canonical form; a
    /// handler error carrying an [`EncodeError`] aborts the run.
    async fn run_step(
        &self,
        step: &Step,
        registry: &AdapterRegistry,
        ctx: &RunContext,
    ) -> Result<StepResult, ExecutionError> {
        let Some(handler) = registry.get(&step.kind) else {
            return Ok(StepResult::failure(
                &step.id,
                StepError::new(
                    ErrorCode::AdapterNotFound,
                    format!("no adapter registered for kind '{}'", step.kind),
                )
                .with_context(json!({ "kind": step.kind })),
            ));
        };

        let call = AssertUnwindSafe(handler.execute(&step.input, ctx)).catch_unwind();
        let outcome = match step.timeout_ms.filter(|_| self.config.enforce_timeouts) {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Ok(StepResult::failure(
                        &step.id,
                        StepError::new(
                            ErrorCode::StepTimeout,
                            format!("step exceeded its timeout of {ms}ms"),
                        )
                        .with_context(json!({ "timeout_ms": ms })),
                    ));
                }
            },
            None => call.await,
        };

        let result = match outcome {
            Ok(Ok(output)) => StepResult::success(&step.id, canonical::to_value(&output)?),
            Ok(Err(err)) => {
                if let Some(encoding) = err.encoding {
                    warn!(
                        run_id = ctx.run_id(),
                        step = %step.id,
                        reason = %encoding,
                        "handler output has no canonical encoding"
                    );
                    return Err(ExecutionError::Encoding(encoding));
                }
                let mut error = StepError::new(ErrorCode::AdapterError, err.message);
                error.context = err
                    .context
                    .map(|context| canonical::to_value(&context))
                    .transpose()?;
                StepResult::failure(&step.id, error)
            }
            Err(panic) => StepResult::failure(
                &step.id,
                StepError::new(
                    ErrorCode::StepCrash,
                    format!("handler panicked: {}", panic_message(panic.as_ref())),
                ),
            ),
        };
        Ok(result)
    }
}

/// Run a hook, discarding errors and panics
fn call_hook(hook: Option<&StepHook>, event: &HookEvent<'_>) {
    let Some(hook) = hook else {
        return;
    };
    match std::panic::catch_unwind(AssertUnwindSafe(|| hook(event))) {
        Ok(Ok(())) => {}
        Ok(Err(message)) => {
            debug!(step = %event.step.id, phase = ?event.phase, reason = %message, "hook returned an error");
        }
        Err(panic) => {
            debug!(
                step = %event.step.id,
                phase = ?event.phase,
                reason = panic_message(panic.as_ref()),
                "hook panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Run log timestamped by the run clock
struct RunLog<'a> {
    ctx: &'a RunContext,
    entries: Vec<LogEntry>,
}

impl<'a> RunLog<'a> {
    fn new(ctx: &'a RunContext) -> Self {
        Self {
            ctx,
            entries: Vec::new(),
        }
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.entries.push(LogEntry {
            timestamp: self.ctx.now_iso(),
            level,
            message,
        });
    }

    fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}
