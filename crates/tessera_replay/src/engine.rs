//! Record and replay of plan executions.
//!
//! A replay rebuilds the run context from the recording: a clock frozen at
//! `start_time_ms` and an id factory seeded with `seed` under the recorded
//! run id prefix. With the same plan content and handlers the replayed
//! result hash equals the recorded one.

use crate::diff::{ReplayDifference, compare_results, compare_steps};
use crate::recording::{
    Recording, RecordingError, RecordingMetadata, create_recording, validate_recording,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tessera_adapter::AdapterRegistry;
use tessera_core::{
    Clock, CoreError, DEFAULT_RUN_PREFIX, DeterministicClock, IdFactory, RunContext,
    SeededIdFactory,
};
use tessera_plan::{Plan, PlanError};
use tessera_runtime::{ExecutionError, Executor, ExecutorConfig, RunResult};
use thiserror::Error;
use tracing::{info, warn};

/// Replay failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// Recording hash does not match its content
    #[error("Recording integrity violation: recorded {recorded}, computed {computed}")]
    IntegrityViolation {
        /// Hash stored in the recording (empty when absent)
        recorded: String,
        /// Hash of the actual content
        computed: String,
    },
    /// Recorded plan could not be parsed or encoded
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// Execution could not produce a result
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// Recording could not be built or encoded
    #[error(transparent)]
    Recording(#[from] RecordingError),
}

impl From<ReplayError> for CoreError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::IntegrityViolation { recorded, computed } => CoreError::HashMismatch {
                expected: recorded,
                actual: computed,
            },
            ReplayError::Execution(e) => e.into(),
            ReplayError::Recording(e) => e.into(),
            ReplayError::Plan(e) => CoreError::ParseError {
                message: e.to_string(),
            },
        }
    }
}

/// Replacements for the sources rebuilt from a recording
#[derive(Clone, Default)]
pub struct ReplayOverrides {
    /// Clock to use instead of one frozen at the recorded start
    pub clock: Option<Arc<dyn Clock>>,
    /// Id factory to use instead of one seeded from the recording
    pub id_factory: Option<Arc<dyn IdFactory>>,
    /// Prefix for the seeded id factory
    pub run_prefix: Option<String>,
}

impl fmt::Debug for ReplayOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayOverrides")
            .field("clock", &self.clock.is_some())
            .field("id_factory", &self.id_factory.is_some())
            .field("run_prefix", &self.run_prefix)
            .finish()
    }
}

/// Sources needed to re-execute a recording
#[derive(Clone)]
pub struct ReplayContext {
    /// Run clock
    pub clock: Arc<dyn Clock>,
    /// Id source
    pub id_factory: Arc<dyn IdFactory>,
    /// Canonical plan document
    pub plan_content: String,
    /// Recorded seed
    pub seed: String,
}

impl ReplayContext {
    /// Build a run context over these sources.
    ///
    /// The run id is drawn from the id factory, so only the first call on a
    /// fresh factory reproduces the recorded run id.
    #[must_use]
    pub fn run_context(&self) -> RunContext {
        RunContext::from_sources(
            self.seed.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&self.id_factory),
        )
    }

    /// Parse the recorded plan
    ///
    /// # Errors
    ///
    /// Returns error if the plan content is not a plan document
    pub fn plan(&self) -> Result<Plan, PlanError> {
        Plan::from_json(&self.plan_content)
    }
}

impl fmt::Debug for ReplayContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayContext")
            .field("now_ms", &self.clock.now_ms())
            .field("seed", &self.seed)
            .field("plan_content", &self.plan_content)
            .finish_non_exhaustive()
    }
}

/// Prefix of a seeded run id (`<prefix>-<counter>-<hex>`)
fn run_id_prefix(run_id: &str) -> Option<&str> {
    let mut parts = run_id.rsplitn(3, '-');
    let _hex = parts.next()?;
    let counter = parts.next()?;
    let prefix = parts.next()?;
    counter
        .bytes()
        .all(|b| b.is_ascii_digit())
        .then_some(prefix)
}

/// Rebuild replay sources from a recording
#[must_use]
pub fn create_replay_context(recording: &Recording, overrides: ReplayOverrides) -> ReplayContext {
    let clock = overrides
        .clock
        .unwrap_or_else(|| Arc::new(DeterministicClock::new(recording.start_time_ms)));
    let id_factory = overrides.id_factory.unwrap_or_else(|| {
        let prefix = overrides
            .run_prefix
            .as_deref()
            .or_else(|| run_id_prefix(&recording.result.run_id))
            .unwrap_or(DEFAULT_RUN_PREFIX);
        Arc::new(SeededIdFactory::new(recording.seed.clone(), prefix))
    });
    ReplayContext {
        clock,
        id_factory,
        plan_content: recording.plan_content.clone(),
        seed: recording.seed.clone(),
    }
}

/// Replay engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Executor settings for new recordings and for recordings that carry none
    pub executor: ExecutorConfig,
    /// Run id prefix for new recordings
    pub run_prefix: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            run_prefix: DEFAULT_RUN_PREFIX.to_string(),
        }
    }
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Result of the re-execution
    pub result: RunResult,
    /// Summary fields that diverged
    pub differences: Vec<ReplayDifference>,
    /// Step fields that diverged
    pub step_differences: Vec<ReplayDifference>,
    /// Whether the replayed hash equals the recorded one
    pub hash_matches: bool,
}

impl ReplayReport {
    /// No divergence at all
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.hash_matches && self.differences.is_empty() && self.step_differences.is_empty()
    }
}

/// Records runs and replays recordings
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    config: ReplayConfig,
}

impl ReplayEngine {
    /// Create an engine
    #[must_use]
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Execute a plan deterministically and record the run
    ///
    /// # Errors
    ///
    /// Returns error if the result, plan or recording cannot be encoded
    pub async fn record(
        &self,
        plan: &Plan,
        registry: &AdapterRegistry,
        seed: &str,
        start_time_ms: i64,
        metadata: Option<RecordingMetadata>,
    ) -> Result<Recording, ReplayError> {
        let ctx = RunContext::deterministic_with_prefix(seed, start_time_ms, &self.config.run_prefix);
        let executor = Executor::new(self.config.executor.clone());
        let (result, logs) = executor.execute_logged(plan, registry, &ctx).await?;
        let plan_content = plan.canonical_content()?;
        let metadata = metadata
            .unwrap_or_default()
            .with_executor(self.config.executor.clone());

        let recording = create_recording(
            result,
            logs,
            plan_content,
            seed,
            start_time_ms,
            Some(metadata),
        )?;
        info!(
            run_id = %recording.result.run_id,
            status = %recording.result.status,
            "run recorded"
        );
        Ok(recording)
    }

    /// Re-execute a recording and compare against it
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::IntegrityViolation`] if the recording fails
    /// validation, or error if its plan cannot be parsed or the replayed
    /// result cannot be hashed
    pub async fn replay(
        &self,
        recording: &Recording,
        registry: &AdapterRegistry,
    ) -> Result<ReplayReport, ReplayError> {
        self.replay_with(recording, registry, ReplayOverrides::default())
            .await
    }

    /// Same as [`ReplayEngine::replay`] with replaced sources
    ///
    /// # Errors
    ///
    /// See [`ReplayEngine::replay`]
    pub async fn replay_with(
        &self,
        recording: &Recording,
        registry: &AdapterRegistry,
        overrides: ReplayOverrides,
    ) -> Result<ReplayReport, ReplayError> {
        if !validate_recording(recording) {
            let computed = recording
                .compute_hash()
                .map_err(RecordingError::from)?;
            let recorded = recording.hash.clone().unwrap_or_default();
            warn!(%recorded, %computed, "refusing to replay tampered recording");
            return Err(ReplayError::IntegrityViolation { recorded, computed });
        }

        let replay_ctx = create_replay_context(recording, overrides);
        let plan = replay_ctx.plan()?;
        let ctx = replay_ctx.run_context();
        let config = recording
            .metadata
            .as_ref()
            .and_then(|m| m.executor.clone())
            .unwrap_or_else(|| self.config.executor.clone());

        let result = Executor::new(config).execute(&plan, registry, &ctx).await?;
        let differences = compare_results(&recording.result, &result);
        let step_differences = compare_steps(&recording.result, &result);
        let hash_matches = result.hash == recording.result.hash;

        if hash_matches {
            info!(run_id = %result.run_id, "replay matched");
        } else {
            warn!(
                recorded = %recording.result.hash,
                replayed = %result.hash,
                differences = differences.len() + step_differences.len(),
                "replay diverged"
            );
        }

        Ok(ReplayReport {
            result,
            differences,
            step_differences,
            hash_matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tessera_adapter::{Handler, HandlerError, builtin_registry};
    use tessera_plan::{PlanBuilder, StepBuilder};
    use tessera_runtime::{FailurePolicy, RunStatus};

    fn plan() -> Plan {
        PlanBuilder::new("greeting", "1.0.0")
            .step(StepBuilder::new("hello", "echo").input(json!("hello")))
            .step(
                StepBuilder::new("joined", "concat")
                    .input(json!({"parts": ["a", "b"], "separator": "-"}))
                    .depends_on("hello"),
            )
            .step(StepBuilder::new("stamped", "stamp").input(json!({"n": 1})))
            .build()
            .unwrap()
    }

    struct Shout;

    #[async_trait]
    impl Handler for Shout {
        fn kind(&self) -> &str {
            "echo"
        }

        async fn execute(&self, input: &Value, _ctx: &RunContext) -> Result<Value, HandlerError> {
            Ok(json!(input.as_str().unwrap_or_default().to_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_record_then_replay_matches() {
        let registry = builtin_registry().unwrap();
        let engine = ReplayEngine::default();
        let recording = engine
            .record(&plan(), &registry, "seed-42", 1_700_000_000_000, None)
            .await
            .unwrap();
        assert!(validate_recording(&recording));
        assert_eq!(recording.result.status, RunStatus::Success);

        let report = engine.replay(&recording, &registry).await.unwrap();
        assert!(report.is_match(), "{:?}", report.differences);
        assert_eq!(report.result.run_id, recording.result.run_id);
        assert_eq!(report.result.hash, recording.result.hash);
        assert_eq!(report.result.steps, recording.result.steps);
    }

    #[tokio::test]
    async fn test_integral_float_input_replays_cleanly() {
        let registry = builtin_registry().unwrap();
        let engine = ReplayEngine::default();
        let plan = PlanBuilder::new("floats", "1")
            .step(StepBuilder::new("w", "echo").input(json!({ "w": 2.0 })))
            .build()
            .unwrap();
        let recording = engine.record(&plan, &registry, "seed", 0, None).await.unwrap();
        assert_eq!(recording.result.steps[0].output, Some(json!({ "w": 2 })));

        let report = engine.replay(&recording, &registry).await.unwrap();
        assert!(report.hash_matches);
        assert!(report.step_differences.is_empty(), "{:?}", report.step_differences);
        assert!(report.is_match());
    }

    #[tokio::test]
    async fn test_replay_refuses_tampered_recording() {
        let registry = builtin_registry().unwrap();
        let engine = ReplayEngine::default();
        let mut recording = engine
            .record(&plan(), &registry, "seed", 0, None)
            .await
            .unwrap();
        recording.seed = "other".to_string();

        let err = engine.replay(&recording, &registry).await.unwrap_err();
        assert!(matches!(err, ReplayError::IntegrityViolation { .. }));
        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::HashMismatch { .. }));
    }

    #[tokio::test]
    async fn test_changed_handler_diverges() {
        let engine = ReplayEngine::default();
        let recording = engine
            .record(&plan(), &builtin_registry().unwrap(), "seed", 0, None)
            .await
            .unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(Shout)).unwrap();

        let report = engine.replay(&recording, &registry).await.unwrap();
        assert!(!report.hash_matches);
        assert!(!report.is_match());
        let paths: Vec<&str> = report.differences.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["status", "steps_executed", "steps_succeeded", "steps_failed", "error"]);
        assert_eq!(report.step_differences[0].path, "steps.hello.output");
    }

    #[tokio::test]
    async fn test_recorded_policy_is_reused() {
        let failing = PlanBuilder::new("p", "1")
            .step(StepBuilder::new("boom", "fail").input(json!({"message": "no"})))
            .step(StepBuilder::new("after", "echo").input(json!(1)))
            .build()
            .unwrap();
        let registry = builtin_registry().unwrap();
        let recorder = ReplayEngine::new(ReplayConfig {
            executor: ExecutorConfig {
                failure_policy: FailurePolicy::ContinueOnFailure,
                ..ExecutorConfig::default()
            },
            ..ReplayConfig::default()
        });
        let recording = recorder
            .record(&failing, &registry, "seed", 0, None)
            .await
            .unwrap();
        assert_eq!(recording.result.status, RunStatus::Partial);

        let report = ReplayEngine::default()
            .replay(&recording, &registry)
            .await
            .unwrap();
        assert!(report.is_match());
    }

    #[tokio::test]
    async fn test_clock_override_changes_stamp() {
        let registry = builtin_registry().unwrap();
        let engine = ReplayEngine::default();
        let recording = engine
            .record(&plan(), &registry, "seed", 5_000, None)
            .await
            .unwrap();

        let overrides = ReplayOverrides {
            clock: Some(Arc::new(DeterministicClock::new(9_000))),
            ..ReplayOverrides::default()
        };
        let report = engine
            .replay_with(&recording, &registry, overrides)
            .await
            .unwrap();
        assert!(report.differences.is_empty());
        assert!(!report.hash_matches);
        assert_eq!(report.step_differences.len(), 1);
        assert_eq!(report.step_differences[0].path, "steps.stamped.output");
    }

    #[tokio::test]
    async fn test_custom_prefix_round_trip() {
        let registry = builtin_registry().unwrap();
        let engine = ReplayEngine::new(ReplayConfig {
            run_prefix: "nightly-build".to_string(),
            ..ReplayConfig::default()
        });
        let recording = engine
            .record(&plan(), &registry, "seed", 0, None)
            .await
            .unwrap();
        assert!(recording.result.run_id.starts_with("nightly-build-"));

        let report = ReplayEngine::default()
            .replay(&recording, &registry)
            .await
            .unwrap();
        assert!(report.is_match());
    }

    #[test]
    fn test_replay_context_reproduces_run_id() {
        let recorded = RunContext::deterministic("seed-7", 1_000);
        let result = RunResult {
            run_id: recorded.run_id().to_string(),
            status: RunStatus::Failure,
            steps: Vec::new(),
            hash: String::new(),
            error: None,
            started_at: String::new(),
            completed_at: String::new(),
            duration_ms: 0,
        };
        let recording =
            create_recording(result, Vec::new(), "{}", "seed-7", 1_000, None).unwrap();

        let replay = create_replay_context(&recording, ReplayOverrides::default());
        assert_eq!(replay.clock.now_ms(), 1_000);
        assert_eq!(replay.plan_content, "{}");
        assert_eq!(replay.run_context().run_id(), recorded.run_id());
    }

    #[test]
    fn test_run_id_prefix() {
        assert_eq!(run_id_prefix("run-000001-deadbeef"), Some("run"));
        assert_eq!(run_id_prefix("a-b-000002-cafe0000"), Some("a-b"));
        assert_eq!(run_id_prefix("run-x-deadbeef"), None);
        assert_eq!(run_id_prefix("plain"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config: ReplayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ReplayConfig::default());
        assert_eq!(config.run_prefix, "run");
    }
}
