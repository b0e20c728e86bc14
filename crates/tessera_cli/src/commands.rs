//! Command implementations. Each returns the text to print and whether the
//! command succeeded; `main` turns that into the exit code.

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tessera_adapter::builtin_registry;
use tessera_core::{Clock, RunContext, SystemClock, canonical_hash};
use tessera_plan::Plan;
use tessera_replay::{
    Recording, RecordingMetadata, ReplayConfig, ReplayEngine, ReplayError, compare_results,
    compare_steps, export_recording, import_recording, validate_recording,
};
use tessera_runtime::{Executor, ExecutorConfig, FailurePolicy};

/// What a command printed and whether it succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Text for stdout
    pub output: String,
    /// Exit successfully
    pub ok: bool,
}

impl Outcome {
    fn new(output: impl Into<String>, ok: bool) -> Self {
        Self {
            output: output.into(),
            ok,
        }
    }
}

/// Options for `tessera run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Id factory seed
    pub seed: String,
    /// Run clock start
    pub start_time_ms: i64,
    /// Run clock advance per step
    pub tick_ms: u64,
    /// Keep going after failures
    pub continue_on_failure: bool,
    /// Where to write a recording
    pub record: Option<String>,
    /// Recording tags
    pub tags: Vec<String>,
    /// Recording description
    pub description: Option<String>,
}

impl RunOptions {
    fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            failure_policy: if self.continue_on_failure {
                FailurePolicy::ContinueOnFailure
            } else {
                FailurePolicy::StopOnFailure
            },
            step_tick_ms: self.tick_ms,
            ..ExecutorConfig::default()
        }
    }
}

fn read(path: &str) -> Result<String> {
    fs::read_to_string(Path::new(path)).wrap_err_with(|| format!("failed to read {path}"))
}

fn load_recording(path: &str) -> Result<Recording> {
    import_recording(&read(path)?).wrap_err_with(|| format!("failed to import {path}"))
}

/// Execute a plan file with the builtin handlers
pub async fn run(plan_path: &str, options: &RunOptions) -> Result<Outcome> {
    let plan = Plan::from_json(&read(plan_path)?)?;
    let registry = builtin_registry()?;
    let config = options.executor_config();

    let result = match &options.record {
        Some(out) => {
            let engine = ReplayEngine::new(ReplayConfig {
                executor: config,
                ..ReplayConfig::default()
            });
            let mut metadata =
                RecordingMetadata::new().with_created_at(SystemClock::new().now_iso());
            if let Some(description) = &options.description {
                metadata = metadata.with_description(description.clone());
            }
            for tag in &options.tags {
                metadata = metadata.with_tag(tag.clone());
            }
            let recording = engine
                .record(
                    &plan,
                    &registry,
                    &options.seed,
                    options.start_time_ms,
                    Some(metadata),
                )
                .await?;
            fs::write(out, export_recording(&recording)?)
                .wrap_err_with(|| format!("failed to write {out}"))?;
            recording.result
        }
        None => {
            let ctx = RunContext::deterministic(options.seed.clone(), options.start_time_ms);
            Executor::new(config).execute(&plan, &registry, &ctx).await?
        }
    };

    let ok = result.is_success();
    Ok(Outcome::new(serde_json::to_string_pretty(&result)?, ok))
}

/// Re-execute a recording; fails on any divergence
pub async fn replay(recording_path: &str) -> Result<Outcome> {
    let recording = load_recording(recording_path)?;
    let registry = builtin_registry()?;
    let report = match ReplayEngine::default().replay(&recording, &registry).await {
        Ok(report) => report,
        Err(err @ ReplayError::IntegrityViolation { .. }) => {
            return Ok(Outcome::new(err.to_string(), false));
        }
        Err(err) => return Err(err.into()),
    };

    let mut lines = vec![format!(
        "replayed {} -> {}",
        report.result.run_id, report.result.status
    )];
    lines.extend(report.differences.iter().map(ToString::to_string));
    lines.extend(report.step_differences.iter().map(ToString::to_string));
    lines.push(if report.is_match() {
        format!("match {}", report.result.hash)
    } else {
        format!(
            "diverged: recorded {} replayed {}",
            recording.result.hash, report.result.hash
        )
    });
    Ok(Outcome::new(lines.join("\n"), report.is_match()))
}

/// Check a recording's integrity hash
pub fn verify(recording_path: &str) -> Result<Outcome> {
    let recording = load_recording(recording_path)?;
    if validate_recording(&recording) {
        let hash = recording.hash.unwrap_or_default();
        Ok(Outcome::new(format!("ok {hash}"), true))
    } else {
        let computed = recording.compute_hash()?;
        Ok(Outcome::new(
            format!(
                "invalid: recorded {} computed {computed}",
                recording.hash.as_deref().unwrap_or("<none>")
            ),
            false,
        ))
    }
}

/// Compare the results of two recordings
pub fn diff(left_path: &str, right_path: &str) -> Result<Outcome> {
    let left = load_recording(left_path)?;
    let right = load_recording(right_path)?;
    let mut differences = compare_results(&left.result, &right.result);
    differences.extend(compare_steps(&left.result, &right.result));
    if differences.is_empty() {
        return Ok(Outcome::new("no differences", true));
    }
    let lines: Vec<String> = differences.iter().map(ToString::to_string).collect();
    Ok(Outcome::new(lines.join("\n"), false))
}

/// Canonical hash of a JSON document
pub fn hash(path: &str) -> Result<Outcome> {
    let value: Value = serde_json::from_str(&read(path)?)
        .map_err(|e| eyre!("{path} is not JSON: {e}"))?;
    Ok(Outcome::new(canonical_hash(&value)?, true))
}
