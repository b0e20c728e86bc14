//! Plan and step model.
//!
//! A plan is an immutable, versioned, ordered list of steps. Declaration
//! order is significant: the executor walks it once and uses it as the
//! tie-break, so dependencies must be declared before their dependents.

use crate::validate::{ValidationError, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tessera_core::{EncodeError, canonical};
use thiserror::Error;

/// Errors reading or writing plan documents
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Document is not a valid plan
    #[error("Invalid plan document: {0}")]
    Parse(String),
    /// Plan failed validation
    #[error("Plan failed validation: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
    /// Plan could not be canonically encoded
    #[error("Plan encoding failed: {0}")]
    Encoding(#[from] EncodeError),
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Lifecycle state of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Not yet resolved
    Pending,
    /// Handler returned an output
    Success,
    /// Handler failed, was missing, crashed or timed out
    Failure,
    /// Not attempted because a dependency did not succeed
    Skipped,
}

impl StepStatus {
    /// Upper-case label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Whether the step has left `Pending`
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the plan
    pub id: String,
    /// Handler kind to dispatch to
    pub kind: String,
    /// Payload passed to the handler
    #[serde(default)]
    pub input: Value,
    /// Ids of steps that must succeed first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Declared upper bound on handler run time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Step {
    /// Step with a null input and no dependencies
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            input: Value::Null,
            depends_on: Vec::new(),
            timeout_ms: None,
        }
    }
}

/// Which side of a step a hook observes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Immediately before the handler runs
    PreStep,
    /// Immediately after the step reaches a terminal status
    PostStep,
}

/// What a hook gets to see
#[derive(Debug, Clone, Copy)]
pub struct HookEvent<'a> {
    /// Pre or post
    pub phase: HookPhase,
    /// Run being executed
    pub run_id: &'a str,
    /// Step being observed
    pub step: &'a Step,
    /// `Pending` before the handler, terminal status after
    pub status: StepStatus,
    /// Output on success
    pub output: Option<&'a Value>,
    /// Error message on failure or skip
    pub error: Option<&'a str>,
}

/// Observation callback. Its outcome never affects the run.
pub type StepHook = Arc<dyn Fn(&HookEvent<'_>) -> Result<(), String> + Send + Sync>;

/// Wrap a closure as a [`StepHook`]
pub fn step_hook<F>(f: F) -> StepHook
where
    F: Fn(&HookEvent<'_>) -> Result<(), String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Optional lifecycle hooks attached to a plan
#[derive(Clone, Default)]
pub struct Hooks {
    /// Runs before each handler
    pub pre_step: Option<StepHook>,
    /// Runs after each step resolves, including skips
    pub post_step: Option<StepHook>,
}

impl Hooks {
    /// Whether no hook is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pre_step.is_none() && self.post_step.is_none()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_step", &self.pre_step.is_some())
            .field("post_step", &self.post_step.is_some())
            .finish()
    }
}

/// Immutable, versioned description of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier
    pub id: String,
    /// Plan version
    pub version: String,
    /// Steps in declaration order
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Lifecycle hooks; not part of the document
    #[serde(skip)]
    pub hooks: Hooks,
}

impl Plan {
    /// Empty plan without hooks
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            steps: Vec::new(),
            hooks: Hooks::default(),
        }
    }

    /// Parse a plan document. Does not validate.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a plan document
    pub fn from_json(text: &str) -> Result<Self, PlanError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse and validate a plan document
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a plan document or the plan is invalid
    pub fn from_json_validated(text: &str) -> Result<Self, PlanError> {
        let plan = Self::from_json(text)?;
        plan.validate().map_err(PlanError::Invalid)?;
        Ok(plan)
    }

    /// Pretty JSON document. Hooks are not serialized.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Canonical encoding of the document, as stored in recordings
    ///
    /// # Errors
    ///
    /// Returns error if the plan cannot be canonically encoded
    pub fn canonical_content(&self) -> Result<String, PlanError> {
        Ok(canonical::encode(self)?)
    }

    /// SHA-256 of the canonical document
    ///
    /// # Errors
    ///
    /// Returns error if the plan cannot be canonically encoded
    pub fn content_hash(&self) -> Result<String, PlanError> {
        Ok(canonical::hash(self)?)
    }

    /// Check structural invariants
    ///
    /// # Errors
    ///
    /// Returns every violation found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        Validator::new().validate(self)
    }

    /// Replace the hooks
    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Step by id
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Step ids in declaration order
    #[must_use]
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Documents compare equal; hooks are ignored
impl PartialEq for Plan {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.version == other.version && self.steps == other.steps
    }
}
