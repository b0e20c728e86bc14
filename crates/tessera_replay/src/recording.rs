//! Recordings: hashed snapshots of completed runs.
//!
//! The recording hash covers every field but itself, so any edit after
//! creation is detectable with [`validate_recording`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core::{CoreError, EncodeError, canonical};
use tessera_plan::{Plan, PlanError};
use tessera_runtime::{ExecutorConfig, LogEntry, RunResult};
use thiserror::Error;

/// Format version written into new recordings
pub const RECORDING_VERSION: &str = "1.0.0";

/// Fields an imported recording must carry
pub const REQUIRED_FIELDS: [&str; 4] = ["version", "result", "plan_content", "seed"];

/// Errors creating, exporting or importing recordings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordingError {
    /// Text is not a JSON recording document
    #[error("Invalid recording document: {0}")]
    InvalidJson(String),
    /// Document lacks required fields
    #[error("Recording is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    /// Recording could not be canonically encoded
    #[error("Recording encoding failed: {0}")]
    Encoding(#[from] EncodeError),
}

impl From<RecordingError> for CoreError {
    fn from(err: RecordingError) -> Self {
        match err {
            RecordingError::Encoding(e) => CoreError::Encoding(e),
            other => CoreError::ParseError {
                message: other.to_string(),
            },
        }
    }
}

/// Optional descriptive metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    /// Creation time, ISO 8601
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Labels for filtering
    #[serde(default)]
    pub tags: Vec<String>,
    /// Executor settings the run used; replay reuses them when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorConfig>,
}

impl RecordingMetadata {
    /// Empty metadata
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the creation time
    #[must_use]
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Record the executor settings
    #[must_use]
    pub fn with_executor(mut self, config: ExecutorConfig) -> Self {
        self.executor = Some(config);
        self
    }
}

/// Hashed snapshot of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Format version
    pub version: String,
    /// Result of the recorded run
    pub result: RunResult,
    /// Run log
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Canonical plan document the run executed
    pub plan_content: String,
    /// Id factory seed
    pub seed: String,
    /// Run clock start
    #[serde(default)]
    pub start_time_ms: i64,
    /// Descriptive metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecordingMetadata>,
    /// SHA-256 over every other field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Every recording field except the hash
#[derive(Serialize)]
struct HashedRecording<'a> {
    version: &'a str,
    result: &'a RunResult,
    logs: &'a [LogEntry],
    plan_content: &'a str,
    seed: &'a str,
    start_time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a RecordingMetadata>,
}

impl Recording {
    /// Hash of the content, ignoring the stored hash
    ///
    /// # Errors
    ///
    /// Returns error if the content cannot be canonically encoded
    pub fn compute_hash(&self) -> Result<String, EncodeError> {
        canonical::hash(&HashedRecording {
            version: &self.version,
            result: &self.result,
            logs: &self.logs,
            plan_content: &self.plan_content,
            seed: &self.seed,
            start_time_ms: self.start_time_ms,
            metadata: self.metadata.as_ref(),
        })
    }

    /// Parse the recorded plan
    ///
    /// # Errors
    ///
    /// Returns error if `plan_content` is not a plan document
    pub fn plan(&self) -> Result<Plan, PlanError> {
        Plan::from_json(&self.plan_content)
    }

    /// Tags from the metadata
    #[must_use]
    pub fn tags(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.tags.as_slice())
            .unwrap_or_default()
    }

    /// Creation time from the metadata
    #[must_use]
    pub fn created_at(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.created_at.as_deref())
    }
}

/// Wrap a run into a hashed recording
///
/// # Errors
///
/// Returns error if the content cannot be canonically encoded
pub fn create_recording(
    result: RunResult,
    logs: Vec<LogEntry>,
    plan_content: impl Into<String>,
    seed: impl Into<String>,
    start_time_ms: i64,
    metadata: Option<RecordingMetadata>,
) -> Result<Recording, RecordingError> {
    let mut recording = Recording {
        version: RECORDING_VERSION.to_string(),
        result,
        logs,
        plan_content: plan_content.into(),
        seed: seed.into(),
        start_time_ms,
        metadata,
        hash: None,
    };
    recording.hash = Some(recording.compute_hash()?);
    Ok(recording)
}

/// Whether the stored hash is present and matches the content
#[must_use]
pub fn validate_recording(recording: &Recording) -> bool {
    match &recording.hash {
        Some(stored) => recording
            .compute_hash()
            .is_ok_and(|computed| computed == *stored),
        None => false,
    }
}

/// Canonical text of the whole recording, hash included
///
/// # Errors
///
/// Returns error if the recording cannot be canonically encoded
pub fn export_recording(recording: &Recording) -> Result<String, RecordingError> {
    Ok(canonical::encode(recording)?)
}

/// Parse a recording. Does not validate the hash.
///
/// # Errors
///
/// Returns error if the text is not JSON, lacks a required field, or does
/// not have the recording shape
pub fn import_recording(text: &str) -> Result<Recording, RecordingError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| RecordingError::InvalidJson(e.to_string()))?;
    let Value::Object(fields) = &value else {
        return Err(RecordingError::InvalidJson(
            "expected a JSON object".to_string(),
        ));
    };
    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|f| fields.get(*f).is_none_or(Value::is_null))
        .collect();
    if !missing.is_empty() {
        return Err(RecordingError::MissingFields(missing));
    }
    serde_json::from_value(value).map_err(|e| RecordingError::InvalidJson(e.to_string()))
}
