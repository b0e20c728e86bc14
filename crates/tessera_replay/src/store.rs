//! In-memory recording store with tag and time filtering.

use crate::recording::{Recording, validate_recording};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_core::{CoreError, IdFactory, SeededIdFactory};
use tessera_runtime::RunStatus;
use thiserror::Error;
use tracing::debug;

/// Seed of the default store id factory
pub const STORE_SEED: &str = "recording-store";

/// Prefix of store-issued recording ids
pub const STORE_PREFIX: &str = "rec";

/// Store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Recording hash is missing or does not match
    #[error("Refusing to store recording with invalid hash")]
    InvalidRecording,
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Validation {
            field: "recording".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Recordings keyed by store-issued id
pub struct InMemoryRecordingStore {
    recordings: RwLock<BTreeMap<String, Recording>>,
    ids: Arc<dyn IdFactory>,
}

impl InMemoryRecordingStore {
    /// Store with deterministic ids
    #[must_use]
    pub fn new() -> Self {
        Self::with_ids(Arc::new(SeededIdFactory::new(STORE_SEED, STORE_PREFIX)))
    }

    /// Store drawing ids from `ids`
    #[must_use]
    pub fn with_ids(ids: Arc<dyn IdFactory>) -> Self {
        Self {
            recordings: RwLock::new(BTreeMap::new()),
            ids,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Recording>> {
        self.recordings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Recording>> {
        self.recordings.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Save a recording and return its id
    ///
    /// # Errors
    ///
    /// Returns error if the recording fails validation
    pub fn save(&self, recording: Recording) -> Result<String, StoreError> {
        if !validate_recording(&recording) {
            return Err(StoreError::InvalidRecording);
        }
        let id = self.ids.next_id();
        debug!(%id, run_id = %recording.result.run_id, "recording saved");
        self.write().insert(id.clone(), recording);
        Ok(id)
    }

    /// Recording by id
    #[must_use]
    pub fn load(&self, id: &str) -> Option<Recording> {
        self.read().get(id).cloned()
    }

    /// Remove a recording; false if it was absent
    pub fn delete(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    /// Whether an id is stored
    #[must_use]
    pub fn exists(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Stored ids, sorted
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of recordings
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Stored recordings matching a query, in id order
    #[must_use]
    pub fn query(&self, query: &RecordingQuery) -> Vec<(String, Recording)> {
        let guard = self.read();
        let mut matched: Vec<(String, Recording)> = guard
            .iter()
            .filter(|(_, r)| query.matches(r))
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect();
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Summaries of every recording, in id order
    #[must_use]
    pub fn summaries(&self) -> Vec<RecordingSummary> {
        self.read()
            .iter()
            .map(|(id, r)| summarize_recording(id, r))
            .collect()
    }
}

impl Default for InMemoryRecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryRecordingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRecordingStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Filter over recordings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingQuery {
    /// Every tag must be present
    pub tags: Vec<String>,
    /// Required run outcome
    pub success: Option<bool>,
    /// `created_at` strictly after this
    pub after: Option<String>,
    /// `created_at` strictly before this
    pub before: Option<String>,
    /// Maximum results
    pub limit: Option<usize>,
}

impl RecordingQuery {
    /// Match everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a tag
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Require an outcome
    #[must_use]
    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// Require creation after a time
    #[must_use]
    pub fn after(mut self, at: impl Into<String>) -> Self {
        self.after = Some(at.into());
        self
    }

    /// Require creation before a time
    #[must_use]
    pub fn before(mut self, at: impl Into<String>) -> Self {
        self.before = Some(at.into());
        self
    }

    /// Cap the result count
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether one recording passes every criterion except `limit`.
    ///
    /// A time bound never matches a recording without `created_at`.
    #[must_use]
    pub fn matches(&self, recording: &Recording) -> bool {
        let tags = recording.tags();
        if !self.tags.iter().all(|t| tags.contains(t)) {
            return false;
        }
        if self
            .success
            .is_some_and(|success| recording.result.is_success() != success)
        {
            return false;
        }
        let created = recording.created_at();
        if self
            .after
            .as_deref()
            .is_some_and(|after| created.is_none_or(|c| c <= after))
        {
            return false;
        }
        !self
            .before
            .as_deref()
            .is_some_and(|before| created.is_none_or(|c| c >= before))
    }
}

/// Recordings matching `query`, in input order
#[must_use]
pub fn filter_recordings<'a>(recordings: &'a [Recording], query: &RecordingQuery) -> Vec<&'a Recording> {
    let matched = recordings.iter().filter(|r| query.matches(r));
    match query.limit {
        Some(limit) => matched.take(limit).collect(),
        None => matched.collect(),
    }
}

/// Listing view of a stored recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSummary {
    /// Store id
    pub id: String,
    /// Recorded run id
    pub run_id: String,
    /// Run outcome
    pub status: RunStatus,
    /// Whether the run succeeded
    pub success: bool,
    /// Steps attempted
    pub steps_executed: usize,
    /// Steps succeeded
    pub steps_succeeded: usize,
    /// Steps failed
    pub steps_failed: usize,
    /// Run hash
    pub hash: String,
    /// Creation time, if recorded
    pub created_at: Option<String>,
    /// Tags
    pub tags: Vec<String>,
}

/// Summarize one recording
#[must_use]
pub fn summarize_recording(id: &str, recording: &Recording) -> RecordingSummary {
    let result = &recording.result;
    RecordingSummary {
        id: id.to_string(),
        run_id: result.run_id.clone(),
        status: result.status,
        success: result.is_success(),
        steps_executed: result.steps_executed(),
        steps_succeeded: result.steps_succeeded(),
        steps_failed: result.steps_failed(),
        hash: result.hash.clone(),
        created_at: recording.created_at().map(str::to_string),
        tags: recording.tags().to_vec(),
    }
}
