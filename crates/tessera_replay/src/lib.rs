//! tessera replay engine
//!
//! Hashed recordings of completed runs, deterministic re-execution and
//! field-level comparison of original and replayed results.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod engine;
pub mod recording;
pub mod store;

pub use diff::{COMPARED_PATHS, ReplayDifference, compare_results, compare_steps};
pub use engine::{
    ReplayConfig, ReplayContext, ReplayEngine, ReplayError, ReplayOverrides, ReplayReport,
    create_replay_context,
};
pub use recording::{
    RECORDING_VERSION, REQUIRED_FIELDS, Recording, RecordingError, RecordingMetadata,
    create_recording, export_recording, import_recording, validate_recording,
};
pub use store::{
    InMemoryRecordingStore, RecordingQuery, RecordingSummary, StoreError, filter_recordings,
    summarize_recording,
};
