//! tessera Runtime
//!
//! Deterministic plan execution: a single in-order pass over the steps,
//! two failure policies, observation hooks and content-hashed results.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod executor;
pub mod result;

pub use executor::{ExecutionError, Executor, ExecutorConfig, FailurePolicy};
pub use result::{
    ErrorCode, LogEntry, LogLevel, RunResult, RunStatus, StepError, StepResult, run_hash,
};
pub use tessera_core::RunContext;
pub use tessera_plan::StepStatus;
