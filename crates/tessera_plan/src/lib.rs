//! tessera Plan
//!
//! Immutable, versioned plans: ordered steps with dependencies, optional
//! observation hooks, a fluent builder and a structural validator.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod plan;
pub mod validate;

pub use builder::{PlanBuilder, StepBuilder};
pub use plan::{
    HookEvent, HookPhase, Hooks, Plan, PlanError, Step, StepHook, StepStatus, step_hook,
};
pub use validate::{ValidationError, Validator};
