//! Per-run context handed to every step handler.

use crate::id::{IdFactory, SeededIdFactory};
use crate::time::{Clock, DeterministicClock};
use std::fmt;
use std::sync::Arc;

/// Prefix used for run ids when none is given
pub const DEFAULT_RUN_PREFIX: &str = "run";

/// Deterministic time and identity sources bound to one execution.
///
/// Created once per execution attempt. Handlers only ever see `&RunContext`;
/// the clock and id factory use interior mutability so reading time or
/// drawing an id never requires exclusive access.
#[derive(Clone)]
pub struct RunContext {
    run_id: String,
    seed: String,
    clock: Arc<dyn Clock>,
    id_factory: Arc<dyn IdFactory>,
}

impl RunContext {
    /// Assemble a context from explicit parts
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        seed: impl Into<String>,
        clock: Arc<dyn Clock>,
        id_factory: Arc<dyn IdFactory>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            seed: seed.into(),
            clock,
            id_factory,
        }
    }

    /// Context with a clock frozen at `start_ms` and ids seeded by `seed`.
    ///
    /// The run id is the first id drawn from the factory.
    #[must_use]
    pub fn deterministic(seed: impl Into<String>, start_ms: i64) -> Self {
        Self::deterministic_with_prefix(seed, start_ms, DEFAULT_RUN_PREFIX)
    }

    /// Same as [`RunContext::deterministic`] with a custom id prefix
    #[must_use]
    pub fn deterministic_with_prefix(
        seed: impl Into<String>,
        start_ms: i64,
        prefix: impl Into<String>,
    ) -> Self {
        let seed = seed.into();
        let clock: Arc<dyn Clock> = Arc::new(DeterministicClock::new(start_ms));
        let id_factory: Arc<dyn IdFactory> = Arc::new(SeededIdFactory::new(seed.clone(), prefix));
        Self::from_sources(seed, clock, id_factory)
    }

    /// Context whose run id is drawn from `id_factory`
    #[must_use]
    pub fn from_sources(
        seed: impl Into<String>,
        clock: Arc<dyn Clock>,
        id_factory: Arc<dyn IdFactory>,
    ) -> Self {
        let run_id = id_factory.next_id();
        Self::new(run_id, seed, clock, id_factory)
    }

    /// Identifier of this run
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Seed the id factory was built from
    #[must_use]
    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Clock for this run
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Id factory for this run
    #[must_use]
    pub fn id_factory(&self) -> &dyn IdFactory {
        self.id_factory.as_ref()
    }

    /// Current run time in epoch milliseconds
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Current run time as an ISO string
    #[must_use]
    pub fn now_iso(&self) -> String {
        self.clock.now_iso()
    }

    /// Draw the next id from the run's factory
    #[must_use]
    pub fn next_id(&self) -> String {
        self.id_factory.next_id()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("seed", &self.seed)
            .field("now_ms", &self.clock.now_ms())
            .finish_non_exhaustive()
    }
}
