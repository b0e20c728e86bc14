//! Time sources for tessera runs.
//!
//! A run reads time only through a [`Clock`]. The deterministic clock moves
//! when told to and never consults the wall clock, so two runs built from
//! the same starting instant observe identical timestamps.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current instant for a run
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;

    /// RFC 3339 UTC timestamp with millisecond precision
    fn now_iso(&self) -> String {
        format_iso(self.now_ms())
    }

    /// Move the clock forward. A no-op for clocks that track real time.
    fn advance(&self, ms: u64);
}

/// Render epoch milliseconds as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// Instants chrono cannot represent fall back to `"<ms>ms"`.
#[must_use]
pub fn format_iso(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms).map_or_else(
        || format!("{ms}ms"),
        |dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Clock fixed at a starting instant that only moves via [`Clock::advance`]
pub struct DeterministicClock {
    start_ms: i64,
    current_ms: AtomicI64,
}

impl DeterministicClock {
    /// Create a clock frozen at `start_ms`
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            start_ms,
            current_ms: AtomicI64::new(start_ms),
        }
    }

    /// Instant the clock was created at
    #[must_use]
    pub const fn start_ms(&self) -> i64 {
        self.start_ms
    }

    /// Milliseconds advanced since creation
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        self.now_ms() - self.start_ms
    }
}

impl Clock for DeterministicClock {
    fn now_ms(&self) -> i64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    fn advance(&self, ms: u64) {
        let step = i64::try_from(ms).unwrap_or(i64::MAX);
        // fetch_update never fails with a closure that always returns Some
        let _ = self
            .current_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(step))
            });
    }
}

impl fmt::Debug for DeterministicClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeterministicClock")
            .field("start_ms", &self.start_ms)
            .field("now_ms", &self.now_ms())
            .finish()
    }
}

/// Wall-clock time. Only for metadata outside deterministic runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a system clock
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn advance(&self, _ms: u64) {}
}
