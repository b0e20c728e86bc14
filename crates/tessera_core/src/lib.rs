//! tessera Core Types
//!
//! Pure types and logic shared by every tessera crate: the canonical
//! codec and its SHA-256 fingerprints, the deterministic clock and id
//! sources, and the per-run context handed to step handlers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod context;
pub mod error;
pub mod hash;
pub mod id;
pub mod time;

// Re-exports
pub use canonical::{
    EncodeError, digest, encode, hash as canonical_hash, short_hash, to_value as canonical_value,
};
pub use context::{DEFAULT_RUN_PREFIX, RunContext};
pub use error::{CoreError, CoreResult};
pub use hash::Hash;
pub use id::{IdFactory, RandomIdFactory, SeededIdFactory};
pub use time::{Clock, DeterministicClock, SystemClock, format_iso};
