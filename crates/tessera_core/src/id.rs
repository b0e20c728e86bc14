//! Identifier sources.
//!
//! Ids inside a run come from an [`IdFactory`]. The seeded factory derives
//! each id from its seed and an instance-local counter, so the same seed
//! always yields the same sequence in the same call order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of identifiers for a run
pub trait IdFactory: Send + Sync {
    /// Produce the next identifier
    fn next_id(&self) -> String;
}

/// Deterministic ids: `{prefix}-{n:06}-{digest}`
///
/// `n` counts from 1. `digest` is the first eight hex characters of a
/// name-based UUID over `"{seed}:{n}"`, which makes ids from different seeds
/// distinguishable even at the same position.
pub struct SeededIdFactory {
    seed: String,
    prefix: String,
    counter: AtomicU64,
}

impl SeededIdFactory {
    /// Create a factory for a seed and prefix
    #[must_use]
    pub fn new(seed: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Seed this factory derives ids from
    #[must_use]
    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Prefix prepended to every id
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of ids issued so far
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Rewind to the start of the sequence
    pub fn reset(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }

    fn id_at(&self, n: u64) -> String {
        let name = format!("{}:{}", self.seed, n);
        let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).simple().to_string();
        format!("{}-{:06}-{}", self.prefix, n, &digest[..8])
    }
}

impl IdFactory for SeededIdFactory {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.id_at(n)
    }
}

impl fmt::Debug for SeededIdFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededIdFactory")
            .field("seed", &self.seed)
            .field("prefix", &self.prefix)
            .field("issued", &self.issued())
            .finish()
    }
}

/// Random ids: `{prefix}-{uuid v4}`. Not reproducible.
#[derive(Debug, Clone)]
pub struct RandomIdFactory {
    prefix: String,
}

impl RandomIdFactory {
    /// Create a factory with a prefix
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl IdFactory for RandomIdFactory {
    fn next_id(&self) -> String {
        format!("{}-{}", self.prefix, Uuid::new_v4())
    }
}
