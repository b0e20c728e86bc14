//! Kind-keyed handler registry.

use crate::handler::Handler;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::CoreError;
use thiserror::Error;
use tracing::debug;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A handler already serves this kind
    #[error("Handler already registered for kind: {kind}")]
    AlreadyRegistered {
        /// Conflicting kind
        kind: String,
    },
    /// Handler declared an empty kind
    #[error("Handler kind must not be empty")]
    EmptyKind,
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyRegistered { kind } => CoreError::AlreadyExists {
                kind: "Handler".to_string(),
                id: kind,
            },
            RegistryError::EmptyKind => CoreError::Validation {
                field: "kind".to_string(),
                reason: "must not be empty".to_string(),
            },
        }
    }
}

/// Lookup table from step kind to handler.
///
/// Built once and shared read-only across runs. Registering a second
/// handler for a kind fails; nothing is silently overridden.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    handlers: IndexMap<String, Arc<dyn Handler>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared kind
    ///
    /// # Errors
    ///
    /// Returns error if the kind is empty or already registered
    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Result<(), RegistryError> {
        let kind = handler.kind().to_string();
        self.insert(kind, handler)
    }

    /// Register a handler under an explicit key instead of its kind
    pub(crate) fn insert(
        &mut self,
        key: String,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RegistryError> {
        if key.is_empty() {
            return Err(RegistryError::EmptyKind);
        }
        if self.handlers.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered { kind: key });
        }
        debug!(kind = %key, "registered handler");
        self.handlers.insert(key, handler);
        Ok(())
    }

    /// Builder-style registration
    ///
    /// # Errors
    ///
    /// Returns error if the kind is empty or already registered
    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Result<Self, RegistryError> {
        self.register(handler)?;
        Ok(self)
    }

    /// Handler for a kind
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(kind).map(Arc::clone)
    }

    /// Check if a kind is registered
    #[must_use]
    pub fn has(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds in registration order
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Number of registered handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
