//! Capability-checked resolution keyed by `module@version`.
//!
//! The resolver sits in front of an [`AdapterRegistry`]: every capable
//! handler is also registered in the inner registry under its
//! `module@version` key, so the executor dispatches to it like any other
//! handler while callers that need stricter matching go through
//! [`CapabilityResolver::resolve`].

use crate::handler::Handler;
use crate::registry::{AdapterRegistry, RegistryError};
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Handler that declares what it can serve
pub trait CapableHandler: Handler {
    /// Module name
    fn module(&self) -> &str;

    /// Module version
    fn version(&self) -> &str;

    /// Payload schemas accepted
    fn schemas(&self) -> &[String];

    /// Request kinds accepted
    fn kinds(&self) -> &[String];

    /// Final handler-specific admission check
    fn can_handle(&self, _request: &ResolveRequest) -> bool {
        true
    }
}

/// Registry key for a module and version
#[must_use]
pub fn handler_key(module: &str, version: &str) -> String {
    format!("{module}@{version}")
}

/// What a caller wants resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Module name
    pub module: String,
    /// Exact module version
    pub version: String,
    /// Payload schema
    pub schema: String,
    /// Request kind
    pub kind: String,
}

impl ResolveRequest {
    /// Create a request
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        version: impl Into<String>,
        schema: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            version: version.into(),
            schema: schema.into(),
            kind: kind.into(),
        }
    }

    /// `module@version` key
    #[must_use]
    pub fn key(&self) -> String {
        handler_key(&self.module, &self.version)
    }
}

/// Which declared capability failed to match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Payload schema
    Schema,
    /// Request kind
    Kind,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema => write!(f, "schema"),
            Self::Kind => write!(f, "kind"),
        }
    }
}

/// Resolution failure. Each check has its own code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No handler registered for the exact `module@version`
    #[error("No handler registered for {key}")]
    NoHandler {
        /// Requested key
        key: String,
    },
    /// Handler exists but does not declare the requested schema or kind
    #[error("Handler {key} does not support {capability} '{requested}'")]
    CapabilityMismatch {
        /// Handler key
        key: String,
        /// Capability that failed
        capability: Capability,
        /// Requested value
        requested: String,
    },
    /// Handler declined the request
    #[error("Handler {key} rejected the request")]
    HandlerReject {
        /// Handler key
        key: String,
    },
}

impl ResolveError {
    /// Stable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoHandler { .. } => "HANDLER_NOT_FOUND",
            Self::CapabilityMismatch { .. } => "CAPABILITY_MISMATCH",
            Self::HandlerReject { .. } => "HANDLER_REJECT",
        }
    }
}

/// Capability-checked front for an [`AdapterRegistry`]
#[derive(Clone, Default)]
pub struct CapabilityResolver {
    registry: AdapterRegistry,
    capable: IndexMap<String, Arc<dyn CapableHandler>>,
}

impl CapabilityResolver {
    /// Resolver over an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver over an existing registry of plain handlers
    #[must_use]
    pub fn with_registry(registry: AdapterRegistry) -> Self {
        Self {
            registry,
            capable: IndexMap::new(),
        }
    }

    /// Register a capable handler under `module@version`
    ///
    /// # Errors
    ///
    /// Returns error if the key is already taken in the inner registry
    pub fn register<H: CapableHandler + 'static>(
        &mut self,
        handler: Arc<H>,
    ) -> Result<(), RegistryError> {
        let key = handler_key(handler.module(), handler.version());
        let plain: Arc<dyn Handler> = handler.clone();
        self.registry.insert(key.clone(), plain)?;
        self.capable.insert(key, handler);
        Ok(())
    }

    /// Resolve a request: exact key, then schema, then kind, then the
    /// handler's own admission check
    ///
    /// # Errors
    ///
    /// Returns the first check that failed
    pub fn resolve(&self, request: &ResolveRequest) -> Result<Arc<dyn CapableHandler>, ResolveError> {
        let key = request.key();
        let handler = self
            .capable
            .get(&key)
            .ok_or_else(|| ResolveError::NoHandler { key: key.clone() })?;

        if !handler.schemas().iter().any(|s| *s == request.schema) {
            return Err(ResolveError::CapabilityMismatch {
                key,
                capability: Capability::Schema,
                requested: request.schema.clone(),
            });
        }
        if !handler.kinds().iter().any(|k| *k == request.kind) {
            return Err(ResolveError::CapabilityMismatch {
                key,
                capability: Capability::Kind,
                requested: request.kind.clone(),
            });
        }
        if !handler.can_handle(request) {
            return Err(ResolveError::HandlerReject { key });
        }

        debug!(key = %key, schema = %request.schema, kind = %request.kind, "resolved handler");
        Ok(Arc::clone(handler))
    }

    /// Inner registry, for handing to the executor
    #[must_use]
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Consume the resolver and keep the registry
    #[must_use]
    pub fn into_registry(self) -> AdapterRegistry {
        self.registry
    }

    /// Registered `module@version` keys
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.capable.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tessera_core::RunContext;

    struct Formatter {
        schemas: Vec<String>,
        kinds: Vec<String>,
        max_len: usize,
    }

    impl Formatter {
        fn new() -> Self {
            Self {
                schemas: vec!["text/v1".to_string()],
                kinds: vec!["format".to_string(), "trim".to_string()],
                max_len: 8,
            }
        }
    }

    #[async_trait]
    impl Handler for Formatter {
        fn kind(&self) -> &str {
            "format"
        }

        async fn execute(&self, input: &Value, _ctx: &RunContext) -> Result<Value, HandlerError> {
            let text = input.as_str().ok_or("expected a string")?;
            Ok(json!(text.trim()))
        }
    }

    impl CapableHandler for Formatter {
        fn module(&self) -> &str {
            "formatter"
        }

        fn version(&self) -> &str {
            "1.2.0"
        }

        fn schemas(&self) -> &[String] {
            &self.schemas
        }

        fn kinds(&self) -> &[String] {
            &self.kinds
        }

        fn can_handle(&self, request: &ResolveRequest) -> bool {
            request.kind.len() <= self.max_len
        }
    }

    fn resolver() -> CapabilityResolver {
        let mut resolver = CapabilityResolver::new();
        resolver.register(Arc::new(Formatter::new())).unwrap();
        resolver
    }

    #[test]
    fn test_resolve_success() {
        let r = resolver();
        let handler = r
            .resolve(&ResolveRequest::new("formatter", "1.2.0", "text/v1", "trim"))
            .unwrap();
        assert_eq!(handler.module(), "formatter");
        assert_eq!(r.keys(), vec!["formatter@1.2.0"]);
    }

    #[test]
    fn test_resolve_version_must_match_exactly() {
        let err = resolver()
            .resolve(&ResolveRequest::new("formatter", "1.2.1", "text/v1", "trim"))
            .err().unwrap();
        assert_eq!(err.code(), "HANDLER_NOT_FOUND");
    }

    #[test]
    fn test_resolve_schema_checked_before_kind() {
        let err = resolver()
            .resolve(&ResolveRequest::new("formatter", "1.2.0", "image/v1", "nope"))
            .err().unwrap();
        assert_eq!(err.code(), "CAPABILITY_MISMATCH");
        assert!(matches!(
            err,
            ResolveError::CapabilityMismatch {
                capability: Capability::Schema,
                ..
            }
        ));
    }

    #[test]
    fn test_resolve_kind_mismatch() {
        let err = resolver()
            .resolve(&ResolveRequest::new("formatter", "1.2.0", "text/v1", "render"))
            .err().unwrap();
        assert!(matches!(
            err,
            ResolveError::CapabilityMismatch {
                capability: Capability::Kind,
                ..
            }
        ));
        assert!(err.to_string().contains("kind 'render'"));
    }

    #[test]
    fn test_resolve_handler_reject() {
        let mut handler = Formatter::new();
        handler.kinds.push("very-long-kind".to_string());
        let mut r = CapabilityResolver::new();
        r.register(Arc::new(handler)).unwrap();
        let err = r
            .resolve(&ResolveRequest::new("formatter", "1.2.0", "text/v1", "very-long-kind"))
            .err().unwrap();
        assert_eq!(err.code(), "HANDLER_REJECT");
    }

    #[test]
    fn test_registered_into_inner_registry() {
        let r = resolver();
        assert!(r.registry().has("formatter@1.2.0"));
        assert!(!r.registry().has("format"));
    }

    #[test]
    fn test_duplicate_module_version_rejected() {
        let mut r = resolver();
        let err = r.register(Arc::new(Formatter::new())).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { .. }));
    }
}
