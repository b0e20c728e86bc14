//! tessera Adapter Registry
//!
//! Step handlers and the lookup tables the executor dispatches through.
//! Handlers are the only place side effects or domain logic happen.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builtin;
pub mod handler;
pub mod registry;
pub mod resolver;

pub use builtin::{builtin_registry, register_builtins};
pub use handler::{Handler, HandlerError};
pub use registry::{AdapterRegistry, RegistryError};
pub use resolver::{
    Capability, CapabilityResolver, CapableHandler, ResolveError, ResolveRequest, handler_key,
};
