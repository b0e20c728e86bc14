//! Step handler interface.

use async_trait::async_trait;
use serde_json::Value;
use tessera_core::{EncodeError, RunContext};
use thiserror::Error;

/// Failure raised by a handler.
///
/// The message is carried verbatim into the step result, including an
/// empty message. An error built from an [`EncodeError`] is not a step
/// failure: the executor aborts the run with it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable message
    pub message: String,
    /// Structured detail attached by the handler
    pub context: Option<Value>,
    /// Output had no canonical encoding
    #[source]
    pub encoding: Option<EncodeError>,
}

impl HandlerError {
    /// Error with a message and no context
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            encoding: None,
        }
    }

    /// Attach structured context
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl From<EncodeError> for HandlerError {
    fn from(err: EncodeError) -> Self {
        Self {
            message: format!("output has no canonical encoding: {err}"),
            context: None,
            encoding: Some(err),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Executable unit registered for a step kind.
///
/// Handlers are the only place side effects happen. They receive the run
/// context read-only and must leave the plan, registry and context as they
/// found them.
///
/// Outputs must be built with [`tessera_core::canonical::to_value`], not
/// `json!` or `serde_json::to_value`, which silently turn NaN and the
/// infinities into `null`. Propagating its error with `?` makes the run fail
/// with an encoding error.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Step kind this handler serves
    fn kind(&self) -> &str;

    /// Run the step
    ///
    /// # Errors
    ///
    /// Returns error when the step cannot produce an output
    async fn execute(&self, input: &Value, ctx: &RunContext) -> Result<Value, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handler_error_display_is_message() {
        let err = HandlerError::new("disk full");
        assert_eq!(err.to_string(), "disk full");
        assert!(err.context.is_none());
    }

    #[test]
    fn test_handler_error_empty_message() {
        let err = HandlerError::from("");
        assert_eq!(err.to_string(), "");
    }

    #[test]
    fn test_encode_error_is_marked() {
        let err = HandlerError::from(EncodeError::NonFinite);
        assert_eq!(err.encoding, Some(EncodeError::NonFinite));
        assert!(err.to_string().contains("non-finite"));
        assert!(HandlerError::new("plain").encoding.is_none());
    }

    #[test]
    fn test_handler_error_context() {
        let err = HandlerError::new("bad").with_context(json!({"field": "x"}));
        assert_eq!(err.context, Some(json!({"field": "x"})));
    }
}
