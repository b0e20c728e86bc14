//! Builtin handlers.
//!
//! Small, dependency-free handlers useful for smoke-testing plans from the
//! command line and for exercising executor behaviour.

use crate::handler::{Handler, HandlerError};
use crate::registry::{AdapterRegistry, RegistryError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{RunContext, canonical};

/// Returns its input unchanged
#[derive(Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    fn kind(&self) -> &str {
        "echo"
    }

    async fn execute(&self, input: &Value, _ctx: &RunContext) -> Result<Value, HandlerError> {
        Ok(canonical::to_value(input)?)
    }
}

/// Joins strings.
///
/// Accepts an array of strings, or `{"parts": [...], "separator": ","}`.
#[derive(Debug, Default)]
pub struct ConcatHandler;

#[async_trait]
impl Handler for ConcatHandler {
    fn kind(&self) -> &str {
        "concat"
    }

    async fn execute(&self, input: &Value, _ctx: &RunContext) -> Result<Value, HandlerError> {
        let (parts, separator) = match input {
            Value::Array(parts) => (parts, ""),
            Value::Object(map) => {
                let parts = map
                    .get("parts")
                    .and_then(Value::as_array)
                    .ok_or("concat: 'parts' must be an array")?;
                let separator = map.get("separator").and_then(Value::as_str).unwrap_or("");
                (parts, separator)
            }
            _ => return Err("concat: expected an array or an object with 'parts'".into()),
        };

        let strings = parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                part.as_str().ok_or_else(|| {
                    HandlerError::new("concat: every part must be a string")
                        .with_context(json!({ "index": i }))
                })
            })
            .collect::<Result<Vec<&str>, HandlerError>>()?;
        Ok(Value::String(strings.join(separator)))
    }
}

/// Length of a string (in chars), array or object
#[derive(Debug, Default)]
pub struct LengthHandler;

#[async_trait]
impl Handler for LengthHandler {
    fn kind(&self) -> &str {
        "length"
    }

    async fn execute(&self, input: &Value, _ctx: &RunContext) -> Result<Value, HandlerError> {
        let len = match input {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            other => {
                return Err(HandlerError::new("length: input has no length")
                    .with_context(json!({ "type": type_name(other) })));
            }
        };
        Ok(canonical::to_value(&len)?)
    }
}

/// Always fails, with `input.message` (or an empty message) and `input.context`
#[derive(Debug, Default)]
pub struct FailHandler;

#[async_trait]
impl Handler for FailHandler {
    fn kind(&self) -> &str {
        "fail"
    }

    async fn execute(&self, input: &Value, _ctx: &RunContext) -> Result<Value, HandlerError> {
        let message = input.get("message").and_then(Value::as_str).unwrap_or("");
        let mut err = HandlerError::new(message);
        if let Some(context) = input.get("context") {
            err = err.with_context(context.clone());
        }
        Err(err)
    }
}

/// Sleeps for `input.ms` milliseconds of real time, then echoes the input
#[derive(Debug, Default)]
pub struct DelayHandler;

#[async_trait]
impl Handler for DelayHandler {
    fn kind(&self) -> &str {
        "delay"
    }

    async fn execute(&self, input: &Value, _ctx: &RunContext) -> Result<Value, HandlerError> {
        let ms = input
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or("delay: 'ms' must be a non-negative integer")?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(canonical::to_value(input)?)
    }
}

#[derive(Serialize)]
struct Stamp<'a> {
    at: String,
    id: String,
    input: &'a Value,
}

/// Stamps the input with the run clock and a fresh id from the run's factory
#[derive(Debug, Default)]
pub struct StampHandler;

#[async_trait]
impl Handler for StampHandler {
    fn kind(&self) -> &str {
        "stamp"
    }

    async fn execute(&self, input: &Value, ctx: &RunContext) -> Result<Value, HandlerError> {
        let stamp = Stamp {
            at: ctx.now_iso(),
            id: ctx.next_id(),
            input,
        };
        Ok(canonical::to_value(&stamp)?)
    }
}

/// Register every builtin handler
///
/// # Errors
///
/// Returns error if one of the builtin kinds is already registered
pub fn register_builtins(registry: &mut AdapterRegistry) -> Result<(), RegistryError> {
    let handlers: [Arc<dyn Handler>; 6] = [
        Arc::new(EchoHandler),
        Arc::new(ConcatHandler),
        Arc::new(LengthHandler),
        Arc::new(FailHandler),
        Arc::new(DelayHandler),
        Arc::new(StampHandler),
    ];
    for handler in handlers {
        registry.register(handler)?;
    }
    Ok(())
}

/// Fresh registry holding only the builtin handlers
///
/// # Errors
///
/// Never fails in practice; kept fallible to match [`register_builtins`]
pub fn builtin_registry() -> Result<AdapterRegistry, RegistryError> {
    let mut registry = AdapterRegistry::new();
    register_builtins(&mut registry)?;
    Ok(registry)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        RunContext::deterministic("builtin-tests", 0)
    }

    #[tokio::test]
    async fn test_echo() {
        let out = EchoHandler.execute(&json!({"a": [1, 2]}), &ctx()).await.unwrap();
        assert_eq!(out, json!({"a": [1, 2]}));
        let whole = EchoHandler.execute(&json!({"w": 2.0}), &ctx()).await.unwrap();
        assert_eq!(whole, json!({"w": 2}));
    }

    #[tokio::test]
    async fn test_concat_array_and_object() {
        let c = ctx();
        assert_eq!(
            ConcatHandler.execute(&json!(["a", "b", "c"]), &c).await.unwrap(),
            json!("abc")
        );
        assert_eq!(
            ConcatHandler
                .execute(&json!({"parts": ["x", "y"], "separator": "-"}), &c)
                .await
                .unwrap(),
            json!("x-y")
        );
    }

    #[tokio::test]
    async fn test_concat_rejects_non_string_part() {
        let err = ConcatHandler.execute(&json!(["a", 1]), &ctx()).await.unwrap_err();
        assert_eq!(err.context, Some(json!({"index": 1})));
    }

    #[tokio::test]
    async fn test_length() {
        let c = ctx();
        assert_eq!(LengthHandler.execute(&json!("héllo"), &c).await.unwrap(), json!(5));
        assert_eq!(LengthHandler.execute(&json!([1, 2]), &c).await.unwrap(), json!(2));
        assert_eq!(LengthHandler.execute(&json!({"k": 1}), &c).await.unwrap(), json!(1));
        let err = LengthHandler.execute(&json!(3), &c).await.unwrap_err();
        assert_eq!(err.context, Some(json!({"type": "number"})));
    }

    #[tokio::test]
    async fn test_fail_message_and_context() {
        let c = ctx();
        let err = FailHandler
            .execute(&json!({"message": "boom", "context": {"why": 1}}), &c)
            .await
            .unwrap_err();
        assert_eq!(err.message, "boom");
        assert_eq!(err.context, Some(json!({"why": 1})));

        let empty = FailHandler.execute(&json!(null), &c).await.unwrap_err();
        assert_eq!(empty.message, "");
    }

    #[tokio::test]
    async fn test_delay_requires_ms() {
        let c = ctx();
        assert!(DelayHandler.execute(&json!({"ms": 1}), &c).await.is_ok());
        assert!(DelayHandler.execute(&json!({}), &c).await.is_err());
    }

    #[tokio::test]
    async fn test_stamp_is_deterministic() {
        let a = StampHandler.execute(&json!(1), &ctx()).await.unwrap();
        let b = StampHandler.execute(&json!(1), &ctx()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a["at"], json!("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry().unwrap();
        assert_eq!(
            registry.kinds(),
            vec!["echo", "concat", "length", "fail", "delay", "stamp"]
        );
        let mut again = registry.clone();
        assert!(register_builtins(&mut again).is_err());
    }
}
