//! Test fixtures and helpers

#![allow(dead_code)]

use std::time::Duration;

use fluid::{Context, OperationError};
use serde_json::{json, Value};

/// Synchronous context
///
/// - `method`, `method2`: echo their options
/// - `errorMethod`: always fails with "error"
/// - callable (`self`): options + 1
pub fn sync_context() -> Context {
    Context::new()
        .sync_function("method", Ok)
        .sync_function("method2", Ok)
        .sync_function("errorMethod", |_| Err(OperationError::new("error")))
        .with_callable(fluid::SyncOperation::new(|v: Value| {
            let n = v.as_i64().ok_or_else(|| OperationError::new("expected a number"))?;
            Ok(json!(n + 1))
        }))
}

/// Asynchronous context: `method` sleeps `options` ms, then echoes them
pub fn async_context() -> Context {
    Context::new().function("method", |options: Value| async move {
        let ms = options.as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(options)
    })
}

/// Context whose operations collide with builder members
pub fn reserved_context() -> Context {
    Context::new()
        .sync_function("go", |_| Ok(json!("go")))
        .sync_function("with", |_| Ok(json!("with")))
        .sync_function("self", |_| Ok(json!("self")))
}
