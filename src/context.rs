//! Context - named sets of bound operations
//!
//! An [`Operation`] takes one options value and completes asynchronously with
//! a value or an [`OperationError`]. A [`Context`] names a set of operations and
//! may carry the callable itself, which the builder exposes as `self`.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OperationError;
use crate::util::constants::{DEFAULT_RESERVED_PREFIX, RESERVED_NAMES};

/// Asynchronous operation bound into a builder
///
/// # Example
/// ```rust,ignore
/// struct Echo;
///
/// #[async_trait]
/// impl Operation for Echo {
///     async fn call(&self, options: Value) -> Result<Value, OperationError> {
///         Ok(options)
///     }
/// }
/// ```
#[async_trait]
pub trait Operation: Send + Sync {
    /// Run the operation with its options argument
    async fn call(&self, options: Value) -> Result<Value, OperationError>;
}

/// Operation backed by an async closure
pub struct FnOperation<F> {
    f: F,
}

impl<F> FnOperation<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync,
        Fut: Future<Output = Result<Value, OperationError>> + Send,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, OperationError>> + Send,
{
    async fn call(&self, options: Value) -> Result<Value, OperationError> {
        (self.f)(options).await
    }
}

/// Operation backed by a synchronous closure
pub struct SyncOperation<F> {
    f: F,
}

impl<F> SyncOperation<F> {
    pub fn new(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, OperationError> + Send + Sync,
    {
        Self { f }
    }
}

#[async_trait]
impl<F> Operation for SyncOperation<F>
where
    F: Fn(Value) -> Result<Value, OperationError> + Send + Sync,
{
    async fn call(&self, options: Value) -> Result<Value, OperationError> {
        (self.f)(options)
    }
}

/// Named operations plus an optional callable bound as `self`
///
/// Names keep declaration order; defining a name twice replaces the first
/// operation.
#[derive(Clone, Default)]
pub struct Context {
    operations: Vec<(Arc<str>, Arc<dyn Operation>)>,
    callable: Option<Arc<dyn Operation>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose only member is the callable itself
    pub fn callable(op: impl Operation + 'static) -> Self {
        Self::new().with_callable(op)
    }

    /// Set the callable bound as `self`
    pub fn with_callable(mut self, op: impl Operation + 'static) -> Self {
        self.callable = Some(Arc::new(op));
        self
    }

    /// Add a named operation
    pub fn operation(self, name: impl AsRef<str>, op: impl Operation + 'static) -> Self {
        self.shared(name, Arc::new(op))
    }

    /// Add an operation that is already shared
    pub fn shared(mut self, name: impl AsRef<str>, op: Arc<dyn Operation>) -> Self {
        let name = name.as_ref();
        match self.operations.iter_mut().find(|(n, _)| &**n == name) {
            Some((_, existing)) => *existing = op,
            None => self.operations.push((Arc::from(name), op)),
        }
        self
    }

    /// Add an async closure as a named operation
    pub fn function<F, Fut>(self, name: impl AsRef<str>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, OperationError>> + Send + 'static,
    {
        self.operation(name, FnOperation::new(f))
    }

    /// Add a synchronous closure as a named operation
    pub fn sync_function<F>(self, name: impl AsRef<str>, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, OperationError> + Send + Sync + 'static,
    {
        self.operation(name, SyncOperation::new(f))
    }

    /// Operation names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|(n, _)| &**n)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Operation>> {
        self.operations
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, op)| op)
    }

    /// The callable bound as `self`, if any
    pub fn callable_op(&self) -> Option<&Arc<dyn Operation>> {
        self.callable.as_ref()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.callable.is_none()
    }

    pub(crate) fn into_parts(self) -> (Vec<(Arc<str>, Arc<dyn Operation>)>, Option<Arc<dyn Operation>>) {
        (self.operations, self.callable)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("operations", &self.names().collect::<Vec<_>>())
            .field("callable", &self.callable.is_some())
            .finish()
    }
}

/// Name under which an operation is bound into the builder
///
/// Reserved member names get `prefix` prepended until the result is neither
/// reserved nor `taken` by another operation of the same context:
/// `go` → `_go`, or `__go` when the context also declares `_go`.
pub fn binding_name(name: &str, prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    let prefix = if prefix.is_empty() {
        DEFAULT_RESERVED_PREFIX
    } else {
        prefix
    };

    let mut bound = name.to_string();
    if !RESERVED_NAMES.contains(&name) {
        return bound;
    }
    while RESERVED_NAMES.contains(&bound.as_str()) || taken(&bound) {
        bound.insert_str(0, prefix);
    }
    bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fn_operation_runs_closure() {
        let op = FnOperation::new(|v: Value| async move { Ok(json!({"echo": v})) });
        assert_eq!(op.call(json!(1)).await.unwrap(), json!({"echo": 1}));
    }

    #[tokio::test]
    async fn sync_operation_propagates_error() {
        let op = SyncOperation::new(|_| Err(OperationError::new("error")));
        assert_eq!(op.call(Value::Null).await.unwrap_err().message, "error");
    }

    #[test]
    fn context_keeps_declaration_order_and_replaces_duplicates() {
        let ctx = Context::new()
            .sync_function("b", |_| Ok(json!(1)))
            .sync_function("a", |_| Ok(json!(2)))
            .sync_function("b", |_| Ok(json!(3)));
        assert_eq!(ctx.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(ctx.len(), 2);
        assert!(ctx.get("a").is_some());
        assert!(ctx.get("z").is_none());
    }

    #[test]
    fn callable_only_context_is_not_empty() {
        let ctx = Context::callable(SyncOperation::new(|v| Ok(v)));
        assert_eq!(ctx.len(), 0);
        assert!(!ctx.is_empty());
        assert!(ctx.callable_op().is_some());
        assert!(Context::new().is_empty());
    }

    #[test]
    fn reserved_names_are_prefixed() {
        let free = |_: &str| false;
        assert_eq!(binding_name("go", "_", free), "_go");
        assert_eq!(binding_name("self", "_", free), "_self");
        assert_eq!(binding_name("method", "_", free), "method");
        assert_eq!(binding_name("with", "$", free), "$with");
        assert_eq!(binding_name("info", "", free), "_info");
    }

    #[test]
    fn prefixed_name_skips_declared_names() {
        let declared = ["_go", "__go"];
        let taken = |n: &str| declared.contains(&n);
        assert_eq!(binding_name("go", "_", taken), "___go");
        // Unreserved names are never renamed, even when declared twice
        assert_eq!(binding_name("_go", "_", taken), "_go");
    }

    #[test]
    fn context_debug_lists_names() {
        let ctx = Context::new().sync_function("m", |v| Ok(v));
        let debug = format!("{:?}", ctx);
        assert!(debug.contains("\"m\""));
        assert!(debug.contains("callable: false"));
    }
}
