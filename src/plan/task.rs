//! Tasks - units of work queued into a task group
//!
//! - `Call`: invoke a bound operation with a (possibly late-bound) argument
//! - `Annotate`: marker recording an `info` annotation in plan order
//! - `Custom`: ad-hoc async closure
//!
//! Error transforms come from the annotation pending when a real task is
//! queued, so they are fixed before anything runs.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::binding::Arg;
use crate::context::Operation;
use crate::error::OperationError;

/// Boxed body of a custom task
pub type CustomFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value, OperationError>> + Send>;

/// Transform applied to an operation's error before it fails the plan
#[derive(Clone)]
pub enum ErrorTransform {
    /// Replace the message, keeping the original as the cause
    Wrap(String),
    /// Arbitrary mapping to a new error
    Map(Arc<dyn Fn(OperationError) -> OperationError + Send + Sync>),
}

impl ErrorTransform {
    pub fn apply(&self, error: OperationError) -> OperationError {
        match self {
            ErrorTransform::Wrap(message) => OperationError::new(message.clone()).with_cause(error),
            ErrorTransform::Map(f) => f(error),
        }
    }
}

impl fmt::Debug for ErrorTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorTransform::Wrap(message) => f.debug_tuple("Wrap").field(message).finish(),
            ErrorTransform::Map(_) => f.write_str("Map(<fn>)"),
        }
    }
}

/// Per-call annotation set by `info`
///
/// Applies to the next real task queued: `name` renames its result slot,
/// `error` transforms its failure.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub name: Option<String>,
    pub error: Option<ErrorTransform>,
}

impl Annotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the next result under `name`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wrap the next failure with `message`
    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(ErrorTransform::Wrap(message.into()));
        self
    }

    /// Replace the next failure with `f(original)`
    pub fn map_error<F>(mut self, f: F) -> Self
    where
        F: Fn(OperationError) -> OperationError + Send + Sync + 'static,
    {
        self.error = Some(ErrorTransform::Map(Arc::new(f)));
        self
    }

    /// Merge a later annotation into this one; later fields win
    pub fn merge(mut self, later: Annotation) -> Self {
        if later.name.is_some() {
            self.name = later.name;
        }
        if later.error.is_some() {
            self.error = later.error;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.error.is_none()
    }
}

/// Invocation of a bound operation
pub struct CallTask {
    /// Result name (annotation name, else bound name)
    pub name: Arc<str>,
    /// Bound operation name
    pub operation_name: Arc<str>,
    /// Reserved slot index under `name`
    pub slot: usize,
    pub operation: Arc<dyn Operation>,
    pub arg: Arg,
    pub on_error: Option<ErrorTransform>,
}

/// Ad-hoc async closure
pub struct CustomTask {
    pub name: Arc<str>,
    pub slot: usize,
    pub run: CustomFn,
    pub on_error: Option<ErrorTransform>,
}

/// Unit of work in a task group
pub enum Task {
    Call(CallTask),
    Annotate(Annotation),
    Custom(CustomTask),
}

impl Task {
    /// Annotation markers are not real tasks
    pub fn is_real(&self) -> bool {
        !matches!(self, Task::Annotate(_))
    }

    /// Result name for real tasks
    pub fn name(&self) -> Option<&str> {
        match self {
            Task::Call(call) => Some(&call.name),
            Task::Custom(custom) => Some(&custom.name),
            Task::Annotate(_) => None,
        }
    }

    /// Reserved slot for real tasks
    pub fn slot(&self) -> Option<usize> {
        match self {
            Task::Call(call) => Some(call.slot),
            Task::Custom(custom) => Some(custom.slot),
            Task::Annotate(_) => None,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Call(call) => f
                .debug_struct("Call")
                .field("name", &call.name)
                .field("operation", &call.operation_name)
                .field("slot", &call.slot)
                .field("arg", &call.arg)
                .field("on_error", &call.on_error)
                .finish(),
            Task::Annotate(annotation) => f.debug_tuple("Annotate").field(annotation).finish(),
            Task::Custom(custom) => f
                .debug_struct("Custom")
                .field("name", &custom.name)
                .field("slot", &custom.slot)
                .field("on_error", &custom.on_error)
                .finish(),
        }
    }
}
