// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Fluid Error Types with Error Codes
//!
//! Error code ranges:
//! - FLUID-000-009: Plan construction errors
//! - FLUID-010-019: Operation errors
//! - FLUID-020-029: Argument resolution errors
//! - FLUID-030-039: Result store errors
//! - FLUID-040-049: Configuration errors
//!
//! Bound operations fail with an [`OperationError`], a plain error value that
//! can carry a message, structured details and a cause chain. The executor
//! wraps it into [`FluidError::OperationFailed`] after applying the task's
//! error annotation.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::Results;

pub type Result<T> = std::result::Result<T, FluidError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum FluidError {
    // ═══════════════════════════════════════════
    // PLAN CONSTRUCTION ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[FLUID-001] Operation '{name}' is not bound to this builder")]
    #[diagnostic(
        code(fluid::unknown_operation),
        help("Bind a context providing it with `with(Context)` before calling it")
    )]
    UnknownOperation { name: String },

    // ═══════════════════════════════════════════
    // OPERATION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[FLUID-010] Operation '{name}' failed: {source}")]
    #[diagnostic(code(fluid::operation_failed))]
    OperationFailed {
        name: String,
        #[source]
        source: OperationError,
    },

    #[error("[FLUID-011] Task '{name}' panicked: {reason}")]
    #[diagnostic(code(fluid::task_panicked))]
    TaskPanicked { name: String, reason: String },

    // ═══════════════════════════════════════════
    // ARGUMENT RESOLUTION ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[FLUID-020] Cannot resolve argument for '{target}': expression `{expression}` failed: {reason}")]
    #[diagnostic(
        code(fluid::deferred_evaluation),
        help("Deferred expressions may only reference results queued before the task")
    )]
    DeferredEvaluation {
        target: String,
        expression: String,
        reason: String,
    },

    #[error("[FLUID-021] Cannot compute argument for '{target}': {reason}")]
    #[diagnostic(code(fluid::computed_argument))]
    ComputedArgument { target: String, reason: String },

    #[error("[FLUID-022] Expression `{expression}` parse error at position {position}: {details}")]
    #[diagnostic(code(fluid::expression_parse))]
    ExpressionParse {
        expression: String,
        position: usize,
        details: String,
    },

    // ═══════════════════════════════════════════
    // RESULT STORE ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[FLUID-030] Result slot {index} of '{name}' was never reserved ({reserved} reserved)")]
    #[diagnostic(code(fluid::slot_out_of_range))]
    SlotOutOfRange {
        name: String,
        index: usize,
        reserved: usize,
    },

    // ═══════════════════════════════════════════
    // CONFIG ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[FLUID-040] Configuration error: {reason}")]
    #[diagnostic(code(fluid::config_error))]
    ConfigError { reason: String },
}

impl FluidError {
    /// Get the error code (e.g., "FLUID-001")
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownOperation { .. } => "FLUID-001",
            Self::OperationFailed { .. } => "FLUID-010",
            Self::TaskPanicked { .. } => "FLUID-011",
            Self::DeferredEvaluation { .. } => "FLUID-020",
            Self::ComputedArgument { .. } => "FLUID-021",
            Self::ExpressionParse { .. } => "FLUID-022",
            Self::SlotOutOfRange { .. } => "FLUID-030",
            Self::ConfigError { .. } => "FLUID-040",
        }
    }

    /// Check if error is recoverable (the operation itself may be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OperationFailed { .. })
    }

    /// The (possibly annotated) error reported by a bound operation
    pub fn operation_error(&self) -> Option<&OperationError> {
        match self {
            Self::OperationFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Result name of the task this error belongs to, if any
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Self::UnknownOperation { name }
            | Self::OperationFailed { name, .. }
            | Self::TaskPanicked { name, .. }
            | Self::SlotOutOfRange { name, .. } => Some(name),
            Self::DeferredEvaluation { target, .. } | Self::ComputedArgument { target, .. } => {
                Some(target)
            }
            Self::ExpressionParse { .. } | Self::ConfigError { .. } => None,
        }
    }
}

impl FixSuggestion for FluidError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            FluidError::UnknownOperation { .. } => {
                Some("Bind a context providing it with `with(Context)` before calling it")
            }
            FluidError::OperationFailed { .. } => None,
            FluidError::TaskPanicked { .. } => Some("Operations should report failures as errors"),
            FluidError::DeferredEvaluation { .. } => {
                Some("Deferred expressions may only reference results queued before the task")
            }
            FluidError::ComputedArgument { .. } => None,
            FluidError::ExpressionParse { .. } => {
                Some("Use paths like `name[0].field`, literals and + - * / % ?? operators")
            }
            FluidError::SlotOutOfRange { .. } => None,
            FluidError::ConfigError { .. } => Some("Check the TOML syntax of the config file"),
        }
    }
}

/// Error value reported by a bound operation
///
/// `cause` is exposed through [`std::error::Error::source`], so annotated
/// errors keep the original failure reachable.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct OperationError {
    /// Human readable message
    pub message: String,
    /// Structured payload reported alongside the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// The error this one wraps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[source]
    pub cause: Option<Box<OperationError>>,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            cause: None,
        }
    }

    /// Attach structured details
    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Wrap another error as this one's cause
    pub fn with_cause(mut self, cause: OperationError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The wrapped error, if any
    pub fn cause(&self) -> Option<&OperationError> {
        self.cause.as_deref()
    }

    /// Innermost error of the cause chain
    pub fn root_cause(&self) -> &OperationError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Failure of a whole plan, returned by `go`
///
/// `partial` holds the results snapshot taken when the failure surfaced:
/// every slot completed before the failing task, with `null` for slots that
/// were queued but never completed.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct PlanFailure {
    #[source]
    pub error: FluidError,
    pub partial: Results,
}

impl PlanFailure {
    pub fn new(error: FluidError, partial: Results) -> Self {
        Self { error, partial }
    }

    /// The (possibly annotated) error reported by the failing operation
    pub fn operation_error(&self) -> Option<&OperationError> {
        self.error.operation_error()
    }
}
