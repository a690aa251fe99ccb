//! Centralized constants for the fluent builder
//!
//! Reserved member names, default result names and environment variables in
//! one place.

// ═══════════════════════════════════════════════════════════════
// Builder Member Names
// ═══════════════════════════════════════════════════════════════

/// Names of builder members; a context operation may not shadow them
pub const RESERVED_NAMES: &[&str] = &[
    "with", "go", "info", "series", "parallel", "custom", "call", "self",
];

/// Prefix repeated in front of a colliding operation name until it is unique
pub const DEFAULT_RESERVED_PREFIX: &str = "_";

/// Result name of custom tasks
pub const CUSTOM_TASK_NAME: &str = "custom";

/// Result name of the context's callable itself
pub const SELF_NAME: &str = "self";

// ═══════════════════════════════════════════════════════════════
// Deferred Expressions
// ═══════════════════════════════════════════════════════════════

/// Deepest nesting a deferred expression may have: parentheses, unary
/// operators and chained binary operators each count one level
pub const MAX_EXPRESSION_DEPTH: usize = 128;

// ═══════════════════════════════════════════════════════════════
// Environment Variables
// ═══════════════════════════════════════════════════════════════

/// Print colored progress lines while running (`1`/`true`/`yes`/`on`)
pub const ENV_DEBUG: &str = "FLUID_DEBUG";

/// Record execution events into the event log
pub const ENV_RECORD_EVENTS: &str = "FLUID_RECORD_EVENTS";

/// Prefix used when binding reserved operation names
pub const ENV_RESERVED_PREFIX: &str = "FLUID_RESERVED_PREFIX";

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════
