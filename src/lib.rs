//! Fluid - fluent builder for series/parallel async task groups
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         PUBLIC API                           │
//! │  builder/   Fluent chain (Fluid, fluid)                      │
//! │  context/   Bound operations (Operation, Context)            │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  plan/      Task groups (Plan, TaskGroup, Task, Annotation)  │
//! │  runtime/   Group execution (Executor)                       │
//! │  binding/   Late-bound arguments (Arg, Deferred, resolve)    │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  store/     Named result slots (ResultStore, Results)        │
//! │  event/     Execution audit trail (EventLog, EventKind)      │
//! │  util/      Constants, tracing setup                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`builder`] | Translates chained calls into a plan; `go` runs it |
//! | [`context`] | `Operation` trait, closure adapters, named contexts |
//! | [`plan`] | Groups of tasks with a flow mode, per-call annotations |
//! | [`runtime`] | Series/parallel dispatch on tokio, failure propagation |
//! | [`binding`] | Deferred expressions and argument resolution |
//! | [`store`] | Thread-safe result storage (DashMap) |
//! | [`event`] | Append-only event log |
//! | [`config`] | TOML + environment configuration |
//! | [`error`] | Error types with codes and fix suggestions |
//!
//! ## Example
//!
//! ```rust,ignore
//! use fluid::{deferred, fluid, Annotation, Context};
//! use serde_json::json;
//!
//! let ctx = Context::new().sync_function("method", |v| Ok(v));
//! let results = fluid(ctx)
//!     .call("method", 1)
//!     .call("method", deferred("method[0] + 1"))
//!     .go()
//!     .await?;
//! assert_eq!(results["method"], json!([1, 2]));
//! ```

// ═══════════════════════════════════════════════════════════════
// PUBLIC API - Builder and bound operations
// ═══════════════════════════════════════════════════════════════
pub mod builder;
pub mod context;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Plan structure and execution
// ═══════════════════════════════════════════════════════════════
pub mod binding;
pub mod plan;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Storage, events
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod store;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Builder
pub use builder::{fluid, Fluid};

// Operations
pub use context::{Context, FnOperation, Operation, SyncOperation};

// Plan
pub use plan::{Annotation, ErrorTransform, FlowMode};

// Arguments
pub use binding::{deferred, Arg, Deferred};

// Results
pub use store::{ResultEntry, ResultStore, Results};

// Events
pub use event::{Event, EventEmitter, EventKind, EventLog, NoopEmitter};

// Error types
pub use error::{FixSuggestion, FluidError, OperationError, PlanFailure};

// Configuration
pub use config::{FluidConfig, GoOptions};

// Runtime
pub use runtime::Executor;
