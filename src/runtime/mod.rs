//! Runtime Module - plan execution
//!
//! Contains the runtime execution components:
//! - `executor`: runs task groups in order with series/parallel dispatch
//!
//! This module represents the "how" - runtime execution.
//! For the static structure of a plan, see the `plan` module.

mod executor;

// Re-export public types
pub use executor::Executor;
