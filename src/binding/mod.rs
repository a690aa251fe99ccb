//! Binding Module - late-bound task arguments
//!
//! - `arg`: the options argument of a queued task (`Arg`, `Field`, `ObjectArg`)
//! - `expr`: deferred expressions (`Deferred`) over the results map
//! - `path`: field/index segments shared by expressions and result lookups
//! - `resolve`: run-time resolution of an `Arg` against a results snapshot
//!
//! Data flow:
//! ```text
//! call("op", deferred("op[0] + 1"))  →  Arg::Deferred (queue time, unevaluated)
//!                          ↓
//!                  task starts (run time)
//!                          ↓
//!          resolve(arg, target, &store.snapshot())
//!                          ↓
//!                  options Value → Operation::call
//! ```

mod arg;
mod expr;
pub mod path;
mod resolve;

// Re-export public types
pub use arg::{Arg, ComputeFn, Field, ObjectArg};
pub use expr::{
    deferred, BinaryOp, Deferred, DeferredError, EvalError, Expr, ParseError, UnaryOp,
};
pub use resolve::resolve;
