//! Event Module - execution audit trail
//!
//! Key types:
//! - `Event`: Envelope with id + timestamp + kind
//! - `EventKind`: plan, group and task level variants
//! - `EventLog`: Thread-safe, append-only log
//! - `EventEmitter`: Trait the executor emits through
//! - `NoopEmitter`: No-op emitter used when events are not recorded

mod emitter;
mod log;

// Re-export all public types
pub use emitter::{EventEmitter, NoopEmitter};
pub use log::{Event, EventKind, EventLog};
