//! EventEmitter Trait - abstraction for event emission
//!
//! The executor emits through `Arc<dyn EventEmitter>`: the builder's
//! `EventLog` when events are recorded, `NoopEmitter` otherwise.

use super::log::{EventKind, EventLog};

/// Trait for emitting events during plan execution
pub trait EventEmitter: Send + Sync {
    /// Emit an event and return its ID
    fn emit(&self, kind: EventKind) -> u64;
}

impl EventEmitter for EventLog {
    fn emit(&self, kind: EventKind) -> u64 {
        EventLog::emit(self, kind)
    }
}

/// No-op emitter (zero allocation, always returns 0)
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl EventEmitter for NoopEmitter {
    fn emit(&self, _kind: EventKind) -> u64 {
        0
    }
}
