//! EventLog - append-only record of one plan execution
//!
//! - Event: envelope with id + timestamp + kind
//! - EventKind: plan, group and task level variants
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::FlowMode;

/// Single event in the execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All possible event types
///
/// Uses Arc<str> for task names to keep cloning cheap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // PLAN LEVEL
    // ═══════════════════════════════════════════
    PlanStarted {
        group_count: usize,
        task_count: usize,
    },
    PlanCompleted {
        results: Arc<Value>,
        total_duration_ms: u64,
    },
    PlanFailed {
        error: String,
        failed_task: Option<Arc<str>>,
    },

    // ═══════════════════════════════════════════
    // GROUP LEVEL
    // ═══════════════════════════════════════════
    GroupStarted {
        index: usize,
        mode: FlowMode,
        task_count: usize,
    },
    GroupCompleted {
        index: usize,
        duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // TASK LEVEL
    // ═══════════════════════════════════════════
    AnnotationApplied {
        name: Option<String>,
        has_error_transform: bool,
    },
    TaskStarted {
        task: Arc<str>,
        slot: usize,
    },
    TaskCompleted {
        task: Arc<str>,
        slot: usize,
        output: Arc<Value>,
        duration_ms: u64,
    },
    TaskFailed {
        task: Arc<str>,
        slot: usize,
        error: String,
        duration_ms: u64,
    },
}

impl EventKind {
    /// Result name if the event is task-related
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::TaskStarted { task, .. }
            | Self::TaskCompleted { task, .. }
            | Self::TaskFailed { task, .. } => Some(task),
            Self::PlanStarted { .. }
            | Self::PlanCompleted { .. }
            | Self::PlanFailed { .. }
            | Self::GroupStarted { .. }
            | Self::GroupCompleted { .. }
            | Self::AnnotationApplied { .. } => None,
        }
    }

    pub fn is_plan_event(&self) -> bool {
        matches!(
            self,
            Self::PlanStarted { .. } | Self::PlanCompleted { .. } | Self::PlanFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
///
/// Clones share the same events.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    /// Create a new event log (call at plan start)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let mut events = self.events.write();
        // Allocated under the lock so ids follow log order
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        events.push(Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    /// Get all events (cloned - use `with_events` for zero-copy access)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds read lock for duration of callback - keep it short.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Events of one result name
    pub fn filter_task(&self, task: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.task() == Some(task))
                .cloned()
                .collect()
        })
    }

    /// Count events matching a predicate (no allocation)
    pub fn count(&self, predicate: impl Fn(&EventKind) -> bool) -> usize {
        self.with_events(|events| events.iter().filter(|e| predicate(&e.kind)).count())
    }

    /// Serialize to JSON for debugging
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}
