//! Plan Module - ordered task groups built by the fluent chain
//!
//! Key types:
//! - `Plan`: groups in declaration order, with in-place mode switching
//! - `TaskGroup`/`FlowMode`: tasks dispatched in series or in parallel
//! - `Task`: `Call`, `Annotate` marker or `Custom` closure
//! - `Annotation`/`ErrorTransform`: per-call renaming and error wrapping

mod group;
mod task;

pub use group::{FlowMode, TaskGroup};
pub use task::{Annotation, CallTask, CustomFn, CustomTask, ErrorTransform, Task};

/// Ordered list of task groups
#[derive(Debug, Default)]
pub struct Plan {
    groups: Vec<TaskGroup>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new group in `mode`
    ///
    /// A current group without real tasks is switched in place instead, so
    /// consecutive mode switches never leave empty groups behind.
    pub fn switch(&mut self, mode: FlowMode) {
        match self.groups.last_mut() {
            Some(group) if group.is_empty() => group.mode = mode,
            _ => self.groups.push(TaskGroup::new(mode)),
        }
    }

    /// Current group, creating a default series group if none exists
    pub fn current_mut(&mut self) -> &mut TaskGroup {
        if self.groups.is_empty() {
            self.groups.push(TaskGroup::default());
        }
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    pub fn push(&mut self, task: Task) {
        self.current_mut().push(task);
    }

    pub fn groups(&self) -> &[TaskGroup] {
        &self.groups
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Real tasks across all groups
    pub fn task_count(&self) -> usize {
        self.groups.iter().map(TaskGroup::real_task_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }

    /// Drop a trailing group without real tasks and hand out the groups
    pub fn finalize(mut self) -> Vec<TaskGroup> {
        if self.groups.last().is_some_and(TaskGroup::is_empty) {
            self.groups.pop();
        }
        self.groups
    }
}
