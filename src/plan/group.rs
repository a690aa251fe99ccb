//! TaskGroup - ordered tasks sharing one flow mode

use serde::{Deserialize, Serialize};

use super::task::Task;

/// How the tasks of a group are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    /// One at a time, stop at the first failure
    #[default]
    Series,
    /// All at once, fail with the first error observed
    Parallel,
}

impl FlowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowMode::Series => "series",
            FlowMode::Parallel => "parallel",
        }
    }
}

impl std::fmt::Display for FlowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered tasks run under one [`FlowMode`]
#[derive(Debug, Default)]
pub struct TaskGroup {
    pub mode: FlowMode,
    pub tasks: Vec<Task>,
    /// Tasks that are not annotation markers
    real_tasks: usize,
}

impl TaskGroup {
    pub fn new(mode: FlowMode) -> Self {
        Self {
            mode,
            tasks: Vec::new(),
            real_tasks: 0,
        }
    }

    pub fn push(&mut self, task: Task) {
        if task.is_real() {
            self.real_tasks += 1;
        }
        self.tasks.push(task);
    }

    pub fn real_task_count(&self) -> usize {
        self.real_tasks
    }

    /// True when no real task was queued (markers may be present)
    pub fn is_empty(&self) -> bool {
        self.real_tasks == 0
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}
