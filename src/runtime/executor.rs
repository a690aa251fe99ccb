//! Executor - runs task groups in order (series or parallel)
//!
//! - Groups run strictly one after another; the first failing group stops
//!   the plan.
//! - Series groups await each task in place.
//! - Parallel groups spawn every task on a JoinSet before awaiting any. On the
//!   first failure the remaining tasks are detached and keep running; their
//!   outcomes are not surfaced.
//!
//! Each task resolves its argument against the results snapshot taken when it
//! starts, then writes into the slot reserved for it at queue time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use colored::Colorize;
use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::binding;
use crate::error::{FluidError, OperationError, PlanFailure};
use crate::event::{EventEmitter, EventKind};
use crate::plan::{Annotation, CallTask, CustomTask, ErrorTransform, FlowMode, Task, TaskGroup};
use crate::store::{ResultStore, Results};

/// Runs a finalized plan against one result store
pub struct Executor {
    store: ResultStore,
    emitter: Arc<dyn EventEmitter>,
    debug: bool,
}

impl Executor {
    pub fn new(store: ResultStore, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            store,
            emitter,
            debug: false,
        }
    }

    /// Print colored progress lines while running
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Run all groups, returning the final results or the first failure
    #[instrument(skip_all, fields(groups = groups.len()))]
    pub async fn run(&self, groups: Vec<TaskGroup>) -> Result<Results, PlanFailure> {
        let plan_start = Instant::now();
        let total_tasks: usize = groups.iter().map(TaskGroup::real_task_count).sum();
        info!(tasks = total_tasks, "Starting plan execution");

        self.emitter.emit(EventKind::PlanStarted {
            group_count: groups.len(),
            task_count: total_tasks,
        });

        if self.debug {
            println!(
                "{} Executing {} task group(s) with {} task(s)...",
                "→".cyan(),
                groups.len(),
                total_tasks
            );
        }

        let shared = Arc::new(TaskContext {
            store: self.store.clone(),
            emitter: Arc::clone(&self.emitter),
            debug: self.debug,
            total: total_tasks,
            completed: AtomicUsize::new(0),
        });

        for (index, group) in groups.into_iter().enumerate() {
            if let Err(error) = self.run_group(&shared, index, group).await {
                return Err(self.fail(error));
            }
        }

        let results = self.store.snapshot();
        self.emitter.emit(EventKind::PlanCompleted {
            results: Arc::new(results.to_value()),
            total_duration_ms: plan_start.elapsed().as_millis() as u64,
        });
        info!(
            duration_ms = plan_start.elapsed().as_millis() as u64,
            "Plan completed"
        );

        if self.debug {
            println!("{} Done!", "✓".green());
        }

        Ok(results)
    }

    #[instrument(skip(self, shared, group), fields(mode = %group.mode, tasks = group.real_task_count()))]
    async fn run_group(
        &self,
        shared: &Arc<TaskContext>,
        index: usize,
        group: TaskGroup,
    ) -> Result<(), FluidError> {
        let group_start = Instant::now();
        self.emitter.emit(EventKind::GroupStarted {
            index,
            mode: group.mode,
            task_count: group.real_task_count(),
        });

        if self.debug {
            println!(
                "  {} {} task(s) in {}",
                format!("[group {}]", index + 1).cyan(),
                group.real_task_count(),
                group.mode.as_str().bold()
            );
        }

        match group.mode {
            FlowMode::Series => {
                for task in group.tasks {
                    TaskContext::run_guarded(Arc::clone(shared), task).await?;
                }
            }
            FlowMode::Parallel => {
                let mut join_set = JoinSet::new();
                for task in group.tasks {
                    match task {
                        // Markers carry no work; no need to spawn them
                        Task::Annotate(annotation) => shared.annotate(&annotation),
                        task => {
                            join_set.spawn(TaskContext::run_guarded(Arc::clone(shared), task));
                        }
                    }
                }

                while let Some(joined) = join_set.join_next().await {
                    let outcome = joined.map_err(|e| FluidError::TaskPanicked {
                        name: format!("group {}", index),
                        reason: e.to_string(),
                    });
                    if let Err(error) = outcome.and_then(|result| result) {
                        // Siblings already started run to completion unobserved
                        join_set.detach_all();
                        return Err(error);
                    }
                }
            }
        }

        self.emitter.emit(EventKind::GroupCompleted {
            index,
            duration_ms: group_start.elapsed().as_millis() as u64,
        });
        debug!(index, "group completed");
        Ok(())
    }

    fn fail(&self, error: FluidError) -> PlanFailure {
        warn!(code = error.code(), error = %error, "Plan failed");
        self.emitter.emit(EventKind::PlanFailed {
            error: error.to_string(),
            failed_task: error.task_name().map(Arc::from),
        });

        if self.debug {
            println!("{} {}", "✗ Failed:".red(), error);
        }

        PlanFailure::new(error, self.store.snapshot())
    }
}

/// State shared by every task of one run
struct TaskContext {
    store: ResultStore,
    emitter: Arc<dyn EventEmitter>,
    debug: bool,
    total: usize,
    completed: AtomicUsize,
}

impl TaskContext {
    /// Run a task, reporting a panic as `TaskPanicked`
    async fn run_guarded(self: Arc<Self>, task: Task) -> Result<(), FluidError> {
        let name = task.name().unwrap_or_default().to_string();
        AssertUnwindSafe(self.run(task))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(FluidError::TaskPanicked {
                    name,
                    reason: panic_message(panic),
                })
            })
    }

    async fn run(&self, task: Task) -> Result<(), FluidError> {
        match task {
            Task::Annotate(annotation) => {
                self.annotate(&annotation);
                Ok(())
            }
            Task::Call(call) => self.run_call(call).await,
            Task::Custom(custom) => self.run_custom(custom).await,
        }
    }

    fn annotate(&self, annotation: &Annotation) {
        debug!(name = ?annotation.name, "annotation applied");
        self.emitter.emit(EventKind::AnnotationApplied {
            name: annotation.name.clone(),
            has_error_transform: annotation.error.is_some(),
        });
    }

    async fn run_call(&self, call: CallTask) -> Result<(), FluidError> {
        let CallTask {
            name,
            operation_name,
            slot,
            operation,
            arg,
            on_error,
        } = call;
        let started = self.start(&name, slot);

        let options = match binding::resolve(&arg, &name, &self.store.snapshot()) {
            Ok(options) => options,
            Err(error) => return Err(self.failed(&name, slot, error, started)),
        };
        debug!(task = %name, operation = %operation_name, slot, options = %options, "calling operation");

        let outcome = operation.call(options).await;
        self.finish(&name, slot, outcome, on_error.as_ref(), started)
    }

    async fn run_custom(&self, custom: CustomTask) -> Result<(), FluidError> {
        let CustomTask {
            name,
            slot,
            run,
            on_error,
        } = custom;
        let started = self.start(&name, slot);
        let outcome = run().await;
        self.finish(&name, slot, outcome, on_error.as_ref(), started)
    }

    fn start(&self, name: &Arc<str>, slot: usize) -> Instant {
        debug!(task = %name, slot, "task started");
        self.emitter.emit(EventKind::TaskStarted {
            task: Arc::clone(name),
            slot,
        });
        Instant::now()
    }

    fn finish(
        &self,
        name: &Arc<str>,
        slot: usize,
        outcome: Result<Value, OperationError>,
        on_error: Option<&ErrorTransform>,
        started: Instant,
    ) -> Result<(), FluidError> {
        let value = match outcome {
            Ok(value) => value,
            Err(error) => {
                let error = match on_error {
                    Some(transform) => transform.apply(error),
                    None => error,
                };
                let error = FluidError::OperationFailed {
                    name: name.to_string(),
                    source: error,
                };
                return Err(self.failed(name, slot, error, started));
            }
        };

        let output = Arc::new(value.clone());
        if let Err(error) = self.store.assign(name, slot, value) {
            return Err(self.failed(name, slot, error, started));
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.emitter.emit(EventKind::TaskCompleted {
            task: Arc::clone(name),
            slot,
            output,
            duration_ms,
        });
        debug!(task = %name, slot, duration_ms, "task completed");
        self.progress(name, slot, None, started);
        Ok(())
    }

    fn failed(&self, name: &Arc<str>, slot: usize, error: FluidError, started: Instant) -> FluidError {
        let duration_ms = started.elapsed().as_millis() as u64;
        self.emitter.emit(EventKind::TaskFailed {
            task: Arc::clone(name),
            slot,
            error: error.to_string(),
            duration_ms,
        });
        warn!(task = %name, slot, error = %error, "task failed");
        self.progress(name, slot, Some(&error), started);
        error
    }

    fn progress(&self, name: &str, slot: usize, error: Option<&FluidError>, started: Instant) {
        if !self.debug {
            return;
        }

        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let counter = format!("[{}/{}]", completed, self.total);
        let duration = format!("({:.1}s)", started.elapsed().as_secs_f32()).dimmed();
        let label = format!("{}#{}", name, slot);

        match error {
            None => println!("    {} {} {} {}", counter.green(), label, "✓".green(), duration),
            Some(error) => {
                println!("    {} {} {} {}", counter.red(), label, "✗".red(), duration);
                println!("        {} {}", "Error:".red(), error);
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{deferred, Arg};
    use crate::context::{FnOperation, Operation, SyncOperation};
    use crate::event::{EventLog, NoopEmitter};
    use crate::plan::{Plan, Task};
    use serde_json::json;
    use std::time::Duration;

    fn call(store: &ResultStore, name: &str, op: Arc<dyn Operation>, arg: Arg) -> Task {
        Task::Call(CallTask {
            name: Arc::from(name),
            operation_name: Arc::from(name),
            slot: store.reserve(name),
            operation: op,
            arg,
            on_error: None,
        })
    }

    fn echo() -> Arc<dyn Operation> {
        Arc::new(SyncOperation::new(|v| Ok(v)))
    }

    fn sleepy() -> Arc<dyn Operation> {
        Arc::new(FnOperation::new(|v: Value| async move {
            let ms = v.as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(v)
        }))
    }

    fn executor(store: &ResultStore) -> Executor {
        Executor::new(store.clone(), Arc::new(NoopEmitter))
    }

    #[tokio::test]
    async fn series_group_runs_in_order() {
        let store = ResultStore::new();
        let mut plan = Plan::new();
        for i in 1..=3 {
            plan.push(call(&store, "method", echo(), Arg::from(i)));
        }

        let results = executor(&store).run(plan.finalize()).await.unwrap();
        assert_eq!(results["method"], json!([1, 2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_results_follow_declaration_order() {
        let store = ResultStore::new();
        let mut plan = Plan::new();
        plan.switch(FlowMode::Parallel);
        for ms in [60, 40, 20] {
            plan.push(call(&store, "method", sleepy(), Arg::from(ms)));
        }

        let results = executor(&store).run(plan.finalize()).await.unwrap();
        assert_eq!(results["method"], json!([60, 40, 20]));
    }

    #[tokio::test]
    async fn deferred_arg_sees_previous_result() {
        let store = ResultStore::new();
        let mut plan = Plan::new();
        plan.push(call(&store, "method", echo(), Arg::from(1)));
        plan.push(call(&store, "method", echo(), deferred("method[0] + 1").into()));

        let results = executor(&store).run(plan.finalize()).await.unwrap();
        assert_eq!(results["method"], json!([1, 2]));
    }

    #[tokio::test]
    async fn failure_stops_series_and_keeps_partial() {
        let store = ResultStore::new();
        let failing: Arc<dyn Operation> =
            Arc::new(SyncOperation::new(|_| Err(OperationError::new("error"))));
        let mut plan = Plan::new();
        plan.push(call(&store, "method", echo(), Arg::from(1)));
        plan.push(call(&store, "errorMethod", failing, Arg::none()));
        plan.push(call(&store, "method", echo(), Arg::from(2)));

        let failure = executor(&store).run(plan.finalize()).await.unwrap_err();
        assert_eq!(failure.operation_error().unwrap().message, "error");
        assert_eq!(failure.partial["method"], json!([1, null]));
        assert_eq!(failure.partial["errorMethod"], Value::Null);
    }

    #[tokio::test]
    async fn error_transform_is_applied() {
        let store = ResultStore::new();
        let failing: Arc<dyn Operation> =
            Arc::new(SyncOperation::new(|_| Err(OperationError::new("error"))));
        let mut plan = Plan::new();
        plan.push(Task::Call(CallTask {
            name: Arc::from("errorMethod"),
            operation_name: Arc::from("errorMethod"),
            slot: store.reserve("errorMethod"),
            operation: failing,
            arg: Arg::none(),
            on_error: Some(ErrorTransform::Wrap("wrapped error".into())),
        }));

        let failure = executor(&store).run(plan.finalize()).await.unwrap_err();
        let error = failure.operation_error().unwrap();
        assert_eq!(error.message, "wrapped error");
        assert_eq!(error.cause().unwrap().message, "error");
    }

    #[tokio::test]
    async fn panicking_parallel_task_is_reported() {
        let store = ResultStore::new();
        let panicking: Arc<dyn Operation> =
            Arc::new(SyncOperation::new(|_| -> Result<Value, OperationError> {
                panic!("kaboom")
            }));
        let mut plan = Plan::new();
        plan.switch(FlowMode::Parallel);
        plan.push(call(&store, "boom", panicking, Arg::none()));

        let failure = executor(&store).run(plan.finalize()).await.unwrap_err();
        match failure.error {
            FluidError::TaskPanicked { name, reason } => {
                assert_eq!(name, "boom");
                assert_eq!(reason, "kaboom");
            }
            other => panic!("expected TaskPanicked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn events_cover_plan_groups_and_tasks() {
        let store = ResultStore::new();
        let log = EventLog::new();
        let mut plan = Plan::new();
        plan.push(Task::Annotate(Annotation::new().name("first")));
        plan.push(call(&store, "first", echo(), Arg::from(1)));
        plan.switch(FlowMode::Parallel);
        plan.push(call(&store, "other", echo(), Arg::from(2)));

        Executor::new(store.clone(), Arc::new(log.clone()))
            .run(plan.finalize())
            .await
            .unwrap();

        assert_eq!(log.count(|k| matches!(k, EventKind::TaskStarted { .. })), 2);
        assert_eq!(log.count(|k| matches!(k, EventKind::TaskCompleted { .. })), 2);
        assert_eq!(log.count(|k| matches!(k, EventKind::GroupStarted { .. })), 2);
        assert_eq!(log.count(|k| matches!(k, EventKind::AnnotationApplied { .. })), 1);
        assert_eq!(log.count(|k| matches!(k, EventKind::PlanCompleted { .. })), 1);
    }

    #[tokio::test]
    async fn custom_task_result_is_stored() {
        let store = ResultStore::new();
        let mut plan = Plan::new();
        plan.push(Task::Custom(CustomTask {
            name: Arc::from("custom"),
            slot: store.reserve("custom"),
            run: Box::new(|| async { Ok(json!("custom")) }.boxed()),
            on_error: None,
        }));

        let results = executor(&store).run(plan.finalize()).await.unwrap();
        assert_eq!(results["custom"], json!("custom"));
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
