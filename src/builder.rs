//! Fluid - the fluent builder
//!
//! Chained calls only record work: each call reserves its result slot and
//! appends a task to the current group. Nothing runs until [`Fluid::go`].
//!
//! ```rust,ignore
//! let results = fluid(ctx)
//!     .parallel()
//!     .call("fetch", 60)
//!     .call("fetch", 20)
//!     .series()
//!     .info(Annotation::new().name("total").error("summing failed"))
//!     .call("sum", deferred("fetch[0] + fetch[1]"))
//!     .go()
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::binding::Arg;
use crate::config::{FluidConfig, GoOptions};
use crate::context::{binding_name, Context, Operation};
use crate::error::{FluidError, OperationError, PlanFailure};
use crate::event::{EventEmitter, EventKind, EventLog, NoopEmitter};
use crate::plan::{Annotation, CallTask, CustomTask, FlowMode, Plan, Task};
use crate::runtime::Executor;
use crate::store::{ResultStore, Results};
use crate::util::constants::{CUSTOM_TASK_NAME, SELF_NAME};

/// Create a builder over `context` with default configuration
pub fn fluid(context: Context) -> Fluid {
    Fluid::new(context)
}

/// Fluent builder sequencing bound operations into task groups
pub struct Fluid {
    config: FluidConfig,
    /// Bound name → operation (reserved names already prefixed)
    bindings: FxHashMap<Arc<str>, Arc<dyn Operation>>,
    /// Callable exposed as `self`
    callable: Option<Arc<dyn Operation>>,
    plan: Plan,
    store: ResultStore,
    /// Annotation waiting for the next real task
    pending: Option<Annotation>,
    /// First error recorded while building; fails `go` before anything runs
    build_error: Option<FluidError>,
    events: EventLog,
}

impl Fluid {
    pub fn new(context: Context) -> Self {
        Self::with_config(context, FluidConfig::default())
    }

    pub fn with_config(context: Context, config: FluidConfig) -> Self {
        let mut fluid = Self {
            config,
            bindings: FxHashMap::default(),
            callable: None,
            plan: Plan::new(),
            store: ResultStore::new(),
            pending: None,
            build_error: None,
            events: EventLog::new(),
        };
        fluid.bind(context);
        fluid
    }

    fn bind(&mut self, context: Context) {
        let (operations, callable) = context.into_parts();
        let declared: FxHashSet<Arc<str>> =
            operations.iter().map(|(n, _)| Arc::clone(n)).collect();
        for (name, op) in operations {
            let bound = binding_name(&name, &self.config.reserved_prefix, |candidate| {
                declared.contains(candidate)
            });
            if *bound != *name {
                debug!(operation = %name, bound = %bound, "reserved name bound with prefix");
            }
            self.bindings.insert(Arc::from(bound), op);
        }
        if callable.is_some() {
            self.callable = callable;
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Chain building
    // ═══════════════════════════════════════════════════════════════

    /// Bind the operations of another context
    ///
    /// Earlier bindings remain; a name bound again is replaced for calls
    /// queued from now on.
    pub fn with(&mut self, context: Context) -> &mut Self {
        self.bind(context);
        self
    }

    /// Queue a call of the operation bound as `name`
    pub fn call(&mut self, name: &str, arg: impl Into<Arg>) -> &mut Self {
        if name == SELF_NAME {
            return self.call_self(arg);
        }

        match self.bindings.get(name).cloned() {
            Some(operation) => self.queue_call(Arc::from(name), operation, arg.into()),
            None => self.record_unknown(name),
        }
        self
    }

    /// Queue a call of the context's callable itself, stored under `self`
    pub fn call_self(&mut self, arg: impl Into<Arg>) -> &mut Self {
        match self.callable.clone() {
            Some(operation) => self.queue_call(Arc::from(SELF_NAME), operation, arg.into()),
            None => self.record_unknown(SELF_NAME),
        }
        self
    }

    /// Start a group whose tasks run one at a time
    pub fn series(&mut self) -> &mut Self {
        self.plan.switch(FlowMode::Series);
        self
    }

    /// Start a group whose tasks run concurrently
    pub fn parallel(&mut self) -> &mut Self {
        self.plan.switch(FlowMode::Parallel);
        self
    }

    /// Annotate the next real task queued (result name and/or error transform)
    pub fn info(&mut self, annotation: Annotation) -> &mut Self {
        self.pending = Some(match self.pending.take() {
            Some(pending) => pending.merge(annotation.clone()),
            None => annotation.clone(),
        });
        self.plan.push(Task::Annotate(annotation));
        self
    }

    /// Queue an async closure as a task named `custom`
    pub fn custom<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, OperationError>> + Send + 'static,
    {
        let annotation = self.pending.take().unwrap_or_default();
        let name: Arc<str> = Arc::from(annotation.name.as_deref().unwrap_or(CUSTOM_TASK_NAME));
        let slot = self.store.reserve(&name);
        debug!(task = %name, slot, "custom task queued");

        self.plan.push(Task::Custom(CustomTask {
            name,
            slot,
            run: Box::new(move || f().boxed()),
            on_error: annotation.error,
        }));
        self
    }

    fn queue_call(&mut self, operation_name: Arc<str>, operation: Arc<dyn Operation>, arg: Arg) {
        let annotation = self.pending.take().unwrap_or_default();
        let name: Arc<str> = match annotation.name {
            Some(name) => Arc::from(name),
            None => Arc::clone(&operation_name),
        };
        let slot = self.store.reserve(&name);
        debug!(task = %name, operation = %operation_name, slot, late_bound = arg.is_late_bound(), "call queued");

        self.plan.push(Task::Call(CallTask {
            name,
            operation_name,
            slot,
            operation,
            arg,
            on_error: annotation.error,
        }));
    }

    fn record_unknown(&mut self, name: &str) {
        warn!(operation = name, "call to unbound operation");
        // The annotation belonged to the call that could not be queued
        self.pending = None;
        if self.build_error.is_none() {
            self.build_error = Some(FluidError::UnknownOperation {
                name: name.to_string(),
            });
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════

    /// Run the plan with default options
    pub async fn go(&mut self) -> Result<Results, PlanFailure> {
        self.go_with(GoOptions::default()).await
    }

    /// Run the plan, then reset the builder for a fresh plan
    ///
    /// Bindings stay; plan, results, pending annotation and build error are
    /// cleared, so a second `go` without new calls returns empty results.
    pub async fn go_with(&mut self, options: GoOptions) -> Result<Results, PlanFailure> {
        let plan = std::mem::take(&mut self.plan);
        let store = std::mem::take(&mut self.store);
        let build_error = self.build_error.take();
        self.pending = None;
        self.events = EventLog::new();

        let emitter: Arc<dyn EventEmitter> = if self.config.record_events {
            Arc::new(self.events.clone())
        } else {
            Arc::new(NoopEmitter)
        };

        if let Some(error) = build_error {
            warn!(code = error.code(), error = %error, "plan rejected before execution");
            emitter.emit(EventKind::PlanFailed {
                error: error.to_string(),
                failed_task: error.task_name().map(Arc::from),
            });
            return Err(PlanFailure::new(error, store.snapshot()));
        }

        Executor::new(store, emitter)
            .with_debug(options.debug || self.config.debug)
            .run(plan.finalize())
            .await
    }

    // ═══════════════════════════════════════════════════════════════
    // Introspection
    // ═══════════════════════════════════════════════════════════════

    /// Bound operation names, sorted
    pub fn bound_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(|k| &**k).collect();
        names.sort_unstable();
        names
    }

    pub fn is_bound(&self, name: &str) -> bool {
        if name == SELF_NAME {
            return self.callable.is_some();
        }
        self.bindings.contains_key(name)
    }

    /// Groups in the plan being built
    pub fn group_count(&self) -> usize {
        self.plan.group_count()
    }

    /// Real tasks in the plan being built
    pub fn task_count(&self) -> usize {
        self.plan.task_count()
    }

    /// Results reserved so far; `null` until the plan runs
    pub fn reserved(&self) -> Results {
        self.store.snapshot()
    }

    /// Event log of the last run
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn config(&self) -> &FluidConfig {
        &self.config
    }
}

impl std::fmt::Debug for Fluid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fluid")
            .field("bound", &self.bound_names())
            .field("callable", &self.callable.is_some())
            .field("plan", &self.plan)
            .field("pending", &self.pending)
            .field("build_error", &self.build_error)
            .finish()
    }
}
