// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::any::Any;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error};

use super::context::{Status, ThreadContext};
use super::local::LocalStore;
use super::{
    CancellationScope, ClockSource, RunnerOptions, ThreadBody, ThreadOutcome,
    WorkflowThreadPool, YieldResult,
};
use crate::error::{EngineError, Result, WorkflowError, WorkflowResult};

/// Creates workflow threads for one runner. Threads spawned from workflow
/// code are queued until the runner picks them up after its current sweep.
#[derive(Clone)]
pub(crate) struct Spawner {
    pool: WorkflowThreadPool,
    options: RunnerOptions,
    clock: ClockSource,
    pending: Arc<Mutex<Vec<WorkflowThread>>>,
    next_id: Arc<AtomicU64>,
}

impl Spawner {
    pub fn new(pool: WorkflowThreadPool, options: RunnerOptions, clock: ClockSource) -> Self {
        Self {
            pool,
            options,
            clock,
            pending: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    pub fn create_thread(
        &self,
        name: String,
        scope: Arc<CancellationScope>,
        body: ThreadBody,
    ) -> WorkflowThread {
        WorkflowThread {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name,
            context: Arc::new(ThreadContext::new(self.options.capture_stack_traces)),
            scope,
            body: Some(body),
            join: None,
            spawner: self.clone(),
        }
    }

    pub fn take_pending(&self) -> Vec<WorkflowThread> {
        std::mem::take(&mut *self.pending.lock())
    }
}

/// Driver-side handle of a workflow thread.
pub struct WorkflowThread {
    id: u64,
    name: String,
    context: Arc<ThreadContext>,
    scope: Arc<CancellationScope>,
    body: Option<ThreadBody>,
    join: Option<JoinHandle<()>>,
    spawner: Spawner,
}

impl WorkflowThread {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.context.status()
    }

    pub fn is_done(&self) -> bool {
        self.context.is_done()
    }

    pub fn is_started(&self) -> bool {
        self.body.is_none()
    }

    pub fn outcome(&self) -> Option<ThreadOutcome> {
        self.context.outcome()
    }

    pub fn scope(&self) -> &Arc<CancellationScope> {
        &self.scope
    }

    pub fn blocked_until(&self) -> Option<i64> {
        self.context.blocked_until()
    }

    /// Hand the body to an execution thread. The thread parks at its first
    /// yield until the driver runs it.
    pub fn start(&mut self) -> Result<()> {
        let body = self.body.take().ok_or_else(|| {
            EngineError::IllegalState(format!("workflow thread {} already started", self.name))
        })?;
        self.context.set_status(Status::Running);

        let name = self.name.clone();
        let context = Arc::clone(&self.context);
        let scope = Arc::clone(&self.scope);
        let spawner = self.spawner.clone();
        let spawned = self.spawner.pool.spawn(self.name.clone(), move || {
            run_thread(ThreadHandle::new(name, context, scope, spawner), body)
        });
        match spawned {
            Ok(join) => {
                debug!(thread = %self.name, id = self.id, "Workflow thread started");
                self.join = Some(join);
                Ok(())
            }
            Err(e) => {
                self.context.set_status(Status::Created);
                Err(e)
            }
        }
    }

    /// Resume until the thread yields or finishes; returns whether it progressed.
    pub fn run_until_blocked(&self) -> bool {
        self.context.run_until_blocked()
    }

    pub fn cancel(&self, reason: Option<String>) {
        self.scope.cancel(reason);
    }

    /// Destroy the thread and wait for it to finish.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(join) = &self.join {
            if join.thread().id() == std::thread::current().id() {
                return Err(EngineError::SelfStop {
                    name: self.name.clone(),
                });
            }
        }
        if !self.context.destroy(self.spawner.options.stop_timeout) {
            let stack_trace = self.context.stack_trace().unwrap_or_else(|| {
                format!(
                    "blocked on {}",
                    self.context
                        .yield_reason()
                        .unwrap_or_else(|| "unknown".to_string())
                )
            });
            error!(thread = %self.name, "Workflow thread did not stop");
            return Err(EngineError::StuckThread {
                name: self.name.clone(),
                stack_trace,
            });
        }
        if let Some(join) = self.join.take() {
            // Panics are caught inside the thread.
            let _ = join.join();
        }
        Ok(())
    }

    /// Append `name: (state)` and the trimmed stack captured at the last yield.
    pub fn add_stack_trace(&self, out: &mut String) {
        let _ = write!(out, "{}", self.name);
        match (self.context.status(), self.context.yield_reason()) {
            (Status::Yielded, Some(reason)) => {
                let _ = writeln!(out, ": (BLOCKED on {})", reason);
            }
            (status, _) => {
                let _ = writeln!(out, ": ({})", status);
            }
        }
        if let Some(trace) = self.context.stack_trace() {
            let options = self.spawner.options();
            out.push_str(&trim_stack_trace(
                &trace,
                options.stack_trace_omit_top,
                options.stack_trace_omit_bottom,
            ));
        }
    }
}

impl std::fmt::Debug for WorkflowThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Drop `omit_top` frames from the start and `omit_bottom` from the end of
/// a rendered backtrace.
pub(crate) fn trim_stack_trace(trace: &str, omit_top: usize, omit_bottom: usize) -> String {
    let mut frames: Vec<String> = Vec::new();
    for line in trace.lines() {
        let starts_frame = line.trim_start().split_once(':').is_some_and(|(index, _)| {
            !index.is_empty() && index.chars().all(|c| c.is_ascii_digit())
        });
        if starts_frame || frames.is_empty() {
            frames.push(String::new());
        }
        if let Some(frame) = frames.last_mut() {
            frame.push_str(line);
            frame.push('\n');
        }
    }
    let end = frames.len().saturating_sub(omit_bottom);
    frames[omit_top.min(end)..end].concat()
}

fn run_thread(handle: ThreadHandle, body: ThreadBody) {
    let context = Arc::clone(&handle.context);
    let outcome = match context.initial_yield() {
        // Destroyed before it ever ran.
        Err(_) => ThreadOutcome::Stopped,
        Ok(()) => {
            let result = panic::catch_unwind(AssertUnwindSafe(|| body(&handle)));
            classify(result, context.is_destroy_requested(), &handle.root_scope)
        }
    };
    debug!(thread = %handle.name, outcome = ?outcome, "Workflow thread finished");
    // Thread locals go away before the driver sees the thread done.
    drop(handle);
    context.finish(outcome);
}

fn classify(
    result: std::thread::Result<WorkflowResult<()>>,
    destroy_requested: bool,
    scope: &CancellationScope,
) -> ThreadOutcome {
    match result {
        Ok(Ok(())) => ThreadOutcome::Completed,
        Ok(Err(WorkflowError::Destroyed)) if destroy_requested => ThreadOutcome::Stopped,
        Ok(Err(WorkflowError::Cancelled { reason })) if scope.is_cancel_requested() => {
            ThreadOutcome::Cancelled { reason }
        }
        Ok(Err(WorkflowError::Engine(e))) => ThreadOutcome::Aborted(e),
        Ok(Err(e)) => ThreadOutcome::Failed(e),
        Err(payload) => ThreadOutcome::Failed(WorkflowError::Panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// In-thread handle passed to a workflow thread body.
///
/// All blocking in workflow code goes through [`yield_until`](Self::yield_until)
/// or [`yield_with_timeout`](Self::yield_with_timeout).
pub struct ThreadHandle {
    name: String,
    context: Arc<ThreadContext>,
    root_scope: Arc<CancellationScope>,
    current_scope: RefCell<Arc<CancellationScope>>,
    spawner: Spawner,
    locals: LocalStore,
}

impl ThreadHandle {
    fn new(
        name: String,
        context: Arc<ThreadContext>,
        scope: Arc<CancellationScope>,
        spawner: Spawner,
    ) -> Self {
        Self {
            name,
            context,
            root_scope: Arc::clone(&scope),
            current_scope: RefCell::new(scope),
            spawner,
            locals: LocalStore::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn locals(&self) -> &LocalStore {
        &self.locals
    }

    /// Virtual time, never the system clock.
    pub fn current_time_millis(&self) -> i64 {
        self.spawner.now()
    }

    /// Park until `condition` holds. `reason` shows up in stack traces.
    pub fn yield_until<F>(&self, reason: &str, condition: F) -> WorkflowResult<()>
    where
        F: FnMut() -> bool,
    {
        self.context.yield_until(reason, condition)
    }

    /// Park until `condition` holds or `timeout` of virtual time passes.
    /// A zero timeout evaluates the condition once without yielding.
    pub fn yield_with_timeout<F>(
        &self,
        timeout: Duration,
        reason: &str,
        mut condition: F,
    ) -> WorkflowResult<YieldResult>
    where
        F: FnMut() -> bool,
    {
        if timeout.is_zero() {
            return Ok(if condition() {
                YieldResult::ConditionMet
            } else {
                YieldResult::TimedOut
            });
        }

        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let deadline = self.current_time_millis().saturating_add(timeout_ms);
        self.context.set_blocked_until(Some(deadline));

        let mut timed_out = false;
        let result = self.context.yield_until(reason, || {
            timed_out = self.spawner.now() >= deadline;
            timed_out || condition()
        });
        self.context.set_blocked_until(None);
        result?;

        Ok(if timed_out {
            YieldResult::TimedOut
        } else {
            YieldResult::ConditionMet
        })
    }

    /// Scope that blocking calls of this thread currently observe.
    pub fn scope(&self) -> Arc<CancellationScope> {
        Arc::clone(&self.current_scope.borrow())
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.current_scope.borrow().is_cancel_requested()
    }

    /// `Err(Cancelled)` if the current scope was canceled.
    pub fn check_cancelled(&self) -> WorkflowResult<()> {
        let scope = self.current_scope.borrow();
        if scope.is_cancel_requested() {
            return Err(WorkflowError::Cancelled {
                reason: scope.cancellation_reason(),
            });
        }
        Ok(())
    }

    /// Run `f` with `scope` as the current scope.
    pub fn in_scope<R>(
        &self,
        scope: Arc<CancellationScope>,
        f: impl FnOnce(&ThreadHandle) -> R,
    ) -> R {
        let previous = self.current_scope.replace(scope);
        let result = f(self);
        self.current_scope.replace(previous);
        result
    }

    /// Start a new workflow thread in a child of the current scope. It
    /// first runs in the driver's next sweep.
    pub fn new_thread<F>(&self, name: impl Into<String>, body: F) -> WorkflowResult<SpawnedThread>
    where
        F: FnOnce(&ThreadHandle) -> WorkflowResult<()> + Send + 'static,
    {
        let scope = self.scope().new_child(false);
        let mut thread = self
            .spawner
            .create_thread(name.into(), scope, Box::new(body));
        thread.start()?;
        let spawned = SpawnedThread {
            name: thread.name.clone(),
            context: Arc::clone(&thread.context),
            scope: Arc::clone(&thread.scope),
        };
        self.spawner.pending.lock().push(thread);
        Ok(spawned)
    }
}

/// Reference to a thread started from workflow code.
#[derive(Debug, Clone)]
pub struct SpawnedThread {
    name: String,
    context: Arc<ThreadContext>,
    scope: Arc<CancellationScope>,
}

impl SpawnedThread {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_done(&self) -> bool {
        self.context.is_done()
    }

    pub fn outcome(&self) -> Option<ThreadOutcome> {
        self.context.outcome()
    }

    pub fn cancel(&self, reason: Option<String>) {
        self.scope.cancel(reason);
    }

    /// Block the calling thread until this one finishes.
    pub fn join(&self, handle: &ThreadHandle) -> WorkflowResult<ThreadOutcome> {
        handle.yield_until(&format!("join {}", self.name), || self.context.is_done())?;
        self.context
            .outcome()
            .ok_or_else(|| EngineError::Internal(format!("thread {} has no outcome", self.name)).into())
    }
}
