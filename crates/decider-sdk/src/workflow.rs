// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! API available to workflow code.
//!
//! Every call goes through the execution's engine state so its effect is
//! recorded as a command and reproduced on replay. Blocking calls take the
//! calling thread's [`ThreadHandle`] and park only through its yield
//! methods; they never block on anything else.
//!
//! The engine state lock is held only for the duration of a single command.
//! Closures passed to [`WorkflowContext::side_effect`] and
//! [`WorkflowContext::mutable_side_effect`] run under that lock and must not
//! call back into the context.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use decider_protocol::{
    ContinueAsNewWorkflowExecutionAttributes, RequestCancelExternalWorkflowExecutionAttributes,
    ScheduleActivityTaskAttributes, SignalExternalWorkflowExecutionAttributes,
    StartChildWorkflowExecutionAttributes, UpsertWorkflowSearchAttributesAttributes,
    WorkflowExecution,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::context::{
    DecisionContext, PendingActivity, PendingChild, PendingExternal, ResultPromise, WorkflowInfo,
};
use crate::error::{EngineError, Result, WorkflowError, WorkflowResult};
use crate::options::{ActivityOptions, ChildWorkflowOptions, duration_to_seconds};
use crate::promise::Promise;
use crate::scheduler::ThreadHandle;

/// Handle to the engine state of one workflow execution.
#[derive(Clone)]
pub struct WorkflowContext {
    inner: Arc<Mutex<DecisionContext>>,
}

impl WorkflowContext {
    pub(crate) fn new(inner: Arc<Mutex<DecisionContext>>) -> Self {
        Self { inner }
    }

    pub fn info(&self) -> WorkflowInfo {
        self.inner.lock().info.clone()
    }

    /// Replay time of the current decision task.
    pub fn current_time_millis(&self) -> i64 {
        self.inner.lock().clock.current_time_millis()
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.inner.lock().clock.current_time()
    }

    /// `true` while workflow code is re-executed from recorded history.
    pub fn is_replaying(&self) -> bool {
        self.inner.lock().clock.is_replaying()
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Start a durable timer. The delay is rounded up to whole seconds; a
    /// zero delay yields a timer that is already fired.
    pub fn new_timer(&self, delay: Duration) -> WorkflowResult<WorkflowTimer> {
        let promise = Promise::new();
        let callback_promise = promise.clone();
        let started_event_id = {
            let mut guard = self.inner.lock();
            let dc = &mut *guard;
            dc.clock.create_timer(
                &mut dc.tracker,
                duration_to_seconds(delay),
                Box::new(move |result| {
                    callback_promise.complete(result);
                }),
            )?
        };
        Ok(WorkflowTimer {
            context: self.clone(),
            started_event_id,
            promise,
        })
    }

    /// Block for `delay` of workflow time.
    pub fn sleep(&self, handle: &ThreadHandle, delay: Duration) -> WorkflowResult<()> {
        self.new_timer(delay)?.wait(handle)
    }

    // ========================================================================
    // Side effects and versioning
    // ========================================================================

    /// Run `func` once and record its result; replay returns the recording.
    pub fn side_effect<F>(&self, func: F) -> WorkflowResult<Vec<u8>>
    where
        F: FnOnce() -> Vec<u8>,
    {
        let mut guard = self.inner.lock();
        let dc = &mut *guard;
        Ok(dc.clock.side_effect(&mut dc.tracker, func)?)
    }

    /// [`side_effect`](Self::side_effect) for serde values.
    pub fn side_effect_json<T, F>(&self, func: F) -> WorkflowResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let mut encode_error = None;
        let data = self.side_effect(|| match serde_json::to_vec(&func()) {
            Ok(data) => data,
            Err(e) => {
                encode_error = Some(e);
                Vec::new()
            }
        })?;
        if let Some(e) = encode_error {
            return Err(e.into());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Side effect recorded only when `func` returns a new value.
    ///
    /// `func` sees the latest recorded value for `id` and returns `None` to
    /// keep it. It is not called while replaying.
    pub fn mutable_side_effect<F>(&self, id: &str, func: F) -> WorkflowResult<Option<Vec<u8>>>
    where
        F: FnOnce(Option<&[u8]>) -> Option<Vec<u8>>,
    {
        let mut guard = self.inner.lock();
        let dc = &mut *guard;
        Ok(dc.clock.mutable_side_effect(&mut dc.tracker, id, func)?)
    }

    /// [`mutable_side_effect`](Self::mutable_side_effect) for serde values.
    pub fn mutable_side_effect_json<T, F>(&self, id: &str, func: F) -> WorkflowResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<&T>) -> Option<T>,
    {
        let mut codec_error = None;
        let data = self.mutable_side_effect(id, |stored| {
            let stored: Option<T> = match stored.map(serde_json::from_slice).transpose() {
                Ok(stored) => stored,
                Err(e) => {
                    codec_error = Some(e);
                    return None;
                }
            };
            let value = func(stored.as_ref())?;
            serde_json::to_vec(&value)
                .map_err(|e| codec_error = Some(e))
                .ok()
        })?;
        if let Some(e) = codec_error {
            return Err(e.into());
        }
        Ok(data
            .map(|data| serde_json::from_slice(&data))
            .transpose()?)
    }

    /// Version of the code path guarded by `change_id`, within
    /// `min_supported..=max_supported`.
    pub fn get_version(
        &self,
        change_id: &str,
        min_supported: i32,
        max_supported: i32,
    ) -> WorkflowResult<i32> {
        let mut guard = self.inner.lock();
        let dc = &mut *guard;
        Ok(dc
            .clock
            .get_version(&mut dc.tracker, change_id, min_supported, max_supported)?)
    }

    // ========================================================================
    // Activities
    // ========================================================================

    /// Schedule an activity and wait for its result.
    ///
    /// Cancelling the calling scope requests cancellation of the activity;
    /// the call then returns once the activity is canceled, or its result
    /// if it completed first.
    pub fn execute_activity(
        &self,
        handle: &ThreadHandle,
        options: ActivityOptions,
        input: Vec<u8>,
    ) -> WorkflowResult<Vec<u8>> {
        handle.check_cancelled()?;
        let promise = ResultPromise::new();
        let scheduled_event_id = {
            let mut guard = self.inner.lock();
            let dc = &mut *guard;
            let activity_id = match options.activity_id.clone() {
                Some(id) => id,
                None => dc.tracker.next_id().to_string(),
            };
            let [schedule_to_close, schedule_to_start, start_to_close, heartbeat] =
                options.timeouts();
            let scheduled_event_id =
                dc.tracker
                    .schedule_activity_task(ScheduleActivityTaskAttributes {
                        activity_id,
                        activity_type: options.activity_type.clone(),
                        domain: options.domain.clone(),
                        task_list: options
                            .task_list
                            .clone()
                            .unwrap_or_else(|| dc.info.task_list.clone()),
                        input,
                        schedule_to_close_timeout_seconds: schedule_to_close,
                        schedule_to_start_timeout_seconds: schedule_to_start,
                        start_to_close_timeout_seconds: start_to_close,
                        heartbeat_timeout_seconds: heartbeat,
                    });
            dc.activities.insert(
                scheduled_event_id,
                PendingActivity {
                    activity_type: options.activity_type.clone(),
                    result: promise.clone(),
                },
            );
            scheduled_event_id
        };
        debug!(activity_type = %options.activity_type, scheduled_event_id, "Activity scheduled");

        let reason = format!("activity {}", options.activity_type);
        self.wait_cancellable(handle, &reason, &promise, |dc, cancel_reason| {
            let cancelled = promise.clone();
            let done = dc.tracker.request_cancel_activity_task(
                scheduled_event_id,
                Some(Box::new(move || {
                    cancelled.complete(Err(WorkflowError::Cancelled {
                        reason: cancel_reason,
                    }));
                })),
            )?;
            if done {
                dc.activities.remove(&scheduled_event_id);
            }
            Ok(())
        })
    }

    /// Run a short activity in the decider instead of scheduling it.
    ///
    /// `func` runs on the workflow thread while the context is locked, so
    /// it must not call back into the context. Its outcome is recorded in a
    /// marker and replay returns it without calling `func` again.
    pub fn execute_local_activity<F>(
        &self,
        handle: &ThreadHandle,
        activity_type: &str,
        input: Vec<u8>,
        func: F,
    ) -> WorkflowResult<Vec<u8>>
    where
        F: FnOnce(Vec<u8>) -> WorkflowResult<Vec<u8>>,
    {
        handle.check_cancelled()?;
        let outcome = {
            let mut guard = self.inner.lock();
            let dc = &mut *guard;
            dc.clock
                .execute_local_activity(&mut dc.tracker, activity_type, || {
                    func(input).map_err(|e| e.to_string())
                })?
        };
        match outcome.err_reason {
            None => Ok(outcome.result),
            Some(reason) => Err(WorkflowError::ActivityFailed {
                activity_type: outcome.activity_type,
                reason,
                details: outcome.err_details,
            }),
        }
    }

    // ========================================================================
    // Child workflows
    // ========================================================================

    /// Start a child workflow. Use the returned handle to wait for its
    /// start or its result.
    pub fn start_child_workflow(
        &self,
        handle: &ThreadHandle,
        options: ChildWorkflowOptions,
        input: Vec<u8>,
    ) -> WorkflowResult<ChildWorkflow> {
        handle.check_cancelled()?;
        let started = Promise::new();
        let result = ResultPromise::new();
        let mut guard = self.inner.lock();
        let dc = &mut *guard;
        let workflow_id = match options.workflow_id.clone() {
            Some(id) => id,
            None => format!(
                "{}-child-{}",
                dc.info.execution.workflow_id,
                dc.tracker.next_id()
            ),
        };
        let (execution_timeout, task_timeout) = options.timeouts();
        let initiated_event_id =
            dc.tracker
                .start_child_workflow_execution(StartChildWorkflowExecutionAttributes {
                    domain: options.domain.unwrap_or_else(|| dc.info.domain.clone()),
                    workflow_id: workflow_id.clone(),
                    workflow_type: options.workflow_type,
                    task_list: options
                        .task_list
                        .unwrap_or_else(|| dc.info.task_list.clone()),
                    input,
                    execution_start_to_close_timeout_seconds: execution_timeout,
                    task_start_to_close_timeout_seconds: task_timeout,
                    control: Vec::new(),
                });
        dc.children.insert(
            initiated_event_id,
            PendingChild {
                workflow_id: workflow_id.clone(),
                started: started.clone(),
                result: result.clone(),
            },
        );
        debug!(workflow_id = %workflow_id, initiated_event_id, "Child workflow initiated");
        Ok(ChildWorkflow {
            context: self.clone(),
            workflow_id,
            initiated_event_id,
            started,
            result,
        })
    }

    /// Start a child workflow and wait for its result.
    pub fn execute_child_workflow(
        &self,
        handle: &ThreadHandle,
        options: ChildWorkflowOptions,
        input: Vec<u8>,
    ) -> WorkflowResult<Vec<u8>> {
        self.start_child_workflow(handle, options, input)?
            .result(handle)
    }

    // ========================================================================
    // External workflows
    // ========================================================================

    /// Deliver a signal to another workflow execution and wait until the
    /// service accepted it.
    pub fn signal_external_workflow(
        &self,
        handle: &ThreadHandle,
        execution: WorkflowExecution,
        signal_name: &str,
        input: Vec<u8>,
    ) -> WorkflowResult<()> {
        handle.check_cancelled()?;
        let promise = Promise::new();
        let initiated_event_id = {
            let mut guard = self.inner.lock();
            let dc = &mut *guard;
            let workflow_id = execution.workflow_id.clone();
            let initiated_event_id = dc.tracker.signal_external_workflow_execution(
                SignalExternalWorkflowExecutionAttributes {
                    domain: dc.info.domain.clone(),
                    execution,
                    signal_name: signal_name.to_string(),
                    input,
                    child_workflow_only: false,
                    control: Vec::new(),
                },
            );
            dc.signals.insert(
                initiated_event_id,
                PendingExternal {
                    workflow_id,
                    result: promise.clone(),
                },
            );
            initiated_event_id
        };

        let reason = format!("signal {}", signal_name);
        self.wait_cancellable(handle, &reason, &promise, |dc, cancel_reason| {
            let cancelled = promise.clone();
            let done = dc.tracker.cancel_signal_external_workflow_execution(
                initiated_event_id,
                Some(Box::new(move || {
                    cancelled.complete(Err(WorkflowError::Cancelled {
                        reason: cancel_reason,
                    }));
                })),
            )?;
            if done {
                dc.signals.remove(&initiated_event_id);
            }
            Ok(())
        })
    }

    /// Request cancellation of another workflow execution and wait until
    /// the request was delivered.
    pub fn cancel_external_workflow(
        &self,
        handle: &ThreadHandle,
        execution: WorkflowExecution,
    ) -> WorkflowResult<()> {
        let promise = Promise::new();
        {
            let mut guard = self.inner.lock();
            let dc = &mut *guard;
            let workflow_id = execution.workflow_id.clone();
            let initiated_event_id = dc.tracker.request_cancel_external_workflow_execution(
                RequestCancelExternalWorkflowExecutionAttributes {
                    domain: dc.info.domain.clone(),
                    execution,
                    child_workflow_only: false,
                    control: Vec::new(),
                },
            );
            dc.cancel_requests.insert(
                initiated_event_id,
                PendingExternal {
                    workflow_id,
                    result: promise.clone(),
                },
            );
        }
        handle.yield_until("cancel external workflow", || promise.is_ready())?;
        take_result(&promise)
    }

    pub fn upsert_search_attributes(
        &self,
        search_attributes: BTreeMap<String, Vec<u8>>,
    ) -> WorkflowResult<()> {
        if search_attributes.is_empty() {
            return Err(EngineError::InvalidArgument("empty search attributes".to_string()).into());
        }
        self.inner
            .lock()
            .tracker
            .upsert_search_attributes(UpsertWorkflowSearchAttributesAttributes {
                search_attributes,
            });
        Ok(())
    }

    // ========================================================================
    // Conditions and completion
    // ========================================================================

    /// Block until `condition` holds. It is re-evaluated whenever the
    /// driver runs the thread.
    pub fn await_condition<F>(&self, handle: &ThreadHandle, condition: F) -> WorkflowResult<()>
    where
        F: FnMut() -> bool,
    {
        handle.yield_until("await condition", condition)
    }

    /// Block until `condition` holds or `timeout` of workflow time passes.
    /// Returns whether the condition was met.
    pub fn await_condition_with_timeout<F>(
        &self,
        handle: &ThreadHandle,
        timeout: Duration,
        condition: F,
    ) -> WorkflowResult<bool>
    where
        F: FnMut() -> bool,
    {
        let result = handle.yield_with_timeout(timeout, "await condition", condition)?;
        Ok(!result.is_timed_out())
    }

    /// Error that, returned from the workflow function, closes this run and
    /// starts a new one of the same type with `input`.
    pub fn continue_as_new(&self, input: Vec<u8>) -> WorkflowError {
        let info = self.info();
        WorkflowError::ContinueAsNew(Box::new(ContinueAsNewWorkflowExecutionAttributes {
            workflow_type: info.workflow_type,
            task_list: info.task_list,
            input,
            execution_start_to_close_timeout_seconds: None,
            task_start_to_close_timeout_seconds: None,
        }))
    }

    /// Wait for `promise`; when the calling scope is canceled first, run
    /// `cancel` under the engine lock and keep waiting for the outcome.
    fn wait_cancellable<T, C>(
        &self,
        handle: &ThreadHandle,
        reason: &str,
        promise: &Promise<WorkflowResult<T>>,
        cancel: C,
    ) -> WorkflowResult<T>
    where
        C: FnOnce(&mut DecisionContext, Option<String>) -> Result<()>,
    {
        let scope = handle.scope();
        handle.yield_until(reason, || promise.is_ready() || scope.is_cancel_requested())?;
        if !promise.is_ready() {
            cancel(&mut self.inner.lock(), scope.cancellation_reason())?;
            handle.yield_until(reason, || promise.is_ready())?;
        }
        take_result(promise)
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext").finish_non_exhaustive()
    }
}

fn take_result<T>(promise: &Promise<WorkflowResult<T>>) -> WorkflowResult<T> {
    promise
        .take()
        .unwrap_or_else(|| Err(EngineError::Internal("promise has no value".to_string()).into()))
}

/// Durable timer created by [`WorkflowContext::new_timer`].
pub struct WorkflowTimer {
    context: WorkflowContext,
    /// `None` for a zero delay timer, which never becomes a command.
    started_event_id: Option<i64>,
    promise: Promise<WorkflowResult<()>>,
}

impl WorkflowTimer {
    pub fn is_ready(&self) -> bool {
        self.promise.is_ready()
    }

    /// Block until the timer fires. Cancelling the calling scope cancels
    /// the timer and returns [`WorkflowError::Cancelled`].
    pub fn wait(&self, handle: &ThreadHandle) -> WorkflowResult<()> {
        let started_event_id = self.started_event_id;
        self.context
            .wait_cancellable(handle, "timer", &self.promise, |dc, reason| {
                if let Some(id) = started_event_id {
                    dc.clock.cancel_timer(&mut dc.tracker, id, reason)?;
                }
                Ok(())
            })
    }

    /// Cancel the timer; a blocked [`wait`](Self::wait) returns
    /// [`WorkflowError::Cancelled`].
    pub fn cancel(&self, reason: Option<String>) -> WorkflowResult<()> {
        if let Some(id) = self.started_event_id {
            let mut guard = self.context.inner.lock();
            let dc = &mut *guard;
            dc.clock.cancel_timer(&mut dc.tracker, id, reason)?;
        }
        Ok(())
    }
}

/// Child workflow started by [`WorkflowContext::start_child_workflow`].
pub struct ChildWorkflow {
    context: WorkflowContext,
    workflow_id: String,
    initiated_event_id: i64,
    started: Promise<WorkflowExecution>,
    result: ResultPromise,
}

impl ChildWorkflow {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Block until the child has started and return its execution.
    pub fn execution(&self, handle: &ThreadHandle) -> WorkflowResult<WorkflowExecution> {
        handle.yield_until("child workflow start", || {
            self.started.is_ready() || self.result.is_ready()
        })?;
        match self.started.get() {
            Some(execution) => Ok(execution),
            None => match self.result.get() {
                Some(Err(e)) => Err(e),
                _ => Err(EngineError::Internal(format!(
                    "child workflow {} closed without starting",
                    self.workflow_id
                ))
                .into()),
            },
        }
    }

    /// Block until the child closes. Cancelling the calling scope requests
    /// cancellation of the child and waits for its outcome.
    pub fn result(&self, handle: &ThreadHandle) -> WorkflowResult<Vec<u8>> {
        let initiated_event_id = self.initiated_event_id;
        let reason = format!("child workflow {}", self.workflow_id);
        let promise = self.result.clone();
        self.context
            .wait_cancellable(handle, &reason, &self.result, |dc, cancel_reason| {
                let done = dc.tracker.request_cancel_child_workflow(
                    initiated_event_id,
                    Some(Box::new(move || {
                        promise.complete(Err(WorkflowError::Cancelled {
                            reason: cancel_reason,
                        }));
                    })),
                )?;
                if done {
                    dc.children.remove(&initiated_event_id);
                }
                Ok(())
            })
    }
}
