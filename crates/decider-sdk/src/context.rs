// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine state of one workflow execution.
//!
//! The decision tracker, the clock and the completion slots of outstanding
//! activities, child workflows and external requests live together behind
//! one lock. The lock is taken by workflow code for the duration of a
//! command and by the replay decider while it applies events; it is never
//! held while workflow threads are driven.

use std::collections::HashMap;

use decider_protocol::{EventAttributes, HistoryEvent, WorkflowExecution};
use tracing::trace;

use crate::clock::ClockContext;
use crate::error::{Result, WorkflowError, WorkflowResult};
use crate::promise::Promise;
use crate::tracker::DecisionTracker;

pub(crate) type ResultPromise = Promise<WorkflowResult<Vec<u8>>>;

pub(crate) struct PendingActivity {
    pub activity_type: String,
    pub result: ResultPromise,
}

pub(crate) struct PendingChild {
    pub workflow_id: String,
    pub started: Promise<WorkflowExecution>,
    pub result: ResultPromise,
}

pub(crate) struct PendingExternal {
    pub workflow_id: String,
    pub result: Promise<WorkflowResult<()>>,
}

/// Static description of the running execution.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInfo {
    pub domain: String,
    pub execution: WorkflowExecution,
    pub workflow_type: String,
    pub task_list: String,
    pub parent_execution: Option<WorkflowExecution>,
    pub attempt: i32,
}

pub(crate) struct DecisionContext {
    pub info: WorkflowInfo,
    pub tracker: DecisionTracker,
    pub clock: ClockContext,
    /// scheduled event id -> activity
    pub activities: HashMap<i64, PendingActivity>,
    /// initiated event id -> child workflow
    pub children: HashMap<i64, PendingChild>,
    /// initiated event id -> signal
    pub signals: HashMap<i64, PendingExternal>,
    /// initiated event id -> cancellation request
    pub cancel_requests: HashMap<i64, PendingExternal>,
}

impl DecisionContext {
    pub fn new(info: WorkflowInfo) -> Self {
        Self {
            info,
            tracker: DecisionTracker::new(),
            clock: ClockContext::new(),
            activities: HashMap::new(),
            children: HashMap::new(),
            signals: HashMap::new(),
            cancel_requests: HashMap::new(),
        }
    }

    /// Apply an event that is not the direct result of a decision:
    /// completions, timer fires and deliveries.
    pub fn handle_event(&mut self, event: &HistoryEvent) -> Result<()> {
        trace!(event_id = event.event_id, event_type = ?event.event_type(), "Applying event");
        match &event.attributes {
            EventAttributes::ActivityTaskStarted(a) => {
                self.tracker.handle_activity_task_started(a.scheduled_event_id)?;
            }
            EventAttributes::ActivityTaskCompleted(a) => {
                if self.tracker.handle_activity_task_closed(a.scheduled_event_id)? {
                    self.complete_activity(a.scheduled_event_id, |_| Ok(a.result.clone()));
                }
            }
            EventAttributes::ActivityTaskFailed(a) => {
                if self.tracker.handle_activity_task_closed(a.scheduled_event_id)? {
                    self.complete_activity(a.scheduled_event_id, |activity_type| {
                        Err(WorkflowError::ActivityFailed {
                            activity_type,
                            reason: a.reason.clone(),
                            details: a.details.clone(),
                        })
                    });
                }
            }
            EventAttributes::ActivityTaskTimedOut(a) => {
                if self.tracker.handle_activity_task_closed(a.scheduled_event_id)? {
                    self.complete_activity(a.scheduled_event_id, |activity_type| {
                        Err(WorkflowError::ActivityTimedOut {
                            activity_type,
                            timeout_type: a.timeout_type,
                        })
                    });
                }
            }
            EventAttributes::ActivityTaskCanceled(a) => {
                if self.tracker.handle_activity_task_canceled(a.scheduled_event_id)? {
                    self.complete_activity(a.scheduled_event_id, |_| {
                        Err(WorkflowError::Cancelled { reason: None })
                    });
                }
            }
            EventAttributes::TimerFired(a) => {
                self.clock.handle_timer_fired(&mut self.tracker, a)?;
            }
            EventAttributes::StartChildWorkflowExecutionFailed(a) => {
                if self
                    .tracker
                    .handle_start_child_workflow_execution_failed(a.initiated_event_id)?
                {
                    self.complete_child(a.initiated_event_id, |workflow_id| {
                        Err(WorkflowError::ChildWorkflowFailed {
                            workflow_id,
                            reason: format!("failed to start: {}", a.cause),
                            details: Vec::new(),
                        })
                    });
                }
            }
            EventAttributes::ChildWorkflowExecutionStarted(a) => {
                self.tracker.handle_child_workflow_execution_started(a)?;
                if let Some(child) = self.children.get(&a.initiated_event_id) {
                    child.started.complete(a.workflow_execution.clone());
                }
            }
            EventAttributes::ChildWorkflowExecutionCompleted(a) => {
                if self
                    .tracker
                    .handle_child_workflow_execution_closed(a.initiated_event_id)?
                {
                    self.complete_child(a.initiated_event_id, |_| Ok(a.result.clone()));
                }
            }
            EventAttributes::ChildWorkflowExecutionFailed(a) => {
                if self
                    .tracker
                    .handle_child_workflow_execution_closed(a.initiated_event_id)?
                {
                    self.complete_child(a.initiated_event_id, |workflow_id| {
                        Err(WorkflowError::ChildWorkflowFailed {
                            workflow_id,
                            reason: a.reason.clone(),
                            details: a.details.clone(),
                        })
                    });
                }
            }
            EventAttributes::ChildWorkflowExecutionTimedOut(a) => {
                if self
                    .tracker
                    .handle_child_workflow_execution_closed(a.initiated_event_id)?
                {
                    self.complete_child(a.initiated_event_id, |workflow_id| {
                        Err(WorkflowError::ChildWorkflowFailed {
                            workflow_id,
                            reason: format!("timed out ({:?})", a.timeout_type),
                            details: Vec::new(),
                        })
                    });
                }
            }
            EventAttributes::ChildWorkflowExecutionTerminated(a) => {
                if self
                    .tracker
                    .handle_child_workflow_execution_closed(a.initiated_event_id)?
                {
                    self.complete_child(a.initiated_event_id, |workflow_id| {
                        Err(WorkflowError::ChildWorkflowFailed {
                            workflow_id,
                            reason: "terminated".to_string(),
                            details: Vec::new(),
                        })
                    });
                }
            }
            EventAttributes::ChildWorkflowExecutionCanceled(a) => {
                if self
                    .tracker
                    .handle_child_workflow_execution_canceled(a.initiated_event_id)?
                {
                    self.complete_child(a.initiated_event_id, |_| {
                        Err(WorkflowError::Cancelled { reason: None })
                    });
                }
            }
            EventAttributes::ExternalWorkflowExecutionCancelRequested(a) => {
                if self.tracker.handle_external_workflow_cancel_closed(
                    a.initiated_event_id,
                    &a.workflow_execution.workflow_id,
                    false,
                )? {
                    if let Some(request) = self.cancel_requests.remove(&a.initiated_event_id) {
                        request.result.complete(Ok(()));
                    }
                }
            }
            EventAttributes::RequestCancelExternalWorkflowExecutionFailed(a) => {
                if self.tracker.handle_external_workflow_cancel_closed(
                    a.initiated_event_id,
                    &a.workflow_execution.workflow_id,
                    true,
                )? {
                    if let Some(request) = self.cancel_requests.remove(&a.initiated_event_id) {
                        request.result.complete(Err(WorkflowError::ExternalWorkflowFailed {
                            workflow_id: request.workflow_id,
                            cause: a.cause.clone(),
                        }));
                    }
                }
            }
            EventAttributes::ExternalWorkflowExecutionSignaled(a) => {
                self.tracker
                    .handle_signal_external_workflow_execution_closed(a.initiated_event_id)?;
                if let Some(signal) = self.signals.remove(&a.initiated_event_id) {
                    signal.result.complete(Ok(()));
                }
            }
            EventAttributes::SignalExternalWorkflowExecutionFailed(a) => {
                self.tracker
                    .handle_signal_external_workflow_execution_closed(a.initiated_event_id)?;
                if let Some(signal) = self.signals.remove(&a.initiated_event_id) {
                    signal
                        .result
                        .complete(Err(WorkflowError::ExternalWorkflowFailed {
                            workflow_id: signal.workflow_id,
                            cause: a.cause.clone(),
                        }));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Verify a decision event against the command that produced it.
    pub fn handle_decision_event(&mut self, event: &HistoryEvent) -> Result<()> {
        let event_id = event.event_id;
        match &event.attributes {
            EventAttributes::ActivityTaskScheduled(a) => {
                self.tracker.handle_activity_task_scheduled(event_id, a)
            }
            EventAttributes::ActivityTaskCancelRequested(a) => self
                .tracker
                .handle_activity_task_cancel_requested(&a.activity_id),
            EventAttributes::RequestCancelActivityTaskFailed(a) => self
                .tracker
                .handle_request_cancel_activity_task_failed(&a.activity_id),
            EventAttributes::TimerStarted(a) => self.tracker.handle_timer_started(event_id, a),
            EventAttributes::TimerCanceled(a) => {
                self.clock.handle_timer_canceled(&mut self.tracker, a)
            }
            EventAttributes::CancelTimerFailed(a) => {
                self.tracker.handle_cancel_timer_failed(a).map(|_| ())
            }
            EventAttributes::MarkerRecorded(a) => self.tracker.handle_marker_recorded(event_id, a),
            EventAttributes::StartChildWorkflowExecutionInitiated(a) => self
                .tracker
                .handle_start_child_workflow_execution_initiated(event_id, a),
            EventAttributes::RequestCancelExternalWorkflowExecutionInitiated(a) => self
                .tracker
                .handle_request_cancel_external_workflow_execution_initiated(event_id, a),
            EventAttributes::SignalExternalWorkflowExecutionInitiated(_) => self
                .tracker
                .handle_signal_external_workflow_execution_initiated(event_id),
            EventAttributes::UpsertWorkflowSearchAttributes(_) => {
                self.tracker.handle_upsert_search_attributes(event_id)
            }
            EventAttributes::WorkflowExecutionCompleted(_)
            | EventAttributes::WorkflowExecutionFailed(_)
            | EventAttributes::WorkflowExecutionCanceled(_)
            | EventAttributes::WorkflowExecutionContinuedAsNew(_) => {
                self.tracker.handle_workflow_execution_closed(event_id)
            }
            _ => self.handle_event(event),
        }
    }

    fn complete_activity<F>(&mut self, scheduled_event_id: i64, result: F)
    where
        F: FnOnce(String) -> WorkflowResult<Vec<u8>>,
    {
        if let Some(activity) = self.activities.remove(&scheduled_event_id) {
            activity.result.complete(result(activity.activity_type));
        }
    }

    fn complete_child<F>(&mut self, initiated_event_id: i64, result: F)
    where
        F: FnOnce(String) -> WorkflowResult<Vec<u8>>,
    {
        if let Some(child) = self.children.remove(&initiated_event_id) {
            child.result.complete(result(child.workflow_id));
        }
    }
}

impl std::fmt::Debug for DecisionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionContext")
            .field("info", &self.info)
            .field("tracker", &self.tracker)
            .field("clock", &self.clock)
            .finish()
    }
}
