// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! History events replayed to a decider.
//!
//! Event ids are assigned by the service, start at 1 and increase by one per
//! event. Events that reference an earlier event (a timer firing, an activity
//! completing) carry that event's id, e.g. `started_event_id`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::WorkflowExecution;

/// One entry of a workflow execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_id: i64,
    /// Service time the event was recorded, in unix milliseconds.
    pub timestamp_ms: i64,
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    pub fn new(event_id: i64, timestamp_ms: i64, attributes: EventAttributes) -> Self {
        Self {
            event_id,
            timestamp_ms,
            attributes,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.attributes.event_type()
    }
}

/// Discriminant of [`EventAttributes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    WorkflowExecutionStarted,
    WorkflowExecutionCancelRequested,
    WorkflowExecutionCompleted,
    WorkflowExecutionFailed,
    WorkflowExecutionCanceled,
    WorkflowExecutionTerminated,
    WorkflowExecutionContinuedAsNew,
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted,
    DecisionTaskFailed,
    DecisionTaskTimedOut,
    ActivityTaskScheduled,
    ActivityTaskStarted,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    ActivityTaskTimedOut,
    ActivityTaskCancelRequested,
    RequestCancelActivityTaskFailed,
    ActivityTaskCanceled,
    TimerStarted,
    TimerFired,
    TimerCanceled,
    CancelTimerFailed,
    MarkerRecorded,
    StartChildWorkflowExecutionInitiated,
    StartChildWorkflowExecutionFailed,
    ChildWorkflowExecutionStarted,
    ChildWorkflowExecutionCompleted,
    ChildWorkflowExecutionFailed,
    ChildWorkflowExecutionCanceled,
    ChildWorkflowExecutionTimedOut,
    ChildWorkflowExecutionTerminated,
    RequestCancelExternalWorkflowExecutionInitiated,
    RequestCancelExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionCancelRequested,
    SignalExternalWorkflowExecutionInitiated,
    SignalExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionSignaled,
    UpsertWorkflowSearchAttributes,
}

impl EventType {
    /// Events recorded as the direct result of a decision. In history they
    /// directly follow the `DecisionTaskCompleted` event of the task that
    /// produced them.
    pub fn is_decision_event(&self) -> bool {
        matches!(
            self,
            EventType::ActivityTaskScheduled
                | EventType::ActivityTaskCancelRequested
                | EventType::RequestCancelActivityTaskFailed
                | EventType::TimerStarted
                | EventType::TimerCanceled
                | EventType::CancelTimerFailed
                | EventType::MarkerRecorded
                | EventType::StartChildWorkflowExecutionInitiated
                | EventType::RequestCancelExternalWorkflowExecutionInitiated
                | EventType::SignalExternalWorkflowExecutionInitiated
                | EventType::UpsertWorkflowSearchAttributes
                | EventType::WorkflowExecutionCompleted
                | EventType::WorkflowExecutionFailed
                | EventType::WorkflowExecutionCanceled
                | EventType::WorkflowExecutionContinuedAsNew
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "attributes")]
pub enum EventAttributes {
    WorkflowExecutionStarted(WorkflowExecutionStartedAttributes),
    WorkflowExecutionCancelRequested(WorkflowExecutionCancelRequestedAttributes),
    WorkflowExecutionCompleted(WorkflowExecutionCompletedAttributes),
    WorkflowExecutionFailed(WorkflowExecutionFailedAttributes),
    WorkflowExecutionCanceled(WorkflowExecutionCanceledAttributes),
    WorkflowExecutionTerminated(WorkflowExecutionTerminatedAttributes),
    WorkflowExecutionContinuedAsNew(WorkflowExecutionContinuedAsNewAttributes),
    DecisionTaskScheduled(DecisionTaskScheduledAttributes),
    DecisionTaskStarted(DecisionTaskStartedAttributes),
    DecisionTaskCompleted(DecisionTaskCompletedAttributes),
    DecisionTaskFailed(DecisionTaskFailedAttributes),
    DecisionTaskTimedOut(DecisionTaskTimedOutAttributes),
    ActivityTaskScheduled(ActivityTaskScheduledAttributes),
    ActivityTaskStarted(ActivityTaskStartedAttributes),
    ActivityTaskCompleted(ActivityTaskCompletedAttributes),
    ActivityTaskFailed(ActivityTaskFailedAttributes),
    ActivityTaskTimedOut(ActivityTaskTimedOutAttributes),
    ActivityTaskCancelRequested(ActivityTaskCancelRequestedAttributes),
    RequestCancelActivityTaskFailed(RequestCancelActivityTaskFailedAttributes),
    ActivityTaskCanceled(ActivityTaskCanceledAttributes),
    TimerStarted(TimerStartedAttributes),
    TimerFired(TimerFiredAttributes),
    TimerCanceled(TimerCanceledAttributes),
    CancelTimerFailed(CancelTimerFailedAttributes),
    MarkerRecorded(MarkerRecordedAttributes),
    StartChildWorkflowExecutionInitiated(StartChildWorkflowExecutionInitiatedAttributes),
    StartChildWorkflowExecutionFailed(StartChildWorkflowExecutionFailedAttributes),
    ChildWorkflowExecutionStarted(ChildWorkflowExecutionStartedAttributes),
    ChildWorkflowExecutionCompleted(ChildWorkflowExecutionCompletedAttributes),
    ChildWorkflowExecutionFailed(ChildWorkflowExecutionFailedAttributes),
    ChildWorkflowExecutionCanceled(ChildWorkflowExecutionCanceledAttributes),
    ChildWorkflowExecutionTimedOut(ChildWorkflowExecutionTimedOutAttributes),
    ChildWorkflowExecutionTerminated(ChildWorkflowExecutionTerminatedAttributes),
    RequestCancelExternalWorkflowExecutionInitiated(
        RequestCancelExternalWorkflowExecutionInitiatedAttributes,
    ),
    RequestCancelExternalWorkflowExecutionFailed(
        RequestCancelExternalWorkflowExecutionFailedAttributes,
    ),
    ExternalWorkflowExecutionCancelRequested(ExternalWorkflowExecutionCancelRequestedAttributes),
    SignalExternalWorkflowExecutionInitiated(SignalExternalWorkflowExecutionInitiatedAttributes),
    SignalExternalWorkflowExecutionFailed(SignalExternalWorkflowExecutionFailedAttributes),
    ExternalWorkflowExecutionSignaled(ExternalWorkflowExecutionSignaledAttributes),
    UpsertWorkflowSearchAttributes(UpsertWorkflowSearchAttributesEventAttributes),
}

impl EventAttributes {
    pub fn event_type(&self) -> EventType {
        use EventAttributes as A;
        match self {
            A::WorkflowExecutionStarted(_) => EventType::WorkflowExecutionStarted,
            A::WorkflowExecutionCancelRequested(_) => EventType::WorkflowExecutionCancelRequested,
            A::WorkflowExecutionCompleted(_) => EventType::WorkflowExecutionCompleted,
            A::WorkflowExecutionFailed(_) => EventType::WorkflowExecutionFailed,
            A::WorkflowExecutionCanceled(_) => EventType::WorkflowExecutionCanceled,
            A::WorkflowExecutionTerminated(_) => EventType::WorkflowExecutionTerminated,
            A::WorkflowExecutionContinuedAsNew(_) => EventType::WorkflowExecutionContinuedAsNew,
            A::DecisionTaskScheduled(_) => EventType::DecisionTaskScheduled,
            A::DecisionTaskStarted(_) => EventType::DecisionTaskStarted,
            A::DecisionTaskCompleted(_) => EventType::DecisionTaskCompleted,
            A::DecisionTaskFailed(_) => EventType::DecisionTaskFailed,
            A::DecisionTaskTimedOut(_) => EventType::DecisionTaskTimedOut,
            A::ActivityTaskScheduled(_) => EventType::ActivityTaskScheduled,
            A::ActivityTaskStarted(_) => EventType::ActivityTaskStarted,
            A::ActivityTaskCompleted(_) => EventType::ActivityTaskCompleted,
            A::ActivityTaskFailed(_) => EventType::ActivityTaskFailed,
            A::ActivityTaskTimedOut(_) => EventType::ActivityTaskTimedOut,
            A::ActivityTaskCancelRequested(_) => EventType::ActivityTaskCancelRequested,
            A::RequestCancelActivityTaskFailed(_) => EventType::RequestCancelActivityTaskFailed,
            A::ActivityTaskCanceled(_) => EventType::ActivityTaskCanceled,
            A::TimerStarted(_) => EventType::TimerStarted,
            A::TimerFired(_) => EventType::TimerFired,
            A::TimerCanceled(_) => EventType::TimerCanceled,
            A::CancelTimerFailed(_) => EventType::CancelTimerFailed,
            A::MarkerRecorded(_) => EventType::MarkerRecorded,
            A::StartChildWorkflowExecutionInitiated(_) => {
                EventType::StartChildWorkflowExecutionInitiated
            }
            A::StartChildWorkflowExecutionFailed(_) => EventType::StartChildWorkflowExecutionFailed,
            A::ChildWorkflowExecutionStarted(_) => EventType::ChildWorkflowExecutionStarted,
            A::ChildWorkflowExecutionCompleted(_) => EventType::ChildWorkflowExecutionCompleted,
            A::ChildWorkflowExecutionFailed(_) => EventType::ChildWorkflowExecutionFailed,
            A::ChildWorkflowExecutionCanceled(_) => EventType::ChildWorkflowExecutionCanceled,
            A::ChildWorkflowExecutionTimedOut(_) => EventType::ChildWorkflowExecutionTimedOut,
            A::ChildWorkflowExecutionTerminated(_) => EventType::ChildWorkflowExecutionTerminated,
            A::RequestCancelExternalWorkflowExecutionInitiated(_) => {
                EventType::RequestCancelExternalWorkflowExecutionInitiated
            }
            A::RequestCancelExternalWorkflowExecutionFailed(_) => {
                EventType::RequestCancelExternalWorkflowExecutionFailed
            }
            A::ExternalWorkflowExecutionCancelRequested(_) => {
                EventType::ExternalWorkflowExecutionCancelRequested
            }
            A::SignalExternalWorkflowExecutionInitiated(_) => {
                EventType::SignalExternalWorkflowExecutionInitiated
            }
            A::SignalExternalWorkflowExecutionFailed(_) => {
                EventType::SignalExternalWorkflowExecutionFailed
            }
            A::ExternalWorkflowExecutionSignaled(_) => EventType::ExternalWorkflowExecutionSignaled,
            A::UpsertWorkflowSearchAttributes(_) => EventType::UpsertWorkflowSearchAttributes,
        }
    }
}

// ============================================================================
// Workflow execution
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowExecutionStartedAttributes {
    pub workflow_type: String,
    pub task_list: String,
    pub input: Vec<u8>,
    pub execution_start_to_close_timeout_seconds: Option<i32>,
    pub task_start_to_close_timeout_seconds: Option<i32>,
    pub parent_execution: Option<WorkflowExecution>,
    pub attempt: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowExecutionCancelRequestedAttributes {
    pub cause: String,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowExecutionCompletedAttributes {
    pub result: Vec<u8>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowExecutionFailedAttributes {
    pub reason: String,
    pub details: Vec<u8>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowExecutionCanceledAttributes {
    pub details: Vec<u8>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowExecutionTerminatedAttributes {
    pub reason: String,
    pub details: Vec<u8>,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowExecutionContinuedAsNewAttributes {
    pub new_execution_run_id: String,
    pub workflow_type: String,
    pub input: Vec<u8>,
    pub decision_task_completed_event_id: i64,
}

// ============================================================================
// Decision tasks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionTaskScheduledAttributes {
    pub task_list: String,
    pub start_to_close_timeout_seconds: i32,
    pub attempt: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionTaskStartedAttributes {
    pub scheduled_event_id: i64,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionTaskCompletedAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionTaskFailedAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
    pub cause: String,
    pub details: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionTaskTimedOutAttributes {
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
}

// ============================================================================
// Activities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityTaskScheduledAttributes {
    pub activity_id: String,
    pub activity_type: String,
    pub task_list: String,
    pub input: Vec<u8>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityTaskStartedAttributes {
    pub scheduled_event_id: i64,
    pub identity: String,
    pub attempt: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityTaskCompletedAttributes {
    pub result: Vec<u8>,
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityTaskFailedAttributes {
    pub reason: String,
    pub details: Vec<u8>,
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeoutType {
    #[default]
    StartToClose,
    ScheduleToStart,
    ScheduleToClose,
    Heartbeat,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityTaskTimedOutAttributes {
    pub timeout_type: TimeoutType,
    pub details: Vec<u8>,
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityTaskCancelRequestedAttributes {
    pub activity_id: String,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestCancelActivityTaskFailedAttributes {
    pub activity_id: String,
    pub cause: String,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityTaskCanceledAttributes {
    pub details: Vec<u8>,
    pub latest_cancel_requested_event_id: i64,
    pub scheduled_event_id: i64,
    pub started_event_id: i64,
}

// ============================================================================
// Timers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerStartedAttributes {
    pub timer_id: String,
    pub start_to_fire_timeout_seconds: i64,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerFiredAttributes {
    pub timer_id: String,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerCanceledAttributes {
    pub timer_id: String,
    pub started_event_id: i64,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CancelTimerFailedAttributes {
    pub timer_id: String,
    pub cause: String,
    pub decision_task_completed_event_id: i64,
}

// ============================================================================
// Markers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkerRecordedAttributes {
    pub marker_name: String,
    pub details: Vec<u8>,
    pub decision_task_completed_event_id: i64,
}

// ============================================================================
// Child workflows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartChildWorkflowExecutionInitiatedAttributes {
    pub domain: String,
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_list: String,
    pub input: Vec<u8>,
    pub control: Vec<u8>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartChildWorkflowExecutionFailedAttributes {
    pub domain: String,
    pub workflow_id: String,
    pub workflow_type: String,
    pub cause: String,
    pub initiated_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChildWorkflowExecutionStartedAttributes {
    pub domain: String,
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: String,
    pub initiated_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChildWorkflowExecutionCompletedAttributes {
    pub result: Vec<u8>,
    pub workflow_execution: WorkflowExecution,
    pub initiated_event_id: i64,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChildWorkflowExecutionFailedAttributes {
    pub reason: String,
    pub details: Vec<u8>,
    pub workflow_execution: WorkflowExecution,
    pub initiated_event_id: i64,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChildWorkflowExecutionCanceledAttributes {
    pub details: Vec<u8>,
    pub workflow_execution: WorkflowExecution,
    pub initiated_event_id: i64,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChildWorkflowExecutionTimedOutAttributes {
    pub timeout_type: TimeoutType,
    pub workflow_execution: WorkflowExecution,
    pub initiated_event_id: i64,
    pub started_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChildWorkflowExecutionTerminatedAttributes {
    pub workflow_execution: WorkflowExecution,
    pub initiated_event_id: i64,
    pub started_event_id: i64,
}

// ============================================================================
// External workflows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestCancelExternalWorkflowExecutionInitiatedAttributes {
    pub domain: String,
    pub workflow_execution: WorkflowExecution,
    pub child_workflow_only: bool,
    pub control: Vec<u8>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestCancelExternalWorkflowExecutionFailedAttributes {
    pub cause: String,
    pub domain: String,
    pub workflow_execution: WorkflowExecution,
    pub initiated_event_id: i64,
    pub control: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalWorkflowExecutionCancelRequestedAttributes {
    pub initiated_event_id: i64,
    pub domain: String,
    pub workflow_execution: WorkflowExecution,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalExternalWorkflowExecutionInitiatedAttributes {
    pub domain: String,
    pub workflow_execution: WorkflowExecution,
    pub signal_name: String,
    pub input: Vec<u8>,
    pub child_workflow_only: bool,
    pub control: Vec<u8>,
    pub decision_task_completed_event_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalExternalWorkflowExecutionFailedAttributes {
    pub cause: String,
    pub domain: String,
    pub workflow_execution: WorkflowExecution,
    pub initiated_event_id: i64,
    pub control: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalWorkflowExecutionSignaledAttributes {
    pub initiated_event_id: i64,
    pub domain: String,
    pub workflow_execution: WorkflowExecution,
    pub control: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpsertWorkflowSearchAttributesEventAttributes {
    pub search_attributes: BTreeMap<String, Vec<u8>>,
    pub decision_task_completed_event_id: i64,
}
