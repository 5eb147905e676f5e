// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Helpers for building workflow histories in tests.
//!
//! ```ignore
//! let history = HistoryBuilder::new("greeting")
//!     .decision_task_completed()
//!     .timer_started("1", 60)
//!     .timer_fired("1")
//!     .decision_task_started()
//!     .build();
//! ```

use std::collections::HashMap;

use decider_protocol::*;

/// Start of virtual time in built histories: 2024-01-01T00:00:00Z.
pub const HISTORY_START_MILLIS: i64 = 1_704_067_200_000;

pub const TEST_WORKFLOW_ID: &str = "workflow-1";
pub const TEST_RUN_ID: &str = "run-1";
pub const TEST_DOMAIN: &str = "test-domain";
pub const TEST_TASK_LIST: &str = "test-task-list";

/// Builds a history one event at a time with consecutive event ids.
///
/// A new builder already holds `WorkflowExecutionStarted` and the first
/// decision task (`DecisionTaskScheduled`, `DecisionTaskStarted`).
#[derive(Debug, Clone)]
pub struct HistoryBuilder {
    workflow_type: String,
    events: Vec<HistoryEvent>,
    now_ms: i64,
    last_scheduled: i64,
    last_started: i64,
    activities: HashMap<String, i64>,
    timers: HashMap<String, (i64, i64)>,
    children: HashMap<String, (i64, String)>,
    signals: HashMap<String, i64>,
    cancel_requests: HashMap<String, i64>,
}

impl HistoryBuilder {
    pub fn new(workflow_type: impl Into<String>) -> Self {
        Self::with_input(workflow_type, Vec::new())
    }

    pub fn with_input(workflow_type: impl Into<String>, input: Vec<u8>) -> Self {
        let workflow_type = workflow_type.into();
        let mut builder = Self {
            workflow_type: workflow_type.clone(),
            events: Vec::new(),
            now_ms: HISTORY_START_MILLIS,
            last_scheduled: 0,
            last_started: 0,
            activities: HashMap::new(),
            timers: HashMap::new(),
            children: HashMap::new(),
            signals: HashMap::new(),
            cancel_requests: HashMap::new(),
        };
        builder.push(EventAttributes::WorkflowExecutionStarted(
            WorkflowExecutionStartedAttributes {
                workflow_type,
                task_list: TEST_TASK_LIST.to_string(),
                input,
                ..Default::default()
            },
        ));
        builder.decision_task_started()
    }

    fn push(&mut self, attributes: EventAttributes) -> i64 {
        let event_id = self.next_event_id();
        self.events
            .push(HistoryEvent::new(event_id, self.now_ms, attributes));
        event_id
    }

    pub fn next_event_id(&self) -> i64 {
        self.events.len() as i64 + 1
    }

    pub fn last_event_id(&self) -> i64 {
        self.events.len() as i64
    }

    /// Move virtual time forward.
    pub fn advance_millis(mut self, millis: i64) -> Self {
        self.now_ms += millis;
        self
    }

    // ------------------------------------------------------------------
    // Decision tasks
    // ------------------------------------------------------------------

    pub fn decision_task_started(mut self) -> Self {
        self.last_scheduled = self.push(EventAttributes::DecisionTaskScheduled(
            DecisionTaskScheduledAttributes {
                task_list: TEST_TASK_LIST.to_string(),
                start_to_close_timeout_seconds: 10,
                attempt: 0,
            },
        ));
        self.last_started = self.push(EventAttributes::DecisionTaskStarted(
            DecisionTaskStartedAttributes {
                scheduled_event_id: self.last_scheduled,
                identity: "test-decider".to_string(),
            },
        ));
        self
    }

    pub fn decision_task_completed(mut self) -> Self {
        self.push(EventAttributes::DecisionTaskCompleted(
            DecisionTaskCompletedAttributes {
                scheduled_event_id: self.last_scheduled,
                started_event_id: self.last_started,
                identity: "test-decider".to_string(),
            },
        ));
        self
    }

    pub fn decision_task_failed(mut self) -> Self {
        self.push(EventAttributes::DecisionTaskFailed(DecisionTaskFailedAttributes {
            scheduled_event_id: self.last_scheduled,
            started_event_id: self.last_started,
            cause: "NON_DETERMINISTIC".to_string(),
            details: Vec::new(),
        }));
        self
    }

    // ------------------------------------------------------------------
    // Activities
    // ------------------------------------------------------------------

    pub fn activity_scheduled(mut self, activity_id: &str, activity_type: &str) -> Self {
        let event_id = self.push(EventAttributes::ActivityTaskScheduled(
            ActivityTaskScheduledAttributes {
                activity_id: activity_id.to_string(),
                activity_type: activity_type.to_string(),
                task_list: TEST_TASK_LIST.to_string(),
                input: Vec::new(),
                decision_task_completed_event_id: self.last_started + 1,
            },
        ));
        self.activities.insert(activity_id.to_string(), event_id);
        self
    }

    fn scheduled_id(&self, activity_id: &str) -> i64 {
        self.activities.get(activity_id).copied().unwrap_or_default()
    }

    pub fn activity_started(mut self, activity_id: &str) -> Self {
        let scheduled_event_id = self.scheduled_id(activity_id);
        self.push(EventAttributes::ActivityTaskStarted(
            ActivityTaskStartedAttributes {
                scheduled_event_id,
                identity: "test-activity-worker".to_string(),
                attempt: 0,
            },
        ));
        self
    }

    pub fn activity_completed(mut self, activity_id: &str, result: &[u8]) -> Self {
        let scheduled_event_id = self.scheduled_id(activity_id);
        self.push(EventAttributes::ActivityTaskCompleted(
            ActivityTaskCompletedAttributes {
                result: result.to_vec(),
                scheduled_event_id,
                started_event_id: 0,
            },
        ));
        self
    }

    pub fn activity_failed(mut self, activity_id: &str, reason: &str) -> Self {
        let scheduled_event_id = self.scheduled_id(activity_id);
        self.push(EventAttributes::ActivityTaskFailed(
            ActivityTaskFailedAttributes {
                reason: reason.to_string(),
                details: Vec::new(),
                scheduled_event_id,
                started_event_id: 0,
            },
        ));
        self
    }

    pub fn activity_cancel_requested(mut self, activity_id: &str) -> Self {
        self.push(EventAttributes::ActivityTaskCancelRequested(
            ActivityTaskCancelRequestedAttributes {
                activity_id: activity_id.to_string(),
                decision_task_completed_event_id: self.last_started + 1,
            },
        ));
        self
    }

    pub fn activity_canceled(mut self, activity_id: &str) -> Self {
        let scheduled_event_id = self.scheduled_id(activity_id);
        self.push(EventAttributes::ActivityTaskCanceled(
            ActivityTaskCanceledAttributes {
                details: Vec::new(),
                latest_cancel_requested_event_id: 0,
                scheduled_event_id,
                started_event_id: 0,
            },
        ));
        self
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub fn timer_started(mut self, timer_id: &str, start_to_fire_timeout_seconds: i64) -> Self {
        let event_id = self.push(EventAttributes::TimerStarted(TimerStartedAttributes {
            timer_id: timer_id.to_string(),
            start_to_fire_timeout_seconds,
            decision_task_completed_event_id: self.last_started + 1,
        }));
        let fire_time_ms = self.now_ms + start_to_fire_timeout_seconds * 1_000;
        self.timers
            .insert(timer_id.to_string(), (event_id, fire_time_ms));
        self
    }

    /// Fires the timer, moving virtual time to its fire time if needed.
    pub fn timer_fired(mut self, timer_id: &str) -> Self {
        let (started_event_id, fire_time_ms) =
            self.timers.get(timer_id).copied().unwrap_or_default();
        self.now_ms = self.now_ms.max(fire_time_ms);
        self.push(EventAttributes::TimerFired(TimerFiredAttributes {
            timer_id: timer_id.to_string(),
            started_event_id,
        }));
        self
    }

    pub fn timer_canceled(mut self, timer_id: &str) -> Self {
        let (started_event_id, _) = self.timers.get(timer_id).copied().unwrap_or_default();
        self.push(EventAttributes::TimerCanceled(TimerCanceledAttributes {
            timer_id: timer_id.to_string(),
            started_event_id,
            decision_task_completed_event_id: self.last_started + 1,
        }));
        self
    }

    // ------------------------------------------------------------------
    // Markers
    // ------------------------------------------------------------------

    pub fn marker(mut self, marker_name: &str, details: Vec<u8>) -> Self {
        self.push(EventAttributes::MarkerRecorded(MarkerRecordedAttributes {
            marker_name: marker_name.to_string(),
            details,
            decision_task_completed_event_id: self.last_started + 1,
        }));
        self
    }

    pub fn side_effect_marker(self, result: &[u8]) -> Self {
        self.marker(SIDE_EFFECT_MARKER_NAME, result.to_vec())
    }

    pub fn mutable_side_effect_marker(self, id: &str, data: &[u8]) -> Self {
        let details = MarkerPayload::new(id, data.to_vec())
            .encode()
            .map(|b| b.to_vec())
            .unwrap_or_default();
        self.marker(MUTABLE_SIDE_EFFECT_MARKER_NAME, details)
    }

    pub fn version_marker(self, change_id: &str, version: i32) -> Self {
        let data = serde_json::to_vec(&version).unwrap_or_default();
        let details = MarkerPayload::new(change_id, data)
            .encode()
            .map(|b| b.to_vec())
            .unwrap_or_default();
        self.marker(VERSION_MARKER_NAME, details)
    }

    // ------------------------------------------------------------------
    // Child and external workflows
    // ------------------------------------------------------------------

    pub fn child_workflow_initiated(mut self, workflow_id: &str, workflow_type: &str) -> Self {
        let event_id = self.push(EventAttributes::StartChildWorkflowExecutionInitiated(
            StartChildWorkflowExecutionInitiatedAttributes {
                domain: TEST_DOMAIN.to_string(),
                workflow_id: workflow_id.to_string(),
                workflow_type: workflow_type.to_string(),
                task_list: TEST_TASK_LIST.to_string(),
                input: Vec::new(),
                control: Vec::new(),
                decision_task_completed_event_id: self.last_started + 1,
            },
        ));
        self.children.insert(
            workflow_id.to_string(),
            (event_id, workflow_type.to_string()),
        );
        self
    }

    fn child(&self, workflow_id: &str) -> (i64, WorkflowExecution, String) {
        let (initiated_event_id, workflow_type) =
            self.children.get(workflow_id).cloned().unwrap_or_default();
        (
            initiated_event_id,
            WorkflowExecution::new(workflow_id, format!("{}-run", workflow_id)),
            workflow_type,
        )
    }

    pub fn child_workflow_started(mut self, workflow_id: &str) -> Self {
        let (initiated_event_id, workflow_execution, workflow_type) = self.child(workflow_id);
        self.push(EventAttributes::ChildWorkflowExecutionStarted(
            ChildWorkflowExecutionStartedAttributes {
                domain: TEST_DOMAIN.to_string(),
                workflow_execution,
                workflow_type,
                initiated_event_id,
            },
        ));
        self
    }

    pub fn child_workflow_completed(mut self, workflow_id: &str, result: &[u8]) -> Self {
        let (initiated_event_id, workflow_execution, _) = self.child(workflow_id);
        self.push(EventAttributes::ChildWorkflowExecutionCompleted(
            ChildWorkflowExecutionCompletedAttributes {
                result: result.to_vec(),
                workflow_execution,
                initiated_event_id,
                started_event_id: 0,
            },
        ));
        self
    }

    pub fn signal_initiated(mut self, workflow_id: &str, signal_name: &str) -> Self {
        let event_id = self.push(EventAttributes::SignalExternalWorkflowExecutionInitiated(
            SignalExternalWorkflowExecutionInitiatedAttributes {
                domain: TEST_DOMAIN.to_string(),
                workflow_execution: WorkflowExecution::new(workflow_id, ""),
                signal_name: signal_name.to_string(),
                input: Vec::new(),
                child_workflow_only: false,
                control: Vec::new(),
                decision_task_completed_event_id: self.last_started + 1,
            },
        ));
        self.signals.insert(workflow_id.to_string(), event_id);
        self
    }

    pub fn external_workflow_signaled(mut self, workflow_id: &str) -> Self {
        let initiated_event_id = self.signals.get(workflow_id).copied().unwrap_or_default();
        self.push(EventAttributes::ExternalWorkflowExecutionSignaled(
            ExternalWorkflowExecutionSignaledAttributes {
                initiated_event_id,
                domain: TEST_DOMAIN.to_string(),
                workflow_execution: WorkflowExecution::new(workflow_id, ""),
                control: Vec::new(),
            },
        ));
        self
    }

    /// Cancellation of `workflow_id` initiated; for a child pass
    /// `child_workflow_only = true`.
    pub fn cancel_external_initiated(mut self, workflow_id: &str, child_workflow_only: bool) -> Self {
        let event_id = self.push(
            EventAttributes::RequestCancelExternalWorkflowExecutionInitiated(
                RequestCancelExternalWorkflowExecutionInitiatedAttributes {
                    domain: TEST_DOMAIN.to_string(),
                    workflow_execution: WorkflowExecution::new(workflow_id, ""),
                    child_workflow_only,
                    control: Vec::new(),
                    decision_task_completed_event_id: self.last_started + 1,
                },
            ),
        );
        self.cancel_requests.insert(workflow_id.to_string(), event_id);
        self
    }

    pub fn external_cancel_requested(mut self, workflow_id: &str) -> Self {
        let initiated_event_id = self
            .cancel_requests
            .get(workflow_id)
            .copied()
            .unwrap_or_default();
        self.push(EventAttributes::ExternalWorkflowExecutionCancelRequested(
            ExternalWorkflowExecutionCancelRequestedAttributes {
                initiated_event_id,
                domain: TEST_DOMAIN.to_string(),
                workflow_execution: WorkflowExecution::new(workflow_id, ""),
            },
        ));
        self
    }

    // ------------------------------------------------------------------
    // Workflow
    // ------------------------------------------------------------------

    pub fn workflow_cancel_requested(mut self, cause: &str) -> Self {
        self.push(EventAttributes::WorkflowExecutionCancelRequested(
            WorkflowExecutionCancelRequestedAttributes {
                cause: cause.to_string(),
                identity: "test-client".to_string(),
            },
        ));
        self
    }

    pub fn workflow_completed(mut self, result: &[u8]) -> Self {
        self.push(EventAttributes::WorkflowExecutionCompleted(
            WorkflowExecutionCompletedAttributes {
                result: result.to_vec(),
                decision_task_completed_event_id: self.last_started + 1,
            },
        ));
        self
    }

    pub fn build(self) -> Vec<HistoryEvent> {
        self.events
    }

    /// Decision task for the built history.
    pub fn task(self) -> DecisionTask {
        let started_event_id = self.last_started;
        DecisionTask {
            task_token: format!("token-{}", started_event_id).into_bytes(),
            workflow_execution: WorkflowExecution::new(TEST_WORKFLOW_ID, TEST_RUN_ID),
            workflow_type: self.workflow_type,
            previous_started_event_id: 0,
            started_event_id,
            history: self.events,
        }
    }
}

/// Engine state description matching the builder's constants.
pub fn test_workflow_info(workflow_type: &str) -> crate::context::WorkflowInfo {
    crate::context::WorkflowInfo {
        domain: TEST_DOMAIN.to_string(),
        execution: WorkflowExecution::new(TEST_WORKFLOW_ID, TEST_RUN_ID),
        workflow_type: workflow_type.to_string(),
        task_list: TEST_TASK_LIST.to_string(),
        ..Default::default()
    }
}
