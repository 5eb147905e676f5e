// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decision tracker.
//!
//! Owns every decision state machine of one workflow execution, allocates
//! command ids and routes history events to the machine they belong to.
//!
//! Command ids are history event ids: when a decision task started at event
//! `N` completes, the service records `DecisionTaskCompleted` as `N + 1` and
//! then one event per command in the order the commands were sent. The
//! tracker predicts those ids, so a replayed event that does not land on a
//! tracked command of the expected kind means the workflow code diverged
//! from history.
//!
//! A machine consumes an id whenever it starts emitting a command, whether
//! because it was just created, canceled, or moved by an event (a child that
//! starts after its cancellation was requested). Commands are sent in the
//! order their ids were consumed.

use std::collections::{BTreeMap, HashMap};

use decider_protocol::{
    ActivityTaskScheduledAttributes, CancelTimerFailedAttributes,
    CancelWorkflowExecutionAttributes, ChildWorkflowExecutionStartedAttributes,
    CompleteWorkflowExecutionAttributes, ContinueAsNewWorkflowExecutionAttributes, Decision,
    FailWorkflowExecutionAttributes, MarkerRecordedAttributes, RecordMarkerAttributes,
    RequestCancelExternalWorkflowExecutionAttributes,
    RequestCancelExternalWorkflowExecutionInitiatedAttributes, ScheduleActivityTaskAttributes,
    SignalExternalWorkflowExecutionAttributes, StartChildWorkflowExecutionAttributes,
    StartChildWorkflowExecutionInitiatedAttributes, StartTimerAttributes,
    TimerCanceledAttributes, TimerFiredAttributes, TimerStartedAttributes,
    UpsertWorkflowSearchAttributesAttributes, VERSION_MARKER_NAME,
};
use tracing::debug;

use crate::decision::{
    ActivityDecisionStateMachine, CancelExternalDecisionStateMachine, CancellationCallback,
    ChildWorkflowDecisionStateMachine, DecisionId, DecisionStateMachine, DecisionTarget,
    SignalDecisionStateMachine, SimpleDecisionStateMachine, TimerDecisionStateMachine,
};
use crate::error::{EngineError, Result};

/// Tracks the commands of one workflow execution.
pub struct DecisionTracker {
    decisions: BTreeMap<DecisionId, Box<dyn DecisionStateMachine>>,
    /// decision -> event id its pending command is expected at
    command_event_ids: HashMap<DecisionId, i64>,
    next_decision_event_id: i64,
    id_counter: i64,
    /// activity id -> scheduled event id
    activities: HashMap<String, i64>,
    /// timer id -> started event id
    timers: HashMap<String, i64>,
    /// child workflow id -> initiated event id
    children: HashMap<String, i64>,
    /// Version markers of the history being replayed: event id -> (change id, details)
    history_version_markers: BTreeMap<i64, (String, Vec<u8>)>,
}

impl Default for DecisionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTracker {
    pub fn new() -> Self {
        Self {
            decisions: BTreeMap::new(),
            command_event_ids: HashMap::new(),
            next_decision_event_id: 0,
            id_counter: 0,
            activities: HashMap::new(),
            timers: HashMap::new(),
            children: HashMap::new(),
            history_version_markers: BTreeMap::new(),
        }
    }

    /// Event id the next command's initiating event will receive.
    pub fn next_decision_event_id(&self) -> i64 {
        self.next_decision_event_id
    }

    /// Position the id allocator after the `DecisionTaskStarted` event of
    /// the task being processed. One id is reserved for `DecisionTaskCompleted`.
    ///
    /// Commands still pending from the previous task are sent first, so they
    /// take the first ids of this one.
    pub fn start_decision_task(&mut self, started_event_id: i64) {
        self.next_decision_event_id = started_event_id + 2;
        let carried = self.pending_commands();
        self.command_event_ids.clear();
        for id in carried {
            self.consume_event_id(id);
        }
    }

    /// Next value of the counter used for generated activity and timer ids.
    pub fn next_id(&mut self) -> i64 {
        let id = self.id_counter;
        self.id_counter += 1;
        id
    }

    fn add_decision(&mut self, decision: Box<dyn DecisionStateMachine>) -> i64 {
        let id = *decision.id();
        debug!(decision_id = %id, "Decision added");
        self.decisions.insert(id, decision);
        self.consume_event_id(id);
        id.event_id
    }

    fn consume_event_id(&mut self, id: DecisionId) {
        self.command_event_ids
            .insert(id, self.next_decision_event_id);
        self.next_decision_event_id += 1;
    }

    /// Machines with a command to send, ordered by the event id each command
    /// is expected at.
    fn pending_commands(&self) -> Vec<DecisionId> {
        let mut pending: Vec<(i64, DecisionId)> = self
            .decisions
            .iter()
            .filter(|(_, d)| d.decision().is_some())
            .map(|(id, _)| {
                let event_id = self
                    .command_event_ids
                    .get(id)
                    .copied()
                    .unwrap_or(id.event_id);
                (event_id, *id)
            })
            .collect();
        pending.sort();
        pending.into_iter().map(|(_, id)| id).collect()
    }

    fn allocate(&self, target: DecisionTarget) -> DecisionId {
        DecisionId::new(target, self.next_decision_event_id)
    }

    /// Id for a new command other than a marker.
    fn allocate_command(&mut self, target: DecisionTarget) -> DecisionId {
        self.add_missing_version_markers(None);
        self.allocate(target)
    }

    /// Remember a version marker read from history before the workflow
    /// code of its decision task runs.
    pub fn add_history_version_marker(&mut self, event_id: i64, change_id: String, details: Vec<u8>) {
        self.history_version_markers
            .insert(event_id, (change_id, details));
    }

    /// Record the version markers history holds at the next command ids
    /// when the workflow code no longer asks for them, so that the commands
    /// after them keep their recorded ids. Stops at a marker for
    /// `change_id`, which the caller records itself.
    pub fn add_missing_version_markers(&mut self, change_id: Option<&str>) {
        while let Some((marker_change_id, details)) = self
            .history_version_markers
            .get(&self.next_decision_event_id)
            .cloned()
        {
            if change_id == Some(marker_change_id.as_str()) {
                return;
            }
            debug!(
                event_id = self.next_decision_event_id,
                change_id = %marker_change_id,
                "Recording version marker missing from workflow code"
            );
            self.record_marker(VERSION_MARKER_NAME, details);
        }
    }

    fn decision_mut(&mut self, id: DecisionId) -> Result<&mut Box<dyn DecisionStateMachine>> {
        self.decisions.get_mut(&id).ok_or_else(|| {
            EngineError::NonDeterministic(format!(
                "unknown decision {}, history does not match the commands produced by the workflow code",
                id
            ))
        })
    }

    /// Run `f` against a tracked machine. A machine that had nothing to
    /// send and now has a command consumes the next event id.
    fn update<R>(
        &mut self,
        id: DecisionId,
        f: impl FnOnce(&mut dyn DecisionStateMachine) -> Result<R>,
    ) -> Result<R> {
        let (result, emits) = {
            let decision = self.decision_mut(id)?;
            let was_emitting = decision.decision().is_some();
            let result = f(&mut **decision);
            (result, !was_emitting && decision.decision().is_some())
        };
        if emits {
            self.consume_event_id(id);
        }
        result
    }

    /// Returns whether the command needs no further tracking.
    fn cancel_decision(
        &mut self,
        id: DecisionId,
        immediate_cancellation_callback: Option<CancellationCallback>,
    ) -> Result<bool> {
        self.add_missing_version_markers(None);
        self.update(id, |d| {
            d.cancel(immediate_cancellation_callback)?;
            Ok(d.is_done())
        })
    }

    pub fn state_of(&self, id: DecisionId) -> Option<crate::decision::DecisionState> {
        self.decisions.get(&id).map(|d| d.state())
    }

    pub fn is_done(&self, id: DecisionId) -> Option<bool> {
        self.decisions.get(&id).map(|d| d.is_done())
    }

    // ========================================================================
    // Activities
    // ========================================================================

    /// Returns the scheduled event id identifying the activity.
    pub fn schedule_activity_task(&mut self, attributes: ScheduleActivityTaskAttributes) -> i64 {
        let id = self.allocate_command(DecisionTarget::Activity);
        self.activities
            .insert(attributes.activity_id.clone(), id.event_id);
        self.add_decision(Box::new(ActivityDecisionStateMachine::new(id, attributes)))
    }

    /// Returns whether the activity needs no further tracking.
    pub fn request_cancel_activity_task(
        &mut self,
        scheduled_event_id: i64,
        immediate_cancellation_callback: Option<CancellationCallback>,
    ) -> Result<bool> {
        self.cancel_decision(
            DecisionId::new(DecisionTarget::Activity, scheduled_event_id),
            immediate_cancellation_callback,
        )
    }

    pub fn handle_activity_task_scheduled(
        &mut self,
        event_id: i64,
        attributes: &ActivityTaskScheduledAttributes,
    ) -> Result<()> {
        if self.activities.get(&attributes.activity_id) != Some(&event_id) {
            return Err(EngineError::NonDeterministic(format!(
                "activity {} scheduled at event {} was not scheduled by the workflow code at that point",
                attributes.activity_id, event_id
            )));
        }
        self.update(DecisionId::new(DecisionTarget::Activity, event_id), |d| {
            d.handle_initiated_event()
        })
    }

    pub fn handle_activity_task_started(&mut self, scheduled_event_id: i64) -> Result<()> {
        self.update(
            DecisionId::new(DecisionTarget::Activity, scheduled_event_id),
            |d| d.handle_started_event(),
        )
    }

    /// Activity completed, failed or timed out.
    pub fn handle_activity_task_closed(&mut self, scheduled_event_id: i64) -> Result<bool> {
        self.update(
            DecisionId::new(DecisionTarget::Activity, scheduled_event_id),
            |d| {
                d.handle_completion_event()?;
                Ok(d.is_done())
            },
        )
    }

    pub fn handle_activity_task_cancel_requested(&mut self, activity_id: &str) -> Result<()> {
        let scheduled_event_id = self.activity_scheduled_event_id(activity_id)?;
        self.update(
            DecisionId::new(DecisionTarget::Activity, scheduled_event_id),
            |d| d.handle_cancellation_initiated_event(),
        )
    }

    pub fn handle_request_cancel_activity_task_failed(&mut self, activity_id: &str) -> Result<()> {
        let scheduled_event_id = self.activity_scheduled_event_id(activity_id)?;
        self.update(
            DecisionId::new(DecisionTarget::Activity, scheduled_event_id),
            |d| d.handle_cancellation_failure_event(),
        )
    }

    pub fn handle_activity_task_canceled(&mut self, scheduled_event_id: i64) -> Result<bool> {
        self.update(
            DecisionId::new(DecisionTarget::Activity, scheduled_event_id),
            |d| {
                d.handle_cancellation_event()?;
                Ok(d.is_done())
            },
        )
    }

    fn activity_scheduled_event_id(&self, activity_id: &str) -> Result<i64> {
        self.activities.get(activity_id).copied().ok_or_else(|| {
            EngineError::NonDeterministic(format!("unknown activity id {}", activity_id))
        })
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Returns the started event id identifying the timer.
    pub fn start_timer(&mut self, attributes: StartTimerAttributes) -> i64 {
        let id = self.allocate_command(DecisionTarget::Timer);
        self.timers.insert(attributes.timer_id.clone(), id.event_id);
        self.add_decision(Box::new(TimerDecisionStateMachine::new(id, attributes)))
    }

    pub fn cancel_timer(
        &mut self,
        started_event_id: i64,
        immediate_cancellation_callback: Option<CancellationCallback>,
    ) -> Result<bool> {
        self.cancel_decision(
            DecisionId::new(DecisionTarget::Timer, started_event_id),
            immediate_cancellation_callback,
        )
    }

    pub fn handle_timer_started(
        &mut self,
        event_id: i64,
        attributes: &TimerStartedAttributes,
    ) -> Result<()> {
        if self.timers.get(&attributes.timer_id) != Some(&event_id) {
            return Err(EngineError::NonDeterministic(format!(
                "timer {} started at event {} was not started by the workflow code at that point",
                attributes.timer_id, event_id
            )));
        }
        self.update(DecisionId::new(DecisionTarget::Timer, event_id), |d| {
            d.handle_initiated_event()
        })
    }

    pub fn handle_timer_closed(&mut self, attributes: &TimerFiredAttributes) -> Result<bool> {
        self.update(
            DecisionId::new(DecisionTarget::Timer, attributes.started_event_id),
            |d| {
                d.handle_completion_event()?;
                Ok(d.is_done())
            },
        )
    }

    pub fn handle_timer_canceled(&mut self, attributes: &TimerCanceledAttributes) -> Result<bool> {
        self.update(
            DecisionId::new(DecisionTarget::Timer, attributes.started_event_id),
            |d| {
                d.handle_cancellation_event()?;
                Ok(d.is_done())
            },
        )
    }

    pub fn handle_cancel_timer_failed(
        &mut self,
        attributes: &CancelTimerFailedAttributes,
    ) -> Result<bool> {
        let started_event_id = self.timers.get(&attributes.timer_id).copied().ok_or_else(|| {
            EngineError::NonDeterministic(format!("unknown timer id {}", attributes.timer_id))
        })?;
        self.update(
            DecisionId::new(DecisionTarget::Timer, started_event_id),
            |d| {
                d.handle_cancellation_failure_event()?;
                Ok(d.is_done())
            },
        )
    }

    // ========================================================================
    // Markers and search attributes
    // ========================================================================

    /// Returns the event id the marker will be recorded at.
    pub fn record_marker(&mut self, marker_name: &str, details: Vec<u8>) -> i64 {
        let id = self.allocate(DecisionTarget::Marker);
        let decision = Decision::RecordMarker(RecordMarkerAttributes {
            marker_name: marker_name.to_string(),
            details,
        });
        self.add_decision(Box::new(SimpleDecisionStateMachine::new(id, decision)))
    }

    pub fn handle_marker_recorded(
        &mut self,
        event_id: i64,
        attributes: &MarkerRecordedAttributes,
    ) -> Result<()> {
        let id = DecisionId::new(DecisionTarget::Marker, event_id);
        if !self.decisions.contains_key(&id) {
            return Err(EngineError::NonDeterministic(format!(
                "marker {} recorded at event {} was not produced by the workflow code at that point",
                attributes.marker_name, event_id
            )));
        }
        self.update(id, |d| d.handle_initiated_event())
    }

    pub fn upsert_search_attributes(
        &mut self,
        attributes: UpsertWorkflowSearchAttributesAttributes,
    ) -> i64 {
        let id = self.allocate_command(DecisionTarget::UpsertSearchAttributes);
        let decision = Decision::UpsertWorkflowSearchAttributes(attributes);
        self.add_decision(Box::new(SimpleDecisionStateMachine::new(id, decision)))
    }

    pub fn handle_upsert_search_attributes(&mut self, event_id: i64) -> Result<()> {
        self.update(
            DecisionId::new(DecisionTarget::UpsertSearchAttributes, event_id),
            |d| d.handle_initiated_event(),
        )
    }

    // ========================================================================
    // Child workflows
    // ========================================================================

    /// Returns the initiated event id identifying the child.
    pub fn start_child_workflow_execution(
        &mut self,
        attributes: StartChildWorkflowExecutionAttributes,
    ) -> i64 {
        let id = self.allocate_command(DecisionTarget::ChildWorkflow);
        self.children
            .insert(attributes.workflow_id.clone(), id.event_id);
        self.add_decision(Box::new(ChildWorkflowDecisionStateMachine::new(
            id, attributes,
        )))
    }

    pub fn request_cancel_child_workflow(
        &mut self,
        initiated_event_id: i64,
        immediate_cancellation_callback: Option<CancellationCallback>,
    ) -> Result<bool> {
        self.cancel_decision(
            DecisionId::new(DecisionTarget::ChildWorkflow, initiated_event_id),
            immediate_cancellation_callback,
        )
    }

    pub fn handle_start_child_workflow_execution_initiated(
        &mut self,
        event_id: i64,
        attributes: &StartChildWorkflowExecutionInitiatedAttributes,
    ) -> Result<()> {
        if self.children.get(&attributes.workflow_id) != Some(&event_id) {
            return Err(EngineError::NonDeterministic(format!(
                "child workflow {} initiated at event {} was not started by the workflow code at that point",
                attributes.workflow_id, event_id
            )));
        }
        self.update(DecisionId::new(DecisionTarget::ChildWorkflow, event_id), |d| {
            d.handle_initiated_event()
        })
    }

    pub fn handle_start_child_workflow_execution_failed(
        &mut self,
        initiated_event_id: i64,
    ) -> Result<bool> {
        self.update(
            DecisionId::new(DecisionTarget::ChildWorkflow, initiated_event_id),
            |d| {
                d.handle_initiation_failed_event()?;
                Ok(d.is_done())
            },
        )
    }

    /// A child canceled before it started begins emitting its cancellation
    /// request here.
    pub fn handle_child_workflow_execution_started(
        &mut self,
        attributes: &ChildWorkflowExecutionStartedAttributes,
    ) -> Result<()> {
        self.update(
            DecisionId::new(DecisionTarget::ChildWorkflow, attributes.initiated_event_id),
            |d| d.handle_started_event(),
        )
    }

    /// Child completed, failed, timed out or was terminated.
    pub fn handle_child_workflow_execution_closed(
        &mut self,
        initiated_event_id: i64,
    ) -> Result<bool> {
        self.update(
            DecisionId::new(DecisionTarget::ChildWorkflow, initiated_event_id),
            |d| {
                d.handle_completion_event()?;
                Ok(d.is_done())
            },
        )
    }

    pub fn handle_child_workflow_execution_canceled(
        &mut self,
        initiated_event_id: i64,
    ) -> Result<bool> {
        self.update(
            DecisionId::new(DecisionTarget::ChildWorkflow, initiated_event_id),
            |d| {
                d.handle_cancellation_event()?;
                Ok(d.is_done())
            },
        )
    }

    fn child_initiated_event_id(&self, workflow_id: &str) -> Option<i64> {
        self.children.get(workflow_id).copied()
    }

    // ========================================================================
    // External workflows
    // ========================================================================

    /// Returns the initiated event id identifying the signal.
    pub fn signal_external_workflow_execution(
        &mut self,
        attributes: SignalExternalWorkflowExecutionAttributes,
    ) -> i64 {
        let id = self.allocate_command(DecisionTarget::SignalExternalWorkflow);
        self.add_decision(Box::new(SignalDecisionStateMachine::new(id, attributes)))
    }

    pub fn cancel_signal_external_workflow_execution(
        &mut self,
        initiated_event_id: i64,
        immediate_cancellation_callback: Option<CancellationCallback>,
    ) -> Result<bool> {
        self.cancel_decision(
            DecisionId::new(DecisionTarget::SignalExternalWorkflow, initiated_event_id),
            immediate_cancellation_callback,
        )
    }

    pub fn handle_signal_external_workflow_execution_initiated(
        &mut self,
        event_id: i64,
    ) -> Result<()> {
        self.update(
            DecisionId::new(DecisionTarget::SignalExternalWorkflow, event_id),
            |d| d.handle_initiated_event(),
        )
    }

    /// Signal delivered or failed.
    pub fn handle_signal_external_workflow_execution_closed(
        &mut self,
        initiated_event_id: i64,
    ) -> Result<bool> {
        self.update(
            DecisionId::new(DecisionTarget::SignalExternalWorkflow, initiated_event_id),
            |d| {
                d.handle_completion_event()?;
                Ok(d.is_done())
            },
        )
    }

    /// Returns the initiated event id identifying the request.
    pub fn request_cancel_external_workflow_execution(
        &mut self,
        attributes: RequestCancelExternalWorkflowExecutionAttributes,
    ) -> i64 {
        let id = self.allocate_command(DecisionTarget::CancelExternalWorkflow);
        self.add_decision(Box::new(CancelExternalDecisionStateMachine::new(
            id, attributes,
        )))
    }

    /// A cancellation request was initiated, either by an explicit request
    /// or by cancelling a started child.
    pub fn handle_request_cancel_external_workflow_execution_initiated(
        &mut self,
        event_id: i64,
        attributes: &RequestCancelExternalWorkflowExecutionInitiatedAttributes,
    ) -> Result<()> {
        let request = DecisionId::new(DecisionTarget::CancelExternalWorkflow, event_id);
        if self.decisions.contains_key(&request) {
            return self.update(request, |d| d.handle_initiated_event());
        }
        let initiated = attributes
            .child_workflow_only
            .then(|| self.child_initiated_event_id(&attributes.workflow_execution.workflow_id))
            .flatten()
            .ok_or_else(|| {
                EngineError::NonDeterministic(format!(
                    "cancellation of {} requested at event {} was not requested by the workflow code at that point",
                    attributes.workflow_execution.workflow_id, event_id
                ))
            })?;
        self.update(
            DecisionId::new(DecisionTarget::ChildWorkflow, initiated),
            |d| d.handle_cancellation_initiated_event(),
        )
    }

    /// Cancellation request delivered or failed.
    ///
    /// Returns `true` when the event closes an explicit cancellation
    /// request, `false` when it belongs to the cancellation of a child.
    pub fn handle_external_workflow_cancel_closed(
        &mut self,
        initiated_event_id: i64,
        workflow_id: &str,
        failed: bool,
    ) -> Result<bool> {
        let request = DecisionId::new(DecisionTarget::CancelExternalWorkflow, initiated_event_id);
        if self.decisions.contains_key(&request) {
            self.update(request, |d| d.handle_completion_event())?;
            return Ok(true);
        }
        let initiated = self.child_initiated_event_id(workflow_id).ok_or_else(|| {
            EngineError::NonDeterministic(format!(
                "unknown cancellation request for workflow {}",
                workflow_id
            ))
        })?;
        if failed {
            self.update(
                DecisionId::new(DecisionTarget::ChildWorkflow, initiated),
                |d| d.handle_cancellation_failure_event(),
            )?;
        }
        Ok(false)
    }

    // ========================================================================
    // Workflow completion
    // ========================================================================

    fn close_workflow(&mut self, decision: Decision) -> i64 {
        let id = self.allocate_command(DecisionTarget::Workflow);
        self.add_decision(Box::new(SimpleDecisionStateMachine::new(id, decision)))
    }

    pub fn complete_workflow_execution(&mut self, result: Vec<u8>) -> i64 {
        self.close_workflow(Decision::CompleteWorkflowExecution(
            CompleteWorkflowExecutionAttributes { result },
        ))
    }

    pub fn fail_workflow_execution(&mut self, reason: String, details: Vec<u8>) -> i64 {
        self.close_workflow(Decision::FailWorkflowExecution(
            FailWorkflowExecutionAttributes { reason, details },
        ))
    }

    pub fn cancel_workflow_execution(&mut self, details: Vec<u8>) -> i64 {
        self.close_workflow(Decision::CancelWorkflowExecution(
            CancelWorkflowExecutionAttributes { details },
        ))
    }

    pub fn continue_as_new_workflow_execution(
        &mut self,
        attributes: ContinueAsNewWorkflowExecutionAttributes,
    ) -> i64 {
        self.close_workflow(Decision::ContinueAsNewWorkflowExecution(attributes))
    }

    /// Workflow completed, failed, was canceled or continued as new.
    pub fn handle_workflow_execution_closed(&mut self, event_id: i64) -> Result<()> {
        self.update(DecisionId::new(DecisionTarget::Workflow, event_id), |d| {
            d.handle_initiated_event()
        })
    }

    // ========================================================================
    // Decision task batch
    // ========================================================================

    /// The commands produced so far have been sent with a decision task completion.
    pub fn handle_decision_task_started_event(&mut self) {
        for decision in self.decisions.values_mut() {
            decision.handle_decision_task_started_event();
        }
        self.command_event_ids.clear();
    }

    /// Commands to send, in the order their event ids were consumed.
    ///
    /// The service records the commands in the order it receives them, so
    /// the `n`-th command lands on the `n`-th predicted id. A cancellation
    /// requested after a new command was scheduled is sent after it.
    pub fn decisions(&self) -> Vec<Decision> {
        self.pending_commands()
            .into_iter()
            .filter_map(|id| self.decisions.get(&id).and_then(|d| d.decision()))
            .collect()
    }

    /// Transition histories of all tracked commands, for diagnostics.
    pub fn describe(&self) -> String {
        self.decisions
            .values()
            .map(|d| format!("{}: {}", d.id(), d.history()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Debug for DecisionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionTracker")
            .field("next_decision_event_id", &self.next_decision_event_id)
            .field("decisions", &self.decisions.len())
            .finish()
    }
}
