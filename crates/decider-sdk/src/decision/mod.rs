// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decision state machines.
//!
//! Every command a workflow issues (schedule an activity, start a timer,
//! record a marker...) is tracked by a state machine that follows it from
//! creation, through the decision task that sends it, to the history events
//! that confirm, complete or cancel it.
//!
//! ```text
//! Created --decision task started--> DecisionSent --initiated--> Initiated --completed--> Completed
//!    |                                    |                          |
//!  cancel                               cancel                     cancel
//!    v                                    v                          v
//! Completed                 CanceledBeforeInitiated       CanceledAfterInitiated
//!                                                                    |
//!                                                         decision task started
//!                                                                    v
//!                                                       CancellationDecisionSent
//! ```
//!
//! The shared transitions live in [`StateMachineBase`]; variants override
//! the edges that differ for their command.

mod activity;
mod child_workflow;
mod external;
mod simple;
mod timer;

pub use activity::ActivityDecisionStateMachine;
pub use child_workflow::ChildWorkflowDecisionStateMachine;
pub use external::{CancelExternalDecisionStateMachine, SignalDecisionStateMachine};
pub use simple::SimpleDecisionStateMachine;
pub use timer::TimerDecisionStateMachine;

use std::fmt;

use decider_protocol::Decision;

use crate::error::{EngineError, Result};

/// Callback run when a cancellation takes effect without a round trip to the service.
pub type CancellationCallback = Box<dyn FnOnce() + Send>;

/// Kind of command a decision state machine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DecisionTarget {
    Activity,
    ChildWorkflow,
    CancelExternalWorkflow,
    SignalExternalWorkflow,
    Timer,
    Marker,
    UpsertSearchAttributes,
    /// Completion of the workflow execution itself.
    Workflow,
}

/// Identity of a tracked command.
///
/// `event_id` is the history event id the command's initiating event gets
/// once the decision task completes. Ids are allocated in strictly
/// increasing order, so ordering by id is creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecisionId {
    pub target: DecisionTarget,
    pub event_id: i64,
}

impl DecisionId {
    pub fn new(target: DecisionTarget, event_id: i64) -> Self {
        Self { target, event_id }
    }
}

impl Ord for DecisionId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.event_id
            .cmp(&other.event_id)
            .then(self.target.cmp(&other.target))
    }
}

impl PartialOrd for DecisionId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.target, self.event_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionState {
    Created,
    DecisionSent,
    CanceledBeforeInitiated,
    Initiated,
    Started,
    CanceledAfterInitiated,
    CanceledAfterStarted,
    CancellationDecisionSent,
    CompletedAfterCancellationDecisionSent,
    Completed,
}

impl fmt::Display for DecisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecisionState::Created => "CREATED",
            DecisionState::DecisionSent => "DECISION_SENT",
            DecisionState::CanceledBeforeInitiated => "CANCELED_BEFORE_INITIATED",
            DecisionState::Initiated => "INITIATED",
            DecisionState::Started => "STARTED",
            DecisionState::CanceledAfterInitiated => "CANCELED_AFTER_INITIATED",
            DecisionState::CanceledAfterStarted => "CANCELED_AFTER_STARTED",
            DecisionState::CancellationDecisionSent => "CANCELLATION_DECISION_SENT",
            DecisionState::CompletedAfterCancellationDecisionSent => {
                "COMPLETED_AFTER_CANCELLATION_DECISION_SENT"
            }
            DecisionState::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// State and transition history shared by every variant.
#[derive(Debug)]
pub struct StateMachineBase {
    id: DecisionId,
    state: DecisionState,
    history: Vec<String>,
}

impl StateMachineBase {
    pub fn new(id: DecisionId) -> Self {
        Self {
            id,
            state: DecisionState::Created,
            history: vec![DecisionState::Created.to_string()],
        }
    }

    pub fn id(&self) -> &DecisionId {
        &self.id
    }

    pub fn state(&self) -> DecisionState {
        self.state
    }

    /// Record `event` and move to `state`.
    pub fn transition(&mut self, event: &str, state: DecisionState) {
        self.history.push(event.to_string());
        self.state = state;
        self.history.push(state.to_string());
    }

    /// Record `event` without changing state.
    pub fn note(&mut self, event: &str) {
        self.history.push(event.to_string());
    }

    pub fn history(&self) -> String {
        self.history.join(" -> ")
    }

    pub fn illegal(&self, event: &str) -> EngineError {
        EngineError::IllegalStateTransition {
            decision_id: self.id.to_string(),
            event: event.to_string(),
            state: self.state.to_string(),
            history: self.history(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self.state,
            DecisionState::Completed | DecisionState::CompletedAfterCancellationDecisionSent
        )
    }

    pub fn cancel(&mut self, immediate_cancellation_callback: Option<CancellationCallback>) -> Result<bool> {
        match self.state {
            DecisionState::Created => {
                self.transition("cancel", DecisionState::Completed);
                if let Some(callback) = immediate_cancellation_callback {
                    callback();
                }
                Ok(false)
            }
            DecisionState::DecisionSent => {
                self.transition("cancel", DecisionState::CanceledBeforeInitiated);
                Ok(true)
            }
            DecisionState::Initiated => {
                self.transition("cancel", DecisionState::CanceledAfterInitiated);
                Ok(true)
            }
            DecisionState::Completed | DecisionState::CompletedAfterCancellationDecisionSent => {
                self.note("cancel");
                Ok(false)
            }
            _ => Err(self.illegal("cancel")),
        }
    }

    pub fn handle_initiated_event(&mut self) -> Result<()> {
        match self.state {
            DecisionState::DecisionSent => {
                self.transition("handle_initiated_event", DecisionState::Initiated)
            }
            DecisionState::CanceledBeforeInitiated => self.transition(
                "handle_initiated_event",
                DecisionState::CanceledAfterInitiated,
            ),
            _ => return Err(self.illegal("handle_initiated_event")),
        }
        Ok(())
    }

    pub fn handle_initiation_failed_event(&mut self) -> Result<()> {
        match self.state {
            DecisionState::Initiated
            | DecisionState::DecisionSent
            | DecisionState::CanceledBeforeInitiated => {
                self.transition("handle_initiation_failed_event", DecisionState::Completed);
                Ok(())
            }
            _ => Err(self.illegal("handle_initiation_failed_event")),
        }
    }

    pub fn handle_started_event(&mut self) -> Result<()> {
        self.note("handle_started_event");
        Ok(())
    }

    pub fn handle_completion_event(&mut self) -> Result<()> {
        match self.state {
            DecisionState::CanceledAfterInitiated | DecisionState::Initiated => {
                self.transition("handle_completion_event", DecisionState::Completed)
            }
            DecisionState::CancellationDecisionSent => self.transition(
                "handle_completion_event",
                DecisionState::CompletedAfterCancellationDecisionSent,
            ),
            _ => return Err(self.illegal("handle_completion_event")),
        }
        Ok(())
    }

    pub fn handle_cancellation_initiated_event(&mut self) -> Result<()> {
        match self.state {
            DecisionState::CancellationDecisionSent => {
                self.note("handle_cancellation_initiated_event");
                Ok(())
            }
            _ => Err(self.illegal("handle_cancellation_initiated_event")),
        }
    }

    pub fn handle_cancellation_failure_event(&mut self) -> Result<()> {
        match self.state {
            DecisionState::CompletedAfterCancellationDecisionSent => {
                self.transition(
                    "handle_cancellation_failure_event",
                    DecisionState::Completed,
                );
                Ok(())
            }
            _ => Err(self.illegal("handle_cancellation_failure_event")),
        }
    }

    pub fn handle_cancellation_event(&mut self) -> Result<()> {
        match self.state {
            DecisionState::CancellationDecisionSent => {
                self.transition("handle_cancellation_event", DecisionState::Completed);
                Ok(())
            }
            _ => Err(self.illegal("handle_cancellation_event")),
        }
    }

    pub fn handle_decision_task_started_event(&mut self) {
        if self.state == DecisionState::Created {
            self.transition(
                "handle_decision_task_started_event",
                DecisionState::DecisionSent,
            );
        }
    }
}

/// A tracked command.
///
/// Default methods forward to [`StateMachineBase`]; implementors override
/// the transitions specific to their command.
pub trait DecisionStateMachine: Send {
    fn base(&self) -> &StateMachineBase;

    fn base_mut(&mut self) -> &mut StateMachineBase;

    /// Command to send in the current state, if any.
    fn decision(&self) -> Option<Decision>;

    fn id(&self) -> &DecisionId {
        self.base().id()
    }

    fn state(&self) -> DecisionState {
        self.base().state()
    }

    fn is_done(&self) -> bool {
        self.base().is_done()
    }

    /// Human readable transition history.
    fn history(&self) -> String {
        self.base().history()
    }

    /// Request cancellation. Returns `true` when a cancellation request
    /// will be sent to the service; the callback runs when the command is
    /// dropped without ever reaching the service. Canceling a command that
    /// already terminated does nothing and returns `false`.
    fn cancel(&mut self, immediate_cancellation_callback: Option<CancellationCallback>) -> Result<bool> {
        self.base_mut().cancel(immediate_cancellation_callback)
    }

    fn handle_initiated_event(&mut self) -> Result<()> {
        self.base_mut().handle_initiated_event()
    }

    fn handle_initiation_failed_event(&mut self) -> Result<()> {
        self.base_mut().handle_initiation_failed_event()
    }

    fn handle_started_event(&mut self) -> Result<()> {
        self.base_mut().handle_started_event()
    }

    fn handle_completion_event(&mut self) -> Result<()> {
        self.base_mut().handle_completion_event()
    }

    fn handle_cancellation_initiated_event(&mut self) -> Result<()> {
        self.base_mut().handle_cancellation_initiated_event()
    }

    fn handle_cancellation_failure_event(&mut self) -> Result<()> {
        self.base_mut().handle_cancellation_failure_event()
    }

    fn handle_cancellation_event(&mut self) -> Result<()> {
        self.base_mut().handle_cancellation_event()
    }

    /// Called once per decision task boundary, after the commands produced
    /// by the previous batch have been sent.
    fn handle_decision_task_started_event(&mut self) {
        self.base_mut().handle_decision_task_started_event()
    }
}
