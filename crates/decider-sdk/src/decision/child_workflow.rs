// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use decider_protocol::{
    Decision, RequestCancelExternalWorkflowExecutionAttributes,
    StartChildWorkflowExecutionAttributes, WorkflowExecution,
};

use super::{
    CancellationCallback, DecisionId, DecisionState, DecisionStateMachine, StateMachineBase,
};
use crate::error::Result;

/// Tracks a child workflow from the start request until it closes.
///
/// Unlike activities a child has a distinct `Started` state; cancelling a
/// started child sends a cancellation request for its workflow id.
#[derive(Debug)]
pub struct ChildWorkflowDecisionStateMachine {
    base: StateMachineBase,
    attributes: StartChildWorkflowExecutionAttributes,
}

impl ChildWorkflowDecisionStateMachine {
    pub fn new(id: DecisionId, attributes: StartChildWorkflowExecutionAttributes) -> Self {
        Self {
            base: StateMachineBase::new(id),
            attributes,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.attributes.workflow_id
    }
}

impl DecisionStateMachine for ChildWorkflowDecisionStateMachine {
    fn base(&self) -> &StateMachineBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateMachineBase {
        &mut self.base
    }

    fn decision(&self) -> Option<Decision> {
        match self.base.state() {
            DecisionState::Created => Some(Decision::StartChildWorkflowExecution(
                self.attributes.clone(),
            )),
            DecisionState::CanceledAfterStarted => {
                Some(Decision::RequestCancelExternalWorkflowExecution(
                    RequestCancelExternalWorkflowExecutionAttributes {
                        domain: self.attributes.domain.clone(),
                        execution: WorkflowExecution::new(
                            self.attributes.workflow_id.clone(),
                            "",
                        ),
                        child_workflow_only: true,
                        control: Vec::new(),
                    },
                ))
            }
            _ => None,
        }
    }

    fn handle_decision_task_started_event(&mut self) {
        match self.base.state() {
            DecisionState::CanceledAfterStarted => self.base.transition(
                "handle_decision_task_started_event",
                DecisionState::CancellationDecisionSent,
            ),
            _ => self.base.handle_decision_task_started_event(),
        }
    }

    fn handle_started_event(&mut self) -> Result<()> {
        match self.base.state() {
            DecisionState::Initiated => {
                self.base
                    .transition("handle_started_event", DecisionState::Started)
            }
            DecisionState::CanceledAfterInitiated => self
                .base
                .transition("handle_started_event", DecisionState::CanceledAfterStarted),
            _ => self.base.note("handle_started_event"),
        }
        Ok(())
    }

    fn cancel(&mut self, immediate_cancellation_callback: Option<CancellationCallback>) -> Result<bool> {
        match self.base.state() {
            DecisionState::Started => {
                self.base
                    .transition("cancel", DecisionState::CanceledAfterStarted);
                Ok(true)
            }
            _ => self.base.cancel(immediate_cancellation_callback),
        }
    }

    fn handle_cancellation_failure_event(&mut self) -> Result<()> {
        match self.base.state() {
            DecisionState::CancellationDecisionSent => {
                self.base
                    .transition("handle_cancellation_failure_event", DecisionState::Started);
                Ok(())
            }
            _ => self.base.handle_cancellation_failure_event(),
        }
    }

    fn handle_cancellation_event(&mut self) -> Result<()> {
        match self.base.state() {
            DecisionState::Started => {
                self.base
                    .transition("handle_cancellation_event", DecisionState::Completed);
                Ok(())
            }
            _ => self.base.handle_cancellation_event(),
        }
    }

    fn handle_completion_event(&mut self) -> Result<()> {
        match self.base.state() {
            DecisionState::Started | DecisionState::CanceledAfterStarted => {
                self.base
                    .transition("handle_completion_event", DecisionState::Completed);
                Ok(())
            }
            _ => self.base.handle_completion_event(),
        }
    }
}
