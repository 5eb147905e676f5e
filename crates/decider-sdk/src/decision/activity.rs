// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use decider_protocol::{
    Decision, RequestCancelActivityTaskAttributes, ScheduleActivityTaskAttributes,
};

use super::{DecisionId, DecisionState, DecisionStateMachine, StateMachineBase};
use crate::error::Result;

/// Tracks a scheduled activity task.
#[derive(Debug)]
pub struct ActivityDecisionStateMachine {
    base: StateMachineBase,
    attributes: ScheduleActivityTaskAttributes,
}

impl ActivityDecisionStateMachine {
    pub fn new(id: DecisionId, attributes: ScheduleActivityTaskAttributes) -> Self {
        Self {
            base: StateMachineBase::new(id),
            attributes,
        }
    }

    pub fn activity_id(&self) -> &str {
        &self.attributes.activity_id
    }
}

impl DecisionStateMachine for ActivityDecisionStateMachine {
    fn base(&self) -> &StateMachineBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateMachineBase {
        &mut self.base
    }

    fn decision(&self) -> Option<Decision> {
        match self.base.state() {
            DecisionState::Created => Some(Decision::ScheduleActivityTask(self.attributes.clone())),
            DecisionState::CanceledAfterInitiated => Some(Decision::RequestCancelActivityTask(
                RequestCancelActivityTaskAttributes {
                    activity_id: self.attributes.activity_id.clone(),
                },
            )),
            _ => None,
        }
    }

    fn handle_decision_task_started_event(&mut self) {
        match self.base.state() {
            DecisionState::CanceledAfterInitiated => self.base.transition(
                "handle_decision_task_started_event",
                DecisionState::CancellationDecisionSent,
            ),
            _ => self.base.handle_decision_task_started_event(),
        }
    }

    fn handle_cancellation_failure_event(&mut self) -> Result<()> {
        match self.base.state() {
            DecisionState::CancellationDecisionSent => {
                self.base.transition(
                    "handle_cancellation_failure_event",
                    DecisionState::Initiated,
                );
                Ok(())
            }
            _ => self.base.handle_cancellation_failure_event(),
        }
    }
}
