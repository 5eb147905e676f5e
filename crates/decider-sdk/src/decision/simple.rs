// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use decider_protocol::Decision;

use super::{
    CancellationCallback, DecisionId, DecisionState, DecisionStateMachine, StateMachineBase,
};
use crate::error::{EngineError, Result};

/// Fire-and-forget commands: markers, search attribute upserts and the
/// commands closing the workflow. Sent once, confirmed by a single event.
#[derive(Debug)]
pub struct SimpleDecisionStateMachine {
    base: StateMachineBase,
    decision: Decision,
}

impl SimpleDecisionStateMachine {
    pub fn new(id: DecisionId, decision: Decision) -> Self {
        Self {
            base: StateMachineBase::new(id),
            decision,
        }
    }
}

impl DecisionStateMachine for SimpleDecisionStateMachine {
    fn base(&self) -> &StateMachineBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateMachineBase {
        &mut self.base
    }

    fn decision(&self) -> Option<Decision> {
        match self.base.state() {
            DecisionState::Created => Some(self.decision.clone()),
            _ => None,
        }
    }

    fn cancel(&mut self, _immediate_cancellation_callback: Option<CancellationCallback>) -> Result<bool> {
        Err(EngineError::InvalidArgument(format!(
            "{:?} cannot be canceled",
            self.decision.decision_type()
        )))
    }

    /// The recorded event is the whole lifecycle of these commands.
    fn handle_initiated_event(&mut self) -> Result<()> {
        match self.base.state() {
            DecisionState::DecisionSent => {
                self.base
                    .transition("handle_initiated_event", DecisionState::Completed);
                Ok(())
            }
            _ => Err(self.base.illegal("handle_initiated_event")),
        }
    }
}
