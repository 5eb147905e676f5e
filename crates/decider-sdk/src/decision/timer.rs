// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use decider_protocol::{CancelTimerAttributes, Decision, StartTimerAttributes};

use super::{
    CancellationCallback, DecisionId, DecisionState, DecisionStateMachine, StateMachineBase,
};
use crate::error::Result;

/// Tracks a durable timer.
///
/// A timer counts as canceled the moment cancellation is requested: the
/// callback runs immediately and the machine reports done even while the
/// `CancelTimer` command is still in flight.
#[derive(Debug)]
pub struct TimerDecisionStateMachine {
    base: StateMachineBase,
    attributes: StartTimerAttributes,
    canceled: bool,
}

impl TimerDecisionStateMachine {
    pub fn new(id: DecisionId, attributes: StartTimerAttributes) -> Self {
        Self {
            base: StateMachineBase::new(id),
            attributes,
            canceled: false,
        }
    }

    pub fn timer_id(&self) -> &str {
        &self.attributes.timer_id
    }
}

impl DecisionStateMachine for TimerDecisionStateMachine {
    fn base(&self) -> &StateMachineBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateMachineBase {
        &mut self.base
    }

    fn decision(&self) -> Option<Decision> {
        match self.base.state() {
            DecisionState::Created => Some(Decision::StartTimer(self.attributes.clone())),
            DecisionState::CanceledAfterInitiated => {
                Some(Decision::CancelTimer(CancelTimerAttributes {
                    timer_id: self.attributes.timer_id.clone(),
                }))
            }
            _ => None,
        }
    }

    fn is_done(&self) -> bool {
        self.base.state() == DecisionState::Completed || self.canceled
    }

    fn cancel(&mut self, immediate_cancellation_callback: Option<CancellationCallback>) -> Result<bool> {
        if self.base.is_done() {
            return self.base.cancel(None);
        }
        let pending = self.base.cancel(None)?;
        self.canceled = true;
        if let Some(callback) = immediate_cancellation_callback {
            callback();
        }
        Ok(pending)
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
                self.canceled = false;
                Ok(())
            }
            _ => self.base.handle_cancellation_failure_event(),
        }
    }
}
