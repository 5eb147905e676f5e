// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Commands aimed at other workflow executions.

use decider_protocol::{
    Decision, RequestCancelExternalWorkflowExecutionAttributes,
    SignalExternalWorkflowExecutionAttributes,
};

use super::{
    CancellationCallback, DecisionId, DecisionState, DecisionStateMachine, StateMachineBase,
};
use crate::error::{EngineError, Result};

/// Tracks a signal sent to another workflow.
///
/// A signal cannot be recalled once sent; cancelling it only stops waiting
/// for the delivery confirmation.
#[derive(Debug)]
pub struct SignalDecisionStateMachine {
    base: StateMachineBase,
    attributes: SignalExternalWorkflowExecutionAttributes,
}

impl SignalDecisionStateMachine {
    pub fn new(id: DecisionId, attributes: SignalExternalWorkflowExecutionAttributes) -> Self {
        Self {
            base: StateMachineBase::new(id),
            attributes,
        }
    }
}

impl DecisionStateMachine for SignalDecisionStateMachine {
    fn base(&self) -> &StateMachineBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateMachineBase {
        &mut self.base
    }

    fn decision(&self) -> Option<Decision> {
        match self.base.state() {
            DecisionState::Created => Some(Decision::SignalExternalWorkflowExecution(
                self.attributes.clone(),
            )),
            _ => None,
        }
    }

    fn cancel(&mut self, immediate_cancellation_callback: Option<CancellationCallback>) -> Result<bool> {
        match self.base.state() {
            DecisionState::Created | DecisionState::DecisionSent | DecisionState::Initiated => {
                self.base.transition("cancel", DecisionState::Completed);
                if let Some(callback) = immediate_cancellation_callback {
                    callback();
                }
                Ok(false)
            }
            _ => self.base.cancel(immediate_cancellation_callback),
        }
    }

    fn handle_completion_event(&mut self) -> Result<()> {
        match self.base.state() {
            DecisionState::Initiated => {
                self.base
                    .transition("handle_completion_event", DecisionState::Completed);
                Ok(())
            }
            // Canceled locally after sending; the confirmation is ignored.
            DecisionState::Completed => {
                self.base.note("handle_completion_event");
                Ok(())
            }
            _ => self.base.handle_completion_event(),
        }
    }

    fn handle_initiated_event(&mut self) -> Result<()> {
        match self.base.state() {
            DecisionState::Completed => {
                self.base.note("handle_initiated_event");
                Ok(())
            }
            _ => self.base.handle_initiated_event(),
        }
    }
}

/// Tracks a cancellation request sent to another workflow.
#[derive(Debug)]
pub struct CancelExternalDecisionStateMachine {
    base: StateMachineBase,
    attributes: RequestCancelExternalWorkflowExecutionAttributes,
}

impl CancelExternalDecisionStateMachine {
    pub fn new(
        id: DecisionId,
        attributes: RequestCancelExternalWorkflowExecutionAttributes,
    ) -> Self {
        Self {
            base: StateMachineBase::new(id),
            attributes,
        }
    }
}

impl DecisionStateMachine for CancelExternalDecisionStateMachine {
    fn base(&self) -> &StateMachineBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateMachineBase {
        &mut self.base
    }

    fn decision(&self) -> Option<Decision> {
        match self.base.state() {
            DecisionState::Created => Some(Decision::RequestCancelExternalWorkflowExecution(
                self.attributes.clone(),
            )),
            _ => None,
        }
    }

    fn cancel(&mut self, _immediate_cancellation_callback: Option<CancellationCallback>) -> Result<bool> {
        Err(EngineError::InvalidArgument(
            "cancellation of an external workflow cancellation request is not supported"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionTarget;
    use decider_protocol::WorkflowExecution;

    #[test]
    fn test_signal_lifecycle() {
        let mut sm = SignalDecisionStateMachine::new(
            DecisionId::new(DecisionTarget::SignalExternalWorkflow, 6),
            SignalExternalWorkflowExecutionAttributes {
                execution: WorkflowExecution::new("other", ""),
                signal_name: "ping".to_string(),
                ..Default::default()
            },
        );
        assert!(matches!(
            sm.decision(),
            Some(Decision::SignalExternalWorkflowExecution(_))
        ));
        sm.handle_decision_task_started_event();
        sm.handle_initiated_event().unwrap();
        sm.handle_completion_event().unwrap();
        assert!(sm.is_done());
    }

    #[test]
    fn test_signal_cancel_after_send_ignores_confirmation() {
        let mut sm = SignalDecisionStateMachine::new(
            DecisionId::new(DecisionTarget::SignalExternalWorkflow, 6),
            SignalExternalWorkflowExecutionAttributes::default(),
        );
        sm.handle_decision_task_started_event();
        assert!(!sm.cancel(None).unwrap());
        assert!(sm.is_done());

        sm.handle_initiated_event().unwrap();
        sm.handle_completion_event().unwrap();
        assert_eq!(sm.state(), DecisionState::Completed);
    }

    #[test]
    fn test_cancel_request_cannot_be_canceled() {
        let mut sm = CancelExternalDecisionStateMachine::new(
            DecisionId::new(DecisionTarget::CancelExternalWorkflow, 6),
            RequestCancelExternalWorkflowExecutionAttributes::default(),
        );
        assert!(matches!(
            sm.cancel(None),
            Err(EngineError::InvalidArgument(_))
        ));
        assert_eq!(sm.state(), DecisionState::Created);

        sm.handle_decision_task_started_event();
        sm.handle_initiated_event().unwrap();
        sm.handle_completion_event().unwrap();
        assert!(sm.is_done());
    }
}
