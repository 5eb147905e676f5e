// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decisions sent to the service when a decision task completes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::WorkflowExecution;

/// Discriminant of a [`Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionType {
    ScheduleActivityTask,
    RequestCancelActivityTask,
    StartTimer,
    CancelTimer,
    RecordMarker,
    StartChildWorkflowExecution,
    RequestCancelExternalWorkflowExecution,
    SignalExternalWorkflowExecution,
    CompleteWorkflowExecution,
    FailWorkflowExecution,
    CancelWorkflowExecution,
    ContinueAsNewWorkflowExecution,
    UpsertWorkflowSearchAttributes,
}

impl DecisionType {
    /// Whether this decision closes the workflow execution.
    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            DecisionType::CompleteWorkflowExecution
                | DecisionType::FailWorkflowExecution
                | DecisionType::CancelWorkflowExecution
                | DecisionType::ContinueAsNewWorkflowExecution
        )
    }
}

/// A command produced by a decider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "attributes")]
pub enum Decision {
    ScheduleActivityTask(ScheduleActivityTaskAttributes),
    RequestCancelActivityTask(RequestCancelActivityTaskAttributes),
    StartTimer(StartTimerAttributes),
    CancelTimer(CancelTimerAttributes),
    RecordMarker(RecordMarkerAttributes),
    StartChildWorkflowExecution(StartChildWorkflowExecutionAttributes),
    RequestCancelExternalWorkflowExecution(RequestCancelExternalWorkflowExecutionAttributes),
    SignalExternalWorkflowExecution(SignalExternalWorkflowExecutionAttributes),
    CompleteWorkflowExecution(CompleteWorkflowExecutionAttributes),
    FailWorkflowExecution(FailWorkflowExecutionAttributes),
    CancelWorkflowExecution(CancelWorkflowExecutionAttributes),
    ContinueAsNewWorkflowExecution(ContinueAsNewWorkflowExecutionAttributes),
    UpsertWorkflowSearchAttributes(UpsertWorkflowSearchAttributesAttributes),
}

impl Decision {
    pub fn decision_type(&self) -> DecisionType {
        match self {
            Decision::ScheduleActivityTask(_) => DecisionType::ScheduleActivityTask,
            Decision::RequestCancelActivityTask(_) => DecisionType::RequestCancelActivityTask,
            Decision::StartTimer(_) => DecisionType::StartTimer,
            Decision::CancelTimer(_) => DecisionType::CancelTimer,
            Decision::RecordMarker(_) => DecisionType::RecordMarker,
            Decision::StartChildWorkflowExecution(_) => DecisionType::StartChildWorkflowExecution,
            Decision::RequestCancelExternalWorkflowExecution(_) => {
                DecisionType::RequestCancelExternalWorkflowExecution
            }
            Decision::SignalExternalWorkflowExecution(_) => {
                DecisionType::SignalExternalWorkflowExecution
            }
            Decision::CompleteWorkflowExecution(_) => DecisionType::CompleteWorkflowExecution,
            Decision::FailWorkflowExecution(_) => DecisionType::FailWorkflowExecution,
            Decision::CancelWorkflowExecution(_) => DecisionType::CancelWorkflowExecution,
            Decision::ContinueAsNewWorkflowExecution(_) => {
                DecisionType::ContinueAsNewWorkflowExecution
            }
            Decision::UpsertWorkflowSearchAttributes(_) => {
                DecisionType::UpsertWorkflowSearchAttributes
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleActivityTaskAttributes {
    pub activity_id: String,
    pub activity_type: String,
    pub domain: Option<String>,
    pub task_list: String,
    pub input: Vec<u8>,
    pub schedule_to_close_timeout_seconds: Option<i32>,
    pub schedule_to_start_timeout_seconds: Option<i32>,
    pub start_to_close_timeout_seconds: Option<i32>,
    pub heartbeat_timeout_seconds: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestCancelActivityTaskAttributes {
    pub activity_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartTimerAttributes {
    pub timer_id: String,
    pub start_to_fire_timeout_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CancelTimerAttributes {
    pub timer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordMarkerAttributes {
    pub marker_name: String,
    pub details: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StartChildWorkflowExecutionAttributes {
    pub domain: String,
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_list: String,
    pub input: Vec<u8>,
    pub execution_start_to_close_timeout_seconds: Option<i32>,
    pub task_start_to_close_timeout_seconds: Option<i32>,
    /// Opaque control value echoed back in child events.
    pub control: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestCancelExternalWorkflowExecutionAttributes {
    pub domain: String,
    pub execution: WorkflowExecution,
    pub child_workflow_only: bool,
    pub control: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignalExternalWorkflowExecutionAttributes {
    pub domain: String,
    pub execution: WorkflowExecution,
    pub signal_name: String,
    pub input: Vec<u8>,
    pub child_workflow_only: bool,
    pub control: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompleteWorkflowExecutionAttributes {
    pub result: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailWorkflowExecutionAttributes {
    pub reason: String,
    pub details: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CancelWorkflowExecutionAttributes {
    pub details: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContinueAsNewWorkflowExecutionAttributes {
    pub workflow_type: String,
    pub task_list: String,
    pub input: Vec<u8>,
    pub execution_start_to_close_timeout_seconds: Option<i32>,
    pub task_start_to_close_timeout_seconds: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpsertWorkflowSearchAttributesAttributes {
    pub search_attributes: BTreeMap<String, Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_type_matches_variant() {
        let decision = Decision::StartTimer(StartTimerAttributes {
            timer_id: "1".to_string(),
            start_to_fire_timeout_seconds: 10,
        });
        assert_eq!(decision.decision_type(), DecisionType::StartTimer);
        assert!(!decision.decision_type().is_completion());
    }

    #[test]
    fn test_completion_decision_types() {
        assert!(DecisionType::CompleteWorkflowExecution.is_completion());
        assert!(DecisionType::FailWorkflowExecution.is_completion());
        assert!(DecisionType::CancelWorkflowExecution.is_completion());
        assert!(DecisionType::ContinueAsNewWorkflowExecution.is_completion());
        assert!(!DecisionType::RecordMarker.is_completion());
    }

    #[test]
    fn test_decision_serializes_with_type_tag() {
        let decision = Decision::CancelTimer(CancelTimerAttributes {
            timer_id: "7".to_string(),
        });
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["type"], "CancelTimer");
        assert_eq!(json["attributes"]["timer_id"], "7");
    }
}
