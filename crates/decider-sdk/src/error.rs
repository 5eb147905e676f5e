// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine and workflow error types.
//!
//! Two families are kept apart:
//! - [`EngineError`] - failures of the engine itself. Replay divergence,
//!   illegal decision transitions and resource exhaustion abort the decision
//!   task; they never complete the workflow.
//! - [`WorkflowError`] - outcomes observed by workflow code: cancellation,
//!   thread destruction, failed activities or child workflows and
//!   application failures. An [`EngineError`] raised inside workflow code
//!   travels as [`WorkflowError::Engine`] so it can be told apart from a
//!   workflow failure.

use decider_protocol::{ContinueAsNewWorkflowExecutionAttributes, MarkerError, TimeoutType};
use thiserror::Error;

/// Errors raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Configuration error (missing or invalid environment variable)
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid argument passed to an engine operation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A decision state machine received an event it cannot handle in its current state
    #[error("illegal state transition for {decision_id}: {event} in state {state}, history: {history}")]
    IllegalStateTransition {
        decision_id: String,
        event: String,
        state: String,
        history: String,
    },

    /// Operation invoked in the wrong lifecycle state
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// History does not match the decisions produced by workflow code
    #[error("non-deterministic workflow: {0}")]
    NonDeterministic(String),

    /// Side effect replayed without a recorded result
    #[error("no cached result found for SideEffect EventID={event_id}")]
    MissingSideEffectResult { event_id: i64 },

    /// Version recorded in history is outside the range the code supports
    #[error(
        "version {version} of change id {change_id} is not supported, supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedVersion {
        change_id: String,
        version: i32,
        min_supported: i32,
        max_supported: i32,
    },

    /// Marker payload could not be decoded
    #[error("marker decode error: {0}")]
    MarkerDecode(String),

    /// No execution thread available for a workflow thread
    #[error(
        "not enough threads to execute workflows, the limit of {max_threads} threads is reached"
    )]
    ThreadPoolExhausted { max_threads: usize },

    /// The OS refused to spawn an execution thread
    #[error("failed to spawn workflow thread: {0}")]
    ThreadSpawn(String),

    /// A workflow thread did not terminate when stopped
    #[error("workflow thread {name} did not stop, last stack:\n{stack_trace}")]
    StuckThread { name: String, stack_trace: String },

    /// A workflow thread tried to stop itself
    #[error("workflow thread {name} cannot stop itself")]
    SelfStop { name: String },

    /// No workflow registered under this type name
    #[error("unknown workflow type: {0}")]
    UnknownWorkflowType(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The decision task service call failed
    #[error("service error: {0}")]
    Service(String),

    /// Internal engine error
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable code reported as the cause of a failed decision task.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "CONFIG",
            EngineError::InvalidArgument(_) => "INVALID_ARGUMENT",
            EngineError::IllegalStateTransition { .. } => "ILLEGAL_STATE_TRANSITION",
            EngineError::IllegalState(_) => "ILLEGAL_STATE",
            EngineError::NonDeterministic(_) => "NON_DETERMINISTIC",
            EngineError::MissingSideEffectResult { .. } => "NON_DETERMINISTIC",
            EngineError::UnsupportedVersion { .. } => "UNSUPPORTED_VERSION",
            EngineError::MarkerDecode(_) => "MARKER_DECODE",
            EngineError::ThreadPoolExhausted { .. } => "RESOURCE_EXHAUSTED",
            EngineError::ThreadSpawn(_) => "RESOURCE_EXHAUSTED",
            EngineError::StuckThread { .. } => "STUCK_THREAD",
            EngineError::SelfStop { .. } => "ILLEGAL_STATE",
            EngineError::UnknownWorkflowType(_) => "UNKNOWN_WORKFLOW_TYPE",
            EngineError::Serialization(_) => "SERIALIZATION",
            EngineError::Service(_) => "SERVICE",
            EngineError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<MarkerError> for EngineError {
    fn from(err: MarkerError) -> Self {
        EngineError::MarkerDecode(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

/// Errors observed by workflow code.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    /// The enclosing cancellation scope was canceled
    #[error("canceled{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Cancelled { reason: Option<String> },

    /// The workflow thread is being torn down and must unwind
    #[error("workflow thread destroyed")]
    Destroyed,

    /// An activity completed with a failure
    #[error("activity {activity_type} failed: {reason}")]
    ActivityFailed {
        activity_type: String,
        reason: String,
        details: Vec<u8>,
    },

    /// An activity exceeded one of its timeouts
    #[error("activity {activity_type} timed out ({timeout_type:?})")]
    ActivityTimedOut {
        activity_type: String,
        timeout_type: TimeoutType,
    },

    /// A child workflow failed, timed out, was terminated or could not start
    #[error("child workflow {workflow_id} failed: {reason}")]
    ChildWorkflowFailed {
        workflow_id: String,
        reason: String,
        details: Vec<u8>,
    },

    /// Signalling or cancelling an external workflow failed
    #[error("external workflow {workflow_id}: {cause}")]
    ExternalWorkflowFailed { workflow_id: String, cause: String },

    /// Failure raised by workflow code
    #[error("{reason}")]
    Application { reason: String, details: Vec<u8> },

    /// Workflow code panicked
    #[error("workflow thread panicked: {0}")]
    Panicked(String),

    /// Workflow code asked to continue as a new run
    #[error("continue as new")]
    ContinueAsNew(Box<ContinueAsNewWorkflowExecutionAttributes>),

    /// Engine failure surfaced inside workflow code
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl WorkflowError {
    pub fn application(reason: impl Into<String>) -> Self {
        WorkflowError::Application {
            reason: reason.into(),
            details: Vec::new(),
        }
    }

    pub fn cancelled(reason: Option<String>) -> Self {
        WorkflowError::Cancelled { reason }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkflowError::Cancelled { .. })
    }

    /// Reason string and details used when failing the workflow execution.
    pub fn failure_details(&self) -> (String, Vec<u8>) {
        match self {
            WorkflowError::Application { reason, details } => (reason.clone(), details.clone()),
            WorkflowError::ActivityFailed { details, .. }
            | WorkflowError::ChildWorkflowFailed { details, .. } => {
                (self.to_string(), details.clone())
            }
            other => (other.to_string(), Vec::new()),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Engine(err.into())
    }
}

/// Type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Type alias for results returned to workflow code.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_side_effect_message() {
        let err = EngineError::MissingSideEffectResult { event_id: 12 };
        assert_eq!(
            err.to_string(),
            "no cached result found for SideEffect EventID=12"
        );
        assert_eq!(err.error_code(), "NON_DETERMINISTIC");
    }

    #[test]
    fn test_engine_error_stays_distinguishable() {
        let err: WorkflowError = EngineError::ThreadPoolExhausted { max_threads: 2 }.into();
        assert!(matches!(
            err,
            WorkflowError::Engine(EngineError::ThreadPoolExhausted { max_threads: 2 })
        ));
        assert!(!err.is_cancellation());
    }

    #[test]
    fn test_cancelled_display() {
        assert_eq!(WorkflowError::cancelled(None).to_string(), "canceled");
        assert_eq!(
            WorkflowError::cancelled(Some("shutdown".to_string())).to_string(),
            "canceled: shutdown"
        );
    }

    #[test]
    fn test_failure_details() {
        let err = WorkflowError::Application {
            reason: "bad input".to_string(),
            details: vec![1, 2],
        };
        assert_eq!(err.failure_details(), ("bad input".to_string(), vec![1, 2]));

        let err = WorkflowError::Panicked("boom".to_string());
        assert_eq!(
            err.failure_details(),
            ("workflow thread panicked: boom".to_string(), Vec::new())
        );
    }
}
