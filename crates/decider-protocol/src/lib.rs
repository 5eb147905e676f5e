// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decider protocol - the data exchanged between a decider and the workflow service.
//!
//! This crate contains:
//! - Decisions (commands) a decider sends back when completing a decision task
//! - History events the service records and replays to the decider
//! - The closed vocabulary of marker names and the marker payload codec
//! - The decision task envelope
//!
//! There is no transport here. A wire layer can serialize these types with
//! serde; the engine in `decider-sdk` only consumes and produces them.

pub mod decision;
pub mod event;
pub mod marker;
pub mod task;

pub use decision::*;
pub use event::*;
pub use marker::{
    DEFAULT_VERSION, LOCAL_ACTIVITY_MARKER_NAME, LocalActivityMarkerData,
    MUTABLE_SIDE_EFFECT_MARKER_NAME, MarkerError, MarkerName, MarkerPayload,
    SIDE_EFFECT_MARKER_NAME, VERSION_MARKER_NAME,
};
pub use task::DecisionTask;

/// Identifies one run of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    /// Empty when the run is not known (e.g. signalling the current run).
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}
