// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decision task envelope handed to a decider.

use serde::{Deserialize, Serialize};

use crate::WorkflowExecution;
use crate::event::HistoryEvent;

/// One unit of decider work: the full history of an execution up to and
/// including the `DecisionTaskStarted` event of this task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionTask {
    /// Opaque token echoed back when responding.
    pub task_token: Vec<u8>,
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: String,
    pub previous_started_event_id: i64,
    pub started_event_id: i64,
    pub history: Vec<HistoryEvent>,
}

impl DecisionTask {
    /// Whether the history covers more than the initial decision task.
    pub fn is_replay(&self) -> bool {
        self.previous_started_event_id > 0
    }
}
