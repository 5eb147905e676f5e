// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Options for activities and child workflows started from workflow code.

use std::time::Duration;

/// Whole seconds, rounded up. Service timeouts have second granularity.
pub(crate) fn duration_to_seconds(duration: Duration) -> i64 {
    let seconds = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

fn timeout_seconds(duration: Option<Duration>) -> Option<i32> {
    duration.map(|d| i32::try_from(duration_to_seconds(d)).unwrap_or(i32::MAX))
}

/// How to schedule an activity.
#[derive(Debug, Clone, Default)]
pub struct ActivityOptions {
    pub activity_type: String,
    /// Generated from the execution's id counter when unset.
    pub activity_id: Option<String>,
    /// Defaults to the workflow's task list.
    pub task_list: Option<String>,
    pub domain: Option<String>,
    pub schedule_to_close_timeout: Option<Duration>,
    pub schedule_to_start_timeout: Option<Duration>,
    pub start_to_close_timeout: Option<Duration>,
    pub heartbeat_timeout: Option<Duration>,
}

impl ActivityOptions {
    pub fn new(activity_type: impl Into<String>) -> Self {
        Self {
            activity_type: activity_type.into(),
            ..Default::default()
        }
    }

    pub fn with_activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = Some(task_list.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_schedule_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_close_timeout = Some(timeout);
        self
    }

    pub fn with_schedule_to_start_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_start_timeout = Some(timeout);
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = Some(timeout);
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }

    pub(crate) fn timeouts(&self) -> [Option<i32>; 4] {
        [
            timeout_seconds(self.schedule_to_close_timeout),
            timeout_seconds(self.schedule_to_start_timeout),
            timeout_seconds(self.start_to_close_timeout),
            timeout_seconds(self.heartbeat_timeout),
        ]
    }
}

/// How to start a child workflow.
#[derive(Debug, Clone, Default)]
pub struct ChildWorkflowOptions {
    pub workflow_type: String,
    /// Derived from the parent's workflow id when unset.
    pub workflow_id: Option<String>,
    /// Defaults to the parent's domain.
    pub domain: Option<String>,
    /// Defaults to the parent's task list.
    pub task_list: Option<String>,
    pub execution_start_to_close_timeout: Option<Duration>,
    pub task_start_to_close_timeout: Option<Duration>,
}

impl ChildWorkflowOptions {
    pub fn new(workflow_type: impl Into<String>) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            ..Default::default()
        }
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = Some(task_list.into());
        self
    }

    pub fn with_execution_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.execution_start_to_close_timeout = Some(timeout);
        self
    }

    pub fn with_task_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.task_start_to_close_timeout = Some(timeout);
        self
    }

    pub(crate) fn timeouts(&self) -> (Option<i32>, Option<i32>) {
        (
            timeout_seconds(self.execution_start_to_close_timeout),
            timeout_seconds(self.task_start_to_close_timeout),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations_round_up_to_seconds() {
        assert_eq!(duration_to_seconds(Duration::from_secs(5)), 5);
        assert_eq!(duration_to_seconds(Duration::from_millis(5_001)), 6);
        assert_eq!(duration_to_seconds(Duration::from_millis(1)), 1);
        assert_eq!(duration_to_seconds(Duration::ZERO), 0);
    }

    #[test]
    fn test_activity_timeouts() {
        let options = ActivityOptions::new("charge")
            .with_start_to_close_timeout(Duration::from_millis(1_500))
            .with_heartbeat_timeout(Duration::from_secs(10));
        assert_eq!(options.timeouts(), [None, None, Some(2), Some(10)]);
    }
}
