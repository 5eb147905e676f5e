// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cooperative workflow thread scheduler.
//!
//! Workflow code runs on real OS threads so it can block with an ordinary
//! call stack, but only one workflow thread of an execution makes progress
//! at a time, and only while the driver explicitly runs it:
//!
//! ```text
//! driver                          workflow thread
//!   run_until_blocked  ---run--->   resumes after yield_until
//!                                   ... workflow code ...
//!   returns            <--yield--   yield_until (condition false)
//! ```
//!
//! Unblock conditions are evaluated on the workflow thread while the driver
//! waits, so they observe state exactly at the point the driver chose.

mod context;
mod local;
mod pool;
mod runner;
mod scope;
mod thread;

pub use context::Status;
pub use local::WorkflowThreadLocal;
pub use pool::WorkflowThreadPool;
pub use runner::{DeterministicRunner, ROOT_THREAD_NAME};
pub use scope::CancellationScope;
pub use thread::{SpawnedThread, ThreadHandle, WorkflowThread};

use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, WorkflowError, WorkflowResult};

/// Body of a workflow thread.
pub type ThreadBody = Box<dyn FnOnce(&ThreadHandle) -> WorkflowResult<()> + Send>;

/// Source of virtual time in milliseconds, used for yield timeouts.
pub type ClockSource = Arc<dyn Fn() -> i64 + Send + Sync>;

/// How a workflow thread ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadOutcome {
    Completed,
    /// Cancelled on request of its own scope.
    Cancelled { reason: Option<String> },
    /// Destroyed on request during teardown.
    Stopped,
    /// Unhandled failure, including panics and unrequested cancellation.
    Failed(WorkflowError),
    /// Engine error escaped workflow code; aborts the decision task.
    Aborted(EngineError),
}

/// Result of a yield with a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldResult {
    ConditionMet,
    TimedOut,
}

impl YieldResult {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, YieldResult::TimedOut)
    }
}

/// Options for one execution's runner.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// How long a stopped thread may take to finish before it is reported stuck.
    pub stop_timeout: Duration,
    /// Capture a backtrace at every yield.
    pub capture_stack_traces: bool,
    /// Scheduler frames dropped from the top of a captured stack.
    pub stack_trace_omit_top: usize,
    /// Runtime frames dropped from the bottom of a captured stack.
    pub stack_trace_omit_bottom: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(10),
            capture_stack_traces: false,
            stack_trace_omit_top: 4,
            stack_trace_omit_bottom: 12,
        }
    }
}
