// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decision worker configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::scheduler::RunnerOptions;

/// Default limit of concurrently alive workflow threads per worker.
pub const DEFAULT_MAX_WORKFLOW_THREADS: usize = 600;

/// Configuration of a decision worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Domain the worker polls (default: "default")
    pub domain: String,
    /// Task list the worker polls (required)
    pub task_list: String,
    /// Identity reported to the service (default: "decider-<pid>")
    pub identity: String,
    /// Upper bound of workflow threads alive at once across all executions (default: 600)
    pub max_workflow_threads: usize,
    /// How long stopping a workflow thread may take before it is reported stuck (default: 10_000)
    pub stop_timeout_ms: u64,
    /// Capture a backtrace at every yield for stack trace queries (default: false)
    pub capture_stack_traces: bool,
    /// Delay before polling again after a failed poll, in milliseconds (default: 1_000)
    pub poll_backoff_ms: u64,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `DECIDER_TASK_LIST` - Task list to poll for decision tasks
    ///
    /// # Optional Environment Variables
    /// - `DECIDER_DOMAIN` - Domain (default: "default")
    /// - `DECIDER_IDENTITY` - Worker identity (default: "decider-<pid>")
    /// - `DECIDER_MAX_WORKFLOW_THREADS` - Workflow thread limit (default: 600)
    /// - `DECIDER_STOP_TIMEOUT_MS` - Thread stop timeout (default: 10000)
    /// - `DECIDER_CAPTURE_STACK_TRACES` - Capture backtraces at yields (default: false)
    /// - `DECIDER_POLL_BACKOFF_MS` - Backoff after a failed poll (default: 1000)
    pub fn from_env() -> Result<Self> {
        let task_list = env::var("DECIDER_TASK_LIST")
            .map_err(|_| EngineError::Config("DECIDER_TASK_LIST is required".to_string()))?;

        let domain = env::var("DECIDER_DOMAIN").unwrap_or_else(|_| "default".to_string());

        let identity = env::var("DECIDER_IDENTITY").unwrap_or_else(|_| default_identity());

        let max_workflow_threads =
            parse_env("DECIDER_MAX_WORKFLOW_THREADS", DEFAULT_MAX_WORKFLOW_THREADS)?;
        if max_workflow_threads == 0 {
            return Err(EngineError::Config(
                "DECIDER_MAX_WORKFLOW_THREADS must be greater than 0".to_string(),
            ));
        }

        let stop_timeout_ms = parse_env("DECIDER_STOP_TIMEOUT_MS", 10_000)?;

        let capture_stack_traces = env::var("DECIDER_CAPTURE_STACK_TRACES")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let poll_backoff_ms = parse_env("DECIDER_POLL_BACKOFF_MS", 1_000)?;

        Ok(Self {
            domain,
            task_list,
            identity,
            max_workflow_threads,
            stop_timeout_ms,
            capture_stack_traces,
            poll_backoff_ms,
        })
    }

    /// Create a configuration with defaults for the given task list.
    pub fn new(task_list: impl Into<String>) -> Self {
        Self {
            domain: "default".to_string(),
            task_list: task_list.into(),
            identity: default_identity(),
            max_workflow_threads: DEFAULT_MAX_WORKFLOW_THREADS,
            stop_timeout_ms: 10_000,
            capture_stack_traces: false,
            poll_backoff_ms: 1_000,
        }
    }

    /// Set the domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the worker identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Set the workflow thread limit.
    pub fn with_max_workflow_threads(mut self, max: usize) -> Self {
        self.max_workflow_threads = max;
        self
    }

    /// Set the thread stop timeout.
    pub fn with_stop_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.stop_timeout_ms = timeout_ms;
        self
    }

    /// Enable or disable backtrace capture at yields.
    pub fn with_capture_stack_traces(mut self, capture: bool) -> Self {
        self.capture_stack_traces = capture;
        self
    }

    /// Set the backoff after a failed poll.
    pub fn with_poll_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.poll_backoff_ms = backoff_ms;
        self
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms)
    }

    /// Options for the per-execution thread runner.
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            stop_timeout: self.stop_timeout(),
            capture_stack_traces: self.capture_stack_traces,
            ..RunnerOptions::default()
        }
    }
}

fn default_identity() -> String {
    format!("decider-{}", std::process::id())
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|e| EngineError::Config(format!("invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
