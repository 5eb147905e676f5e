// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decider SDK - deterministic workflow execution engine.
//!
//! Workflow code is ordinary blocking Rust running on cooperative workflow
//! threads. Its state is never persisted: every decision task replays the
//! execution's full history, re-running the workflow code and checking each
//! command it produces against the events the service recorded. Only the
//! commands produced past the end of history are sent back.
//!
//! # Components
//!
//! - **Decision state machines** ([`decision`]): lifecycle of each command
//!   from creation to completion, including cancellation races
//! - **Decision tracker** ([`tracker`]): owns the state machines, predicts
//!   event ids and routes history events to them
//! - **Clock context** ([`clock`]): virtual time, timers, side effects,
//!   mutable side effects and versioning
//! - **Scheduler** ([`scheduler`]): workflow threads that run one at a time
//!   under the control of a deterministic runner
//! - **Replay decider** ([`ReplayDecider`]): drives all of the above over a
//!   history, one decision task batch at a time
//! - **Worker** ([`DecisionWorker`]): polls decision tasks and responds
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use decider_sdk::{ActivityOptions, DecisionWorker, WorkerConfig, WorkflowRegistry};
//!
//! let mut registry = WorkflowRegistry::new();
//! registry.register("greeting", |ctx, thread, input| {
//!     ctx.sleep(thread, Duration::from_secs(60))?;
//!     ctx.execute_activity(thread, ActivityOptions::new("send-greeting"), input)
//! })?;
//!
//! let worker = DecisionWorker::new(WorkerConfig::from_env()?, Arc::new(registry), service);
//! worker.run().await;
//! ```
//!
//! # Determinism
//!
//! Workflow code must read time through [`WorkflowContext::current_time_millis`],
//! wait only through the context or its [`ThreadHandle`], and run anything
//! non-deterministic inside [`WorkflowContext::side_effect`]. A replay that
//! produces a different command than history fails the decision task with
//! [`EngineError::NonDeterministic`].

pub mod clock;
mod config;
mod context;
mod decider;
pub mod decision;
mod error;
pub mod history;
mod options;
mod promise;
mod registry;
pub mod scheduler;
pub mod testing;
pub mod tracker;
mod worker;
mod workflow;

pub use config::WorkerConfig;
pub use context::WorkflowInfo;
pub use decider::ReplayDecider;
pub use error::{EngineError, Result, WorkflowError, WorkflowResult};
pub use options::{ActivityOptions, ChildWorkflowOptions};
pub use promise::Promise;
pub use registry::{WorkflowFn, WorkflowRegistry, global_registry, register_global};
pub use scheduler::{
    CancellationScope, DeterministicRunner, RunnerOptions, SpawnedThread, ThreadHandle,
    ThreadOutcome, WorkflowThreadLocal, WorkflowThreadPool, YieldResult,
};
pub use worker::{DecisionTaskService, DecisionWorker, replay_history};
pub use workflow::{ChildWorkflow, WorkflowContext, WorkflowTimer};

// Re-export protocol types used in the public API
pub use decider_protocol;
pub use decider_protocol::{Decision, DecisionTask, HistoryEvent, WorkflowExecution};
