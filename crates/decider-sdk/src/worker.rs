// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decision worker.
//!
//! Polls decision tasks from the workflow service, replays each one on a
//! blocking thread and reports the produced commands. Transport is behind
//! [`DecisionTaskService`].

use std::sync::Arc;

use async_trait::async_trait;
use decider_protocol::{Decision, DecisionTask, HistoryEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::WorkerConfig;
use crate::context::WorkflowInfo;
use crate::decider::ReplayDecider;
use crate::error::{EngineError, Result};
use crate::registry::{WorkflowFn, WorkflowRegistry};
use crate::scheduler::{RunnerOptions, WorkflowThreadPool};

/// Decision task endpoints of the workflow service.
#[async_trait]
pub trait DecisionTaskService: Send + Sync {
    /// Long-poll for the next decision task. `None` when the poll expired empty.
    async fn poll_decision_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: &str,
    ) -> Result<Option<DecisionTask>>;

    async fn respond_decision_task_completed(
        &self,
        task_token: Vec<u8>,
        decisions: Vec<Decision>,
    ) -> Result<()>;

    async fn respond_decision_task_failed(
        &self,
        task_token: Vec<u8>,
        cause: String,
        details: Vec<u8>,
    ) -> Result<()>;
}

/// Replay one history to its decisions. All workflow threads are stopped
/// before returning.
pub fn replay_history(
    info: WorkflowInfo,
    workflow: WorkflowFn,
    pool: WorkflowThreadPool,
    options: RunnerOptions,
    history: &[HistoryEvent],
) -> Result<Vec<Decision>> {
    let mut decider = ReplayDecider::new(info, workflow, pool, options);
    let decided = decider.decide(history);
    if let Err(e) = &decided {
        debug!(
            error = %e,
            decisions = %decider.describe_decisions(),
            threads = %decider.stack_trace(),
            "Replay failed"
        );
    }
    let closed = decider.close();
    let decisions = decided?;
    closed?;
    Ok(decisions)
}

/// Polls and decides decision tasks until shut down.
pub struct DecisionWorker {
    config: WorkerConfig,
    registry: Arc<WorkflowRegistry>,
    service: Arc<dyn DecisionTaskService>,
    pool: WorkflowThreadPool,
    shutdown: CancellationToken,
}

impl DecisionWorker {
    pub fn new(
        config: WorkerConfig,
        registry: Arc<WorkflowRegistry>,
        service: Arc<dyn DecisionTaskService>,
    ) -> Self {
        let pool = WorkflowThreadPool::new(config.max_workflow_threads);
        Self {
            config,
            registry,
            service,
            pool,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancel this token to stop [`run`](Self::run) after the task in progress.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn pool(&self) -> &WorkflowThreadPool {
        &self.pool
    }

    /// Run the poll loop.
    pub async fn run(&self) {
        info!(
            domain = %self.config.domain,
            task_list = %self.config.task_list,
            identity = %self.config.identity,
            max_workflow_threads = self.config.max_workflow_threads,
            "Decision worker started"
        );

        loop {
            let polled = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Decision worker shutting down");
                    break;
                }
                polled = self.service.poll_decision_task(
                    &self.config.domain,
                    &self.config.task_list,
                    &self.config.identity,
                ) => polled,
            };

            match polled {
                Ok(Some(task)) => {
                    if let Err(e) = self.process_task(task).await {
                        error!(error = %e, "Failed to respond to decision task");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Decision task poll failed");
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => {
                            info!("Decision worker shutting down");
                            break;
                        }
                        _ = tokio::time::sleep(self.config.poll_backoff()) => {}
                    }
                }
            }
        }
    }

    /// Decide one task and report the result. Engine errors are reported as
    /// a failed decision task; only a failed response is returned.
    #[instrument(
        skip(self, task),
        fields(
            workflow_id = %task.workflow_execution.workflow_id,
            run_id = %task.workflow_execution.run_id,
            workflow_type = %task.workflow_type,
            started_event_id = task.started_event_id
        )
    )]
    pub async fn process_task(&self, task: DecisionTask) -> Result<()> {
        let task_token = task.task_token.clone();
        match self.decide(task).await {
            Ok(decisions) => {
                debug!(count = decisions.len(), "Decision task completed");
                self.service
                    .respond_decision_task_completed(task_token, decisions)
                    .await
            }
            Err(e) => {
                error!(error = %e, cause = e.error_code(), "Decision task failed");
                self.service
                    .respond_decision_task_failed(
                        task_token,
                        e.error_code().to_string(),
                        e.to_string().into_bytes(),
                    )
                    .await
            }
        }
    }

    /// Replay `task` on a blocking thread and return its decisions.
    pub async fn decide(&self, task: DecisionTask) -> Result<Vec<Decision>> {
        let workflow = self.registry.resolve(&task.workflow_type)?;
        let info = WorkflowInfo {
            domain: self.config.domain.clone(),
            execution: task.workflow_execution,
            workflow_type: task.workflow_type,
            task_list: self.config.task_list.clone(),
            ..Default::default()
        };
        let pool = self.pool.clone();
        let options = self.config.runner_options();
        let history = task.history;

        tokio::task::spawn_blocking(move || {
            replay_history(info, workflow, pool, options, &history)
        })
        .await
        .map_err(|e| EngineError::Internal(format!("decision task join error: {}", e)))?
    }
}

impl std::fmt::Debug for DecisionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionWorker")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .finish()
    }
}
