// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker Example - Runs the decision worker against an in-memory service.
//!
//! This example shows:
//! - Implementing `DecisionTaskService` (here backed by a queue of tasks)
//! - Running `DecisionWorker` until the queue is drained
//! - How a workflow whose code no longer matches history fails its task
//!
//! Run with: cargo run -p decider-example --bin worker_example

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use decider_sdk::testing::HistoryBuilder;
use decider_sdk::{
    ActivityOptions, Decision, DecisionTask, DecisionTaskService, DecisionWorker, Result,
    WorkerConfig, WorkflowRegistry,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Hands out queued tasks and prints the responses. Cancels `shutdown`
/// once the queue is drained.
struct InMemoryService {
    tasks: Mutex<VecDeque<DecisionTask>>,
    shutdown: CancellationToken,
}

#[async_trait]
impl DecisionTaskService for InMemoryService {
    async fn poll_decision_task(
        &self,
        _domain: &str,
        task_list: &str,
        _identity: &str,
    ) -> Result<Option<DecisionTask>> {
        let task = self.tasks.lock().await.pop_front();
        match task {
            Some(task) => {
                info!(task_list, workflow_type = %task.workflow_type, "Task polled");
                Ok(Some(task))
            }
            None => {
                self.shutdown.cancel();
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(None)
            }
        }
    }

    async fn respond_decision_task_completed(
        &self,
        task_token: Vec<u8>,
        decisions: Vec<Decision>,
    ) -> Result<()> {
        info!(
            task_token = %String::from_utf8_lossy(&task_token),
            count = decisions.len(),
            "Decision task completed"
        );
        for decision in &decisions {
            println!("  {:?}", decision);
        }
        Ok(())
    }

    async fn respond_decision_task_failed(
        &self,
        task_token: Vec<u8>,
        cause: String,
        details: Vec<u8>,
    ) -> Result<()> {
        warn!(
            task_token = %String::from_utf8_lossy(&task_token),
            cause = %cause,
            details = %String::from_utf8_lossy(&details),
            "Decision task failed"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("=== Worker Example ===");

    let mut registry = WorkflowRegistry::new();
    registry.register("greeting", |ctx, thread, input| {
        let name = String::from_utf8_lossy(&input).to_string();
        ctx.sleep(thread, Duration::from_secs(5))?;
        ctx.execute_activity(
            thread,
            ActivityOptions::new("compose-greeting"),
            format!("Hello, {}!", name).into_bytes(),
        )
    })?;

    // First task of a fresh execution: expect a StartTimer command.
    let fresh = HistoryBuilder::with_input("greeting", b"Ada".to_vec()).task();

    // Timer fired: expect the activity to be scheduled.
    let after_timer = HistoryBuilder::with_input("greeting", b"Ada".to_vec())
        .decision_task_completed()
        .timer_started("0", 5)
        .timer_fired("0")
        .decision_task_started()
        .task();

    // History recorded an activity where the code starts a timer.
    let diverged = HistoryBuilder::with_input("greeting", b"Ada".to_vec())
        .decision_task_completed()
        .activity_scheduled("0", "compose-greeting")
        .decision_task_started()
        .task();

    let config = WorkerConfig::new("greetings").with_max_workflow_threads(16);
    let shutdown = CancellationToken::new();
    let service = Arc::new(InMemoryService {
        tasks: Mutex::new(VecDeque::from([fresh, after_timer, diverged])),
        shutdown: shutdown.clone(),
    });

    let worker = DecisionWorker::new(config, Arc::new(registry), service);
    let worker_shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        worker_shutdown.cancel();
    });

    worker.run().await;
    info!("Worker stopped");
    Ok(())
}
