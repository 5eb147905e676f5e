// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replay Example - Rebuilds a workflow from its history.
//!
//! This example shows:
//! - Registering a workflow that uses versioning, a side effect, an
//!   activity and a durable timer
//! - Replaying a recorded history in which the activity already completed
//! - Printing the commands produced for the current decision task
//!
//! Run with: cargo run -p decider-example --bin replay_example

use std::time::Duration;

use decider_sdk::decider_protocol::DEFAULT_VERSION;
use decider_sdk::testing::{HistoryBuilder, test_workflow_info};
use decider_sdk::{
    ActivityOptions, RunnerOptions, WorkflowRegistry, WorkflowThreadPool, replay_history,
};
use tracing::info;

const WORKFLOW_TYPE: &str = "order-fulfillment";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("=== Replay Example ===");

    let mut registry = WorkflowRegistry::new();
    registry.register(WORKFLOW_TYPE, |ctx, thread, input| {
        let version = ctx.get_version("payment-v2", DEFAULT_VERSION, 1)?;
        let order_id: String = ctx.side_effect_json(|| "order-7f3a".to_string())?;
        info!(version, order_id = %order_id, replaying = ctx.is_replaying(), "Fulfilling order");

        let reservation = ctx.execute_activity(
            thread,
            ActivityOptions::new("reserve-inventory")
                .with_start_to_close_timeout(Duration::from_secs(30)),
            input,
        )?;
        info!(reservation = %String::from_utf8_lossy(&reservation), "Inventory reserved");

        // Give the customer a grace period before charging
        ctx.sleep(thread, Duration::from_secs(30))?;

        ctx.execute_activity(thread, ActivityOptions::new("charge-card"), reservation)
    })?;

    let history = HistoryBuilder::with_input(WORKFLOW_TYPE, b"sku-42".to_vec())
        .decision_task_completed()
        .version_marker("payment-v2", 1)
        .side_effect_marker(&serde_json::to_vec("order-7f3a")?)
        .activity_scheduled("0", "reserve-inventory")
        .advance_millis(1_200)
        .activity_started("0")
        .activity_completed("0", b"reservation-19")
        .decision_task_started()
        .build();
    info!(events = history.len(), "History built");

    let workflow = registry.resolve(WORKFLOW_TYPE)?;
    let decisions = replay_history(
        test_workflow_info(WORKFLOW_TYPE),
        workflow,
        WorkflowThreadPool::new(8),
        RunnerOptions::default(),
        &history,
    )?;

    info!(count = decisions.len(), "Replay produced decisions");
    for decision in &decisions {
        println!("{}", serde_json::to_string_pretty(decision)?);
    }
    Ok(())
}
