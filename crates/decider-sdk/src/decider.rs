// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replay decider.
//!
//! Rebuilds the state of a workflow execution from its full history and
//! produces the commands of the current decision task. Workflow code is
//! re-executed batch by batch; every command it produces while replaying is
//! checked against the events the original execution recorded.
//!
//! Per decision task batch:
//!
//! 1. replay flag and virtual time are taken from the batch;
//! 2. command ids restart right after the batch's `DecisionTaskCompleted`;
//! 3. recorded markers fill the side-effect caches;
//! 4. new events complete timers, activities and child workflows;
//! 5. workflow threads run until all of them are blocked;
//! 6. when replaying, the batch's decision events are matched against the
//!    commands just produced.

use std::sync::Arc;

use decider_protocol::{Decision, EventAttributes, HistoryEvent, WorkflowExecutionStartedAttributes};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::context::{DecisionContext, WorkflowInfo};
use crate::error::{EngineError, Result, WorkflowError};
use crate::history::{DecisionEvents, DecisionEventsIterator};
use crate::promise::Promise;
use crate::registry::WorkflowFn;
use crate::scheduler::{
    ClockSource, DeterministicRunner, RunnerOptions, ThreadOutcome, WorkflowThreadPool,
};
use crate::workflow::WorkflowContext;

/// Timer that wakes the execution for the earliest timed wait.
#[derive(Debug, Clone, Copy)]
struct WakeUpTimer {
    started_event_id: i64,
    wake_up_time_ms: i64,
}

/// Decides one workflow execution from its history.
pub struct ReplayDecider {
    context: Arc<Mutex<DecisionContext>>,
    workflow: WorkflowFn,
    pool: WorkflowThreadPool,
    options: RunnerOptions,
    runner: Option<DeterministicRunner>,
    result: Promise<Vec<u8>>,
    completed: bool,
    wake_up_timer: Option<WakeUpTimer>,
    decided: bool,
}

impl ReplayDecider {
    pub fn new(
        info: WorkflowInfo,
        workflow: WorkflowFn,
        pool: WorkflowThreadPool,
        options: RunnerOptions,
    ) -> Self {
        Self {
            context: Arc::new(Mutex::new(DecisionContext::new(info))),
            workflow,
            pool,
            options,
            runner: None,
            result: Promise::new(),
            completed: false,
            wake_up_timer: None,
            decided: false,
        }
    }

    /// Replay `history` and return the commands of its last decision task.
    pub fn decide(&mut self, history: &[HistoryEvent]) -> Result<Vec<Decision>> {
        if self.decided {
            return Err(EngineError::IllegalState(
                "a replay decider decides a single history".to_string(),
            ));
        }
        self.decided = true;

        for batch in DecisionEventsIterator::new(history) {
            self.process_batch(&batch)?;
        }
        let decisions = self.context.lock().tracker.decisions();
        debug!(count = decisions.len(), "Decisions produced");
        Ok(decisions)
    }

    fn process_batch(&mut self, batch: &DecisionEvents) -> Result<()> {
        {
            let mut guard = self.context.lock();
            let dc = &mut *guard;
            dc.clock.set_replaying(batch.replay);
            if let Some(started_event_id) = batch.started_event_id {
                dc.clock
                    .set_replay_current_time_millis(batch.replay_current_time_millis);
                dc.tracker.start_decision_task(started_event_id);
            }
            for marker in batch.markers() {
                dc.clock.handle_marker_recorded(&mut dc.tracker, marker)?;
            }
        }

        for event in &batch.events {
            self.handle_event(event)?;
        }

        self.event_loop()?;

        if batch.replay {
            let mut dc = self.context.lock();
            dc.tracker.handle_decision_task_started_event();
            for event in &batch.decision_events {
                dc.handle_decision_event(event)?;
            }
        }
        Ok(())
    }

    fn handle_event(&mut self, event: &HistoryEvent) -> Result<()> {
        match &event.attributes {
            EventAttributes::WorkflowExecutionStarted(attributes) => {
                self.start_workflow(attributes)
            }
            EventAttributes::WorkflowExecutionCancelRequested(attributes) => {
                let reason = (!attributes.cause.is_empty()).then(|| attributes.cause.clone());
                info!(reason = ?reason, "Workflow cancellation requested");
                if let Some(runner) = &self.runner {
                    runner.cancel(reason);
                }
                Ok(())
            }
            _ => self.context.lock().handle_event(event),
        }
    }

    fn start_workflow(&mut self, attributes: &WorkflowExecutionStartedAttributes) -> Result<()> {
        if self.runner.is_some() {
            return Err(EngineError::NonDeterministic(
                "workflow execution started twice".to_string(),
            ));
        }
        {
            let mut dc = self.context.lock();
            dc.info.workflow_type = attributes.workflow_type.clone();
            dc.info.task_list = attributes.task_list.clone();
            dc.info.parent_execution = attributes.parent_execution.clone();
            dc.info.attempt = attributes.attempt;
        }

        let workflow_context = WorkflowContext::new(Arc::clone(&self.context));
        let workflow = Arc::clone(&self.workflow);
        let input = attributes.input.clone();
        let result = self.result.clone();

        let clock_context = Arc::clone(&self.context);
        let clock: ClockSource = Arc::new(move || clock_context.lock().clock.current_time_millis());

        debug!(workflow_type = %attributes.workflow_type, "Starting workflow");
        self.runner = Some(DeterministicRunner::new(
            self.pool.clone(),
            self.options.clone(),
            clock,
            Box::new(move |handle| {
                let output = workflow(&workflow_context, handle, input)?;
                result.complete(output);
                Ok(())
            }),
        ));
        Ok(())
    }

    /// Run workflow threads. The engine lock is not held here: threads take
    /// it themselves while they run.
    fn event_loop(&mut self) -> Result<()> {
        if self.completed {
            return Ok(());
        }
        let Some(runner) = self.runner.as_mut() else {
            return Ok(());
        };
        runner.run_until_all_blocked()?;
        if runner.is_done() {
            return self.complete_workflow();
        }
        let next_wake_up_time = runner.next_wake_up_time();
        self.update_wake_up_timer(next_wake_up_time)
    }

    fn complete_workflow(&mut self) -> Result<()> {
        let Some(runner) = self.runner.as_mut() else {
            return Ok(());
        };
        let failure = runner.failure().cloned();
        let root_outcome = runner.root_outcome().cloned();
        {
            let mut dc = self.context.lock();
            match (failure, root_outcome) {
                (Some(WorkflowError::ContinueAsNew(attributes)), _) => {
                    info!(workflow_type = %attributes.workflow_type, "Workflow continued as new");
                    dc.tracker.continue_as_new_workflow_execution(*attributes);
                }
                (Some(failure), _) => {
                    info!(error = %failure, "Workflow failed");
                    let (reason, details) = failure.failure_details();
                    dc.tracker.fail_workflow_execution(reason, details);
                }
                (None, Some(ThreadOutcome::Completed)) => {
                    info!("Workflow completed");
                    let result = self.result.take().unwrap_or_default();
                    dc.tracker.complete_workflow_execution(result);
                }
                (None, Some(ThreadOutcome::Cancelled { reason })) => {
                    info!(reason = ?reason, "Workflow canceled");
                    dc.tracker
                        .cancel_workflow_execution(reason.unwrap_or_default().into_bytes());
                }
                (None, _) => return Ok(()),
            }
        }
        self.completed = true;
        runner.close()
    }

    /// Keep a single timer armed for the earliest timed wait of any thread.
    /// The timer is replaced only when that time changes.
    fn update_wake_up_timer(&mut self, next_wake_up_time: Option<i64>) -> Result<()> {
        let mut guard = self.context.lock();
        let dc = &mut *guard;

        if let Some(timer) = self.wake_up_timer {
            if !dc.clock.has_pending_timer(timer.started_event_id) {
                self.wake_up_timer = None;
            }
        }
        if let (Some(timer), Some(wake_up_time)) = (self.wake_up_timer, next_wake_up_time) {
            if timer.wake_up_time_ms == wake_up_time {
                return Ok(());
            }
        }

        if let Some(timer) = self.wake_up_timer.take() {
            dc.clock
                .cancel_timer(&mut dc.tracker, timer.started_event_id, None)?;
        }
        let Some(wake_up_time) = next_wake_up_time else {
            return Ok(());
        };
        let delay_ms = wake_up_time - dc.clock.current_time_millis();
        let delay_seconds = (delay_ms.max(1) + 999) / 1_000;
        if let Some(started_event_id) =
            dc.clock
                .create_timer(&mut dc.tracker, delay_seconds, Box::new(|_| {}))?
        {
            debug!(started_event_id, wake_up_time, "Wake-up timer armed");
            self.wake_up_timer = Some(WakeUpTimer {
                started_event_id,
                wake_up_time_ms: wake_up_time,
            });
        }
        Ok(())
    }

    /// The workflow function returned or failed and its closing command was produced.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Blocked-on report of the execution's live workflow threads.
    pub fn stack_trace(&self) -> String {
        self.runner
            .as_ref()
            .map(DeterministicRunner::stack_trace)
            .unwrap_or_default()
    }

    /// Transition histories of all tracked commands.
    pub fn describe_decisions(&self) -> String {
        self.context.lock().tracker.describe()
    }

    /// Stop all workflow threads.
    pub fn close(&mut self) -> Result<()> {
        match self.runner.as_mut() {
            Some(runner) => runner.close(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ReplayDecider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayDecider")
            .field("runner", &self.runner)
            .field("completed", &self.completed)
            .field("wake_up_timer", &self.wake_up_timer)
            .finish()
    }
}
