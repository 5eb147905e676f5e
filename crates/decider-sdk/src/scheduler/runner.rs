// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;

use tracing::{debug, error, warn};

use super::thread::Spawner;
use super::{
    CancellationScope, ClockSource, RunnerOptions, ThreadBody, ThreadOutcome, WorkflowThread,
    WorkflowThreadPool,
};
use crate::error::{EngineError, Result, WorkflowError};

/// Name of the thread running the workflow function.
pub const ROOT_THREAD_NAME: &str = "workflow-root";

/// Drives all workflow threads of one execution.
///
/// Threads are run one at a time, in creation order, until a full sweep
/// makes no progress. The interleaving therefore depends only on the order
/// of events fed between sweeps, never on OS scheduling.
pub struct DeterministicRunner {
    threads: Vec<WorkflowThread>,
    spawner: Spawner,
    root_scope: Arc<CancellationScope>,
    root_id: u64,
    root_outcome: Option<ThreadOutcome>,
    failure: Option<WorkflowError>,
    next_wake_up_time: Option<i64>,
    closed: bool,
}

impl DeterministicRunner {
    pub fn new(
        pool: WorkflowThreadPool,
        options: RunnerOptions,
        clock: ClockSource,
        root: ThreadBody,
    ) -> Self {
        let spawner = Spawner::new(pool, options, clock);
        let root_scope = CancellationScope::root();
        let root_thread =
            spawner.create_thread(ROOT_THREAD_NAME.to_string(), Arc::clone(&root_scope), root);
        Self {
            root_id: root_thread.id(),
            threads: vec![root_thread],
            spawner,
            root_scope,
            root_outcome: None,
            failure: None,
            next_wake_up_time: None,
            closed: false,
        }
    }

    /// Run threads until every one of them is blocked or done.
    ///
    /// An engine error escaping workflow code closes the runner and is
    /// returned; a workflow failure is recorded and reported by
    /// [`failure`](Self::failure).
    pub fn run_until_all_blocked(&mut self) -> Result<()> {
        if self.closed {
            return Err(EngineError::IllegalState("runner is closed".to_string()));
        }
        for thread in self.threads.iter_mut().filter(|t| !t.is_started()) {
            thread.start()?;
        }

        loop {
            let mut progress = false;
            let mut next_wake_up_time: Option<i64> = None;
            let now = self.spawner.now();

            let mut index = 0;
            while index < self.threads.len() {
                progress |= self.threads[index].run_until_blocked();

                if self.threads[index].is_done() {
                    let mut thread = self.threads.remove(index);
                    thread.stop()?;
                    let outcome = thread.outcome().unwrap_or(ThreadOutcome::Stopped);
                    self.record_outcome(&thread, outcome)?;
                    if self.failure.is_some() {
                        break;
                    }
                    continue;
                }

                if let Some(blocked_until) = self.threads[index].blocked_until() {
                    if blocked_until > now {
                        next_wake_up_time = Some(
                            next_wake_up_time.map_or(blocked_until, |t| t.min(blocked_until)),
                        );
                    }
                }
                index += 1;
            }

            self.threads.extend(self.spawner.take_pending());
            self.next_wake_up_time = next_wake_up_time;
            if !progress || self.threads.is_empty() || self.failure.is_some() {
                break;
            }
        }
        Ok(())
    }

    fn record_outcome(&mut self, thread: &WorkflowThread, outcome: ThreadOutcome) -> Result<()> {
        debug!(thread = %thread.name(), outcome = ?outcome, "Workflow thread reaped");
        match &outcome {
            ThreadOutcome::Aborted(e) => {
                error!(thread = %thread.name(), error = %e, "Engine error in workflow thread");
                let e = e.clone();
                if let Err(close_err) = self.close() {
                    error!(error = %close_err, "Failed to close runner after engine error");
                }
                return Err(e);
            }
            ThreadOutcome::Failed(e) => {
                warn!(thread = %thread.name(), error = %e, "Workflow thread failed");
                if self.failure.is_none() {
                    self.failure = Some(e.clone());
                }
            }
            ThreadOutcome::Completed
            | ThreadOutcome::Cancelled { .. }
            | ThreadOutcome::Stopped => {}
        }
        if thread.id() == self.root_id {
            self.root_outcome = Some(outcome);
        }
        Ok(())
    }

    /// The workflow function returned, or a thread failed.
    pub fn is_done(&self) -> bool {
        self.root_outcome.is_some() || self.failure.is_some()
    }

    pub fn root_outcome(&self) -> Option<&ThreadOutcome> {
        self.root_outcome.as_ref()
    }

    /// First unhandled failure of any thread.
    pub fn failure(&self) -> Option<&WorkflowError> {
        self.failure.as_ref()
    }

    /// Earliest future virtual time a timed yield gives up at, as of the last sweep.
    pub fn next_wake_up_time(&self) -> Option<i64> {
        self.next_wake_up_time
    }

    pub fn root_scope(&self) -> &Arc<CancellationScope> {
        &self.root_scope
    }

    /// Cancel the root scope and every non-detached scope below it.
    pub fn cancel(&self, reason: Option<String>) {
        self.root_scope.cancel(reason);
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Blocked-on report of all live threads.
    pub fn stack_trace(&self) -> String {
        let mut out = String::new();
        for thread in &self.threads {
            thread.add_stack_trace(&mut out);
            out.push('\n');
        }
        out
    }

    /// Stop every thread. The first thread that failed to stop is reported.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.threads.extend(self.spawner.take_pending());

        let mut first_error = None;
        for thread in self.threads.iter_mut() {
            if let Err(e) = thread.stop() {
                first_error.get_or_insert(e);
            }
        }
        self.threads.clear();
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for DeterministicRunner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Failed to close workflow runner");
        }
    }
}

impl std::fmt::Debug for DeterministicRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeterministicRunner")
            .field("threads", &self.threads)
            .field("root_outcome", &self.root_outcome)
            .field("closed", &self.closed)
            .finish()
    }
}
