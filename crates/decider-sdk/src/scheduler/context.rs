// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run/yield handshake between the driver and one workflow thread.

use std::backtrace::Backtrace;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::ThreadOutcome;
use crate::error::{WorkflowError, WorkflowResult};

/// Lifecycle of a workflow thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Created,
    Running,
    Yielded,
    Done,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Created => "CREATED",
            Status::Running => "RUNNING",
            Status::Yielded => "YIELDED",
            Status::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct State {
    status: Status,
    /// The driver is inside `run_until_blocked` for this thread.
    in_run_until_blocked: bool,
    /// Cleared when the thread gets past a yield during the current run.
    remained_blocked: bool,
    destroy_requested: bool,
    yield_reason: Option<String>,
    /// Virtual time a timed yield gives up at.
    blocked_until: Option<i64>,
    stack_trace: Option<String>,
    outcome: Option<ThreadOutcome>,
}

/// Shared between a [`WorkflowThread`](super::WorkflowThread) and the OS
/// thread running its body.
#[derive(Debug)]
pub(crate) struct ThreadContext {
    state: Mutex<State>,
    /// Wakes the workflow thread parked in `yield_until`.
    thread_wakeup: Condvar,
    /// Wakes the driver parked in `run_until_blocked`.
    driver_wakeup: Condvar,
    capture_stack_traces: bool,
}

impl ThreadContext {
    pub fn new(capture_stack_traces: bool) -> Self {
        Self {
            state: Mutex::new(State {
                status: Status::Created,
                in_run_until_blocked: false,
                remained_blocked: false,
                destroy_requested: false,
                yield_reason: None,
                blocked_until: None,
                stack_trace: None,
                outcome: None,
            }),
            thread_wakeup: Condvar::new(),
            driver_wakeup: Condvar::new(),
            capture_stack_traces,
        }
    }

    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    pub fn set_status(&self, status: Status) {
        self.state.lock().status = status;
    }

    pub fn is_done(&self) -> bool {
        self.status() == Status::Done
    }

    pub fn is_destroy_requested(&self) -> bool {
        self.state.lock().destroy_requested
    }

    pub fn yield_reason(&self) -> Option<String> {
        self.state.lock().yield_reason.clone()
    }

    pub fn blocked_until(&self) -> Option<i64> {
        self.state.lock().blocked_until
    }

    pub fn set_blocked_until(&self, blocked_until: Option<i64>) {
        self.state.lock().blocked_until = blocked_until;
    }

    pub fn stack_trace(&self) -> Option<String> {
        self.state.lock().stack_trace.clone()
    }

    pub fn outcome(&self) -> Option<ThreadOutcome> {
        self.state.lock().outcome.clone()
    }

    /// Park the calling workflow thread until the driver runs it and
    /// `condition` holds. The condition is only evaluated while the driver
    /// waits in [`run_until_blocked`](Self::run_until_blocked).
    pub fn yield_until<F>(&self, reason: &str, mut condition: F) -> WorkflowResult<()>
    where
        F: FnMut() -> bool,
    {
        let stack_trace = self
            .capture_stack_traces
            .then(|| Backtrace::force_capture().to_string());

        let mut state = self.state.lock();
        if stack_trace.is_some() {
            state.stack_trace = stack_trace;
        }
        let result = loop {
            if state.destroy_requested {
                break Err(WorkflowError::Destroyed);
            }
            if state.in_run_until_blocked && condition() {
                break Ok(());
            }
            state.yield_reason = Some(reason.to_string());
            state.status = Status::Yielded;
            self.driver_wakeup.notify_one();
            self.thread_wakeup.wait(&mut state);
        };
        state.remained_blocked = false;
        state.yield_reason = None;
        result
    }

    /// First yield of a started thread; returns as soon as it is run.
    pub fn initial_yield(&self) -> WorkflowResult<()> {
        self.yield_until("created", || true)
    }

    /// Run the thread until it yields or finishes. Returns whether it made
    /// progress. Does nothing for a thread that was never started or is done.
    pub fn run_until_blocked(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(state.status, Status::Created | Status::Done) {
            return false;
        }
        state.in_run_until_blocked = true;
        state.status = Status::Running;
        state.remained_blocked = true;
        self.thread_wakeup.notify_one();
        while state.status == Status::Running {
            self.driver_wakeup.wait(&mut state);
        }
        state.in_run_until_blocked = false;
        !state.remained_blocked
    }

    /// Request destruction and run the thread so it unwinds. Returns whether
    /// it reached `Done` within `timeout`.
    pub fn destroy(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        state.destroy_requested = true;
        match state.status {
            Status::Created => {
                state.status = Status::Done;
                return true;
            }
            Status::Done => return true,
            Status::Running | Status::Yielded => {}
        }

        let deadline = Instant::now() + timeout;
        state.in_run_until_blocked = true;
        state.status = Status::Running;
        state.remained_blocked = true;
        self.thread_wakeup.notify_one();
        while state.status == Status::Running {
            if self
                .driver_wakeup
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        state.in_run_until_blocked = false;
        state.status == Status::Done
    }

    /// Record the outcome of the thread body and hand control back to the driver.
    pub fn finish(&self, outcome: ThreadOutcome) {
        let mut state = self.state.lock();
        state.outcome = Some(outcome);
        state.status = Status::Done;
        state.yield_reason = None;
        state.blocked_until = None;
        self.driver_wakeup.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_run_until_blocked_requires_start() {
        let context = ThreadContext::new(false);
        assert!(!context.run_until_blocked());
        assert_eq!(context.status(), Status::Created);
    }

    #[test]
    fn test_handshake() {
        let context = Arc::new(ThreadContext::new(false));
        let flag = Arc::new(AtomicBool::new(false));
        context.set_status(Status::Running);

        let thread_context = context.clone();
        let thread_flag = flag.clone();
        let join = std::thread::spawn(move || {
            thread_context.initial_yield().unwrap();
            thread_context
                .yield_until("flag", || thread_flag.load(Ordering::SeqCst))
                .unwrap();
            thread_context.finish(ThreadOutcome::Completed);
        });

        assert!(context.run_until_blocked());
        assert_eq!(context.status(), Status::Yielded);
        assert_eq!(context.yield_reason().as_deref(), Some("flag"));
        assert!(!context.run_until_blocked());

        flag.store(true, Ordering::SeqCst);
        assert!(context.run_until_blocked());
        assert!(context.is_done());
        assert_eq!(context.outcome(), Some(ThreadOutcome::Completed));
        join.join().unwrap();
    }

    #[test]
    fn test_destroy_unwinds_blocked_thread() {
        let context = Arc::new(ThreadContext::new(false));
        context.set_status(Status::Running);

        let thread_context = context.clone();
        let join = std::thread::spawn(move || {
            thread_context.initial_yield().unwrap();
            let result = thread_context.yield_until("forever", || false);
            assert_eq!(result, Err(WorkflowError::Destroyed));
            thread_context.finish(ThreadOutcome::Stopped);
        });

        context.run_until_blocked();
        assert!(context.destroy(Duration::from_secs(5)));
        assert_eq!(context.outcome(), Some(ThreadOutcome::Stopped));
        join.join().unwrap();
    }

    #[test]
    fn test_destroy_never_started() {
        let context = ThreadContext::new(false);
        assert!(context.destroy(Duration::from_millis(10)));
        assert!(context.is_done());
    }
}
