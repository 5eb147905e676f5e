// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the cooperative workflow thread scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use decider_sdk::scheduler::{
    ClockSource, DeterministicRunner, RunnerOptions, ThreadBody, ThreadOutcome,
    WorkflowThreadLocal, WorkflowThreadPool, YieldResult,
};
use decider_sdk::{EngineError, Promise, WorkflowError};
use parking_lot::Mutex;

fn options() -> RunnerOptions {
    RunnerOptions {
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn fixed_clock(now: &Arc<AtomicI64>) -> ClockSource {
    let now = Arc::clone(now);
    Arc::new(move || now.load(Ordering::SeqCst))
}

fn runner(pool: &WorkflowThreadPool, root: ThreadBody) -> DeterministicRunner {
    DeterministicRunner::new(
        pool.clone(),
        options(),
        fixed_clock(&Arc::new(AtomicI64::new(0))),
        root,
    )
}

#[test]
fn test_threads_run_in_creation_order() {
    let pool = WorkflowThreadPool::new(8);
    let log = Arc::new(Mutex::new(Vec::new()));
    let released = Arc::new(AtomicBool::new(false));

    let root_log = Arc::clone(&log);
    let root_released = Arc::clone(&released);
    let mut runner = runner(
        &pool,
        Box::new(move |handle| {
            root_log.lock().push("root".to_string());
            let mut children = Vec::new();
            for name in ["a", "b"] {
                let log = Arc::clone(&root_log);
                let released = Arc::clone(&root_released);
                children.push(handle.new_thread(name, move |handle| {
                    log.lock().push(format!("{}-start", name));
                    handle.yield_until("release", || released.load(Ordering::SeqCst))?;
                    log.lock().push(format!("{}-end", name));
                    Ok(())
                })?);
            }
            for child in &children {
                child.join(handle)?;
            }
            Ok(())
        }),
    );

    runner.run_until_all_blocked().unwrap();
    assert_eq!(*log.lock(), vec!["root", "a-start", "b-start"]);
    assert!(!runner.is_done());
    assert_eq!(runner.thread_count(), 3);

    // Nothing changed: another sweep makes no progress.
    runner.run_until_all_blocked().unwrap();
    assert_eq!(log.lock().len(), 3);

    released.store(true, Ordering::SeqCst);
    runner.run_until_all_blocked().unwrap();
    assert_eq!(
        *log.lock(),
        vec!["root", "a-start", "b-start", "a-end", "b-end"]
    );
    assert!(runner.is_done());
    assert_eq!(runner.root_outcome(), Some(&ThreadOutcome::Completed));
    runner.close().unwrap();
}

#[test]
fn test_timed_yield_reports_wake_up_time() {
    let pool = WorkflowThreadPool::new(4);
    let now = Arc::new(AtomicI64::new(1_000));
    let result = Promise::new();

    let root_result = result.clone();
    let mut runner = DeterministicRunner::new(
        pool,
        options(),
        fixed_clock(&now),
        Box::new(move |handle| {
            let outcome = handle.yield_with_timeout(Duration::from_secs(5), "approval", || false)?;
            root_result.complete(outcome);
            Ok(())
        }),
    );

    runner.run_until_all_blocked().unwrap();
    assert_eq!(runner.next_wake_up_time(), Some(6_000));
    assert!(!result.is_ready());

    now.store(6_000, Ordering::SeqCst);
    runner.run_until_all_blocked().unwrap();
    assert_eq!(result.get(), Some(YieldResult::TimedOut));
    assert!(runner.is_done());
    assert_eq!(runner.next_wake_up_time(), None);
}

#[test]
fn test_timed_yield_condition_met_before_deadline() {
    let pool = WorkflowThreadPool::new(4);
    let now = Arc::new(AtomicI64::new(1_000));
    let approved = Arc::new(AtomicBool::new(false));
    let result = Promise::new();

    let root_approved = Arc::clone(&approved);
    let root_result = result.clone();
    let mut runner = DeterministicRunner::new(
        pool,
        options(),
        fixed_clock(&now),
        Box::new(move |handle| {
            let outcome = handle.yield_with_timeout(Duration::from_secs(5), "approval", || {
                root_approved.load(Ordering::SeqCst)
            })?;
            root_result.complete((outcome, handle.current_time_millis()));
            Ok(())
        }),
    );

    runner.run_until_all_blocked().unwrap();
    assert_eq!(runner.next_wake_up_time(), Some(6_000));

    now.store(2_500, Ordering::SeqCst);
    approved.store(true, Ordering::SeqCst);
    runner.run_until_all_blocked().unwrap();
    assert_eq!(result.get(), Some((YieldResult::ConditionMet, 2_500)));
    assert!(runner.is_done());
    assert_eq!(runner.next_wake_up_time(), None);
}

#[test]
fn test_at_most_one_thread_runs_at_a_time() {
    const THREADS: usize = 6;
    const STEPS: usize = 5;

    let pool = WorkflowThreadPool::new(THREADS + 1);
    let running = Arc::new(AtomicUsize::new(0));
    let max_running = Arc::new(AtomicUsize::new(0));
    let steps = Arc::new(AtomicUsize::new(0));

    let (root_running, root_max, root_steps) =
        (Arc::clone(&running), Arc::clone(&max_running), Arc::clone(&steps));
    let mut runner = runner(
        &pool,
        Box::new(move |handle| {
            let mut threads = Vec::new();
            for index in 0..THREADS {
                let running = Arc::clone(&root_running);
                let max_running = Arc::clone(&root_max);
                let steps = Arc::clone(&root_steps);
                threads.push(handle.new_thread(format!("worker-{index}"), move |handle| {
                    for _ in 0..STEPS {
                        let now_running = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_running.fetch_max(now_running, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(1));
                        steps.fetch_add(1, Ordering::SeqCst);
                        running.fetch_sub(1, Ordering::SeqCst);

                        let mut polled = false;
                        handle.yield_until("step", || std::mem::replace(&mut polled, true))?;
                    }
                    Ok(())
                })?);
            }
            for thread in &threads {
                thread.join(handle)?;
            }
            Ok(())
        }),
    );

    runner.run_until_all_blocked().unwrap();

    assert!(runner.is_done());
    assert_eq!(steps.load(Ordering::SeqCst), THREADS * STEPS);
    assert_eq!(max_running.load(Ordering::SeqCst), 1);
    assert_eq!(running.load(Ordering::SeqCst), 0);
}

#[test]
fn test_zero_timeout_does_not_yield() {
    let pool = WorkflowThreadPool::new(4);
    let result = Promise::new();

    let root_result = result.clone();
    let mut runner = runner(
        &pool,
        Box::new(move |handle| {
            let met = handle.yield_with_timeout(Duration::ZERO, "poll", || true)?;
            let missed = handle.yield_with_timeout(Duration::ZERO, "poll", || false)?;
            root_result.complete((met, missed));
            Ok(())
        }),
    );

    runner.run_until_all_blocked().unwrap();
    assert_eq!(
        result.get(),
        Some((YieldResult::ConditionMet, YieldResult::TimedOut))
    );
    assert!(runner.is_done());
}

#[test]
fn test_cancel_root_scope() {
    let pool = WorkflowThreadPool::new(4);
    let mut runner = runner(
        &pool,
        Box::new(|handle| {
            handle.yield_until("cancellation", || handle.is_cancel_requested())?;
            handle.check_cancelled()
        }),
    );

    runner.run_until_all_blocked().unwrap();
    assert!(!runner.is_done());

    runner.cancel(Some("operator request".to_string()));
    runner.run_until_all_blocked().unwrap();

    assert_eq!(
        runner.root_outcome(),
        Some(&ThreadOutcome::Cancelled {
            reason: Some("operator request".to_string())
        })
    );
    assert!(runner.failure().is_none());
}

#[test]
fn test_cancellation_reaches_spawned_threads() {
    let pool = WorkflowThreadPool::new(4);
    let child_outcome = Promise::new();

    let root_child_outcome = child_outcome.clone();
    let mut runner = runner(
        &pool,
        Box::new(move |handle| {
            let child = handle.new_thread("worker", |handle| {
                handle.yield_until("cancellation", || handle.is_cancel_requested())?;
                handle.check_cancelled()
            })?;
            root_child_outcome.complete(child.join(handle)?);
            Ok(())
        }),
    );

    runner.run_until_all_blocked().unwrap();
    runner.cancel(Some("shutdown".to_string()));
    runner.run_until_all_blocked().unwrap();

    assert_eq!(
        child_outcome.get(),
        Some(ThreadOutcome::Cancelled {
            reason: Some("shutdown".to_string())
        })
    );
    assert_eq!(runner.root_outcome(), Some(&ThreadOutcome::Completed));
}

#[test]
fn test_workflow_failure_recorded() {
    let pool = WorkflowThreadPool::new(4);
    let mut runner = runner(
        &pool,
        Box::new(|_| Err(WorkflowError::application("payment declined"))),
    );

    runner.run_until_all_blocked().unwrap();

    assert!(runner.is_done());
    assert_eq!(
        runner.failure(),
        Some(&WorkflowError::application("payment declined"))
    );
}

#[test]
fn test_panic_becomes_failure() {
    let pool = WorkflowThreadPool::new(4);
    let mut runner = runner(&pool, Box::new(|_| panic!("index out of range")));

    runner.run_until_all_blocked().unwrap();

    assert_eq!(
        runner.failure(),
        Some(&WorkflowError::Panicked("index out of range".to_string()))
    );
}

#[test]
fn test_engine_error_aborts_run() {
    let pool = WorkflowThreadPool::new(4);
    let mut runner = runner(
        &pool,
        Box::new(|_| {
            Err(EngineError::NonDeterministic("timer replaced by activity".to_string()).into())
        }),
    );

    let err = runner.run_until_all_blocked().unwrap_err();

    assert_eq!(
        err,
        EngineError::NonDeterministic("timer replaced by activity".to_string())
    );
    assert!(runner.run_until_all_blocked().is_err());
}

#[test]
fn test_pool_exhaustion_is_an_engine_error() {
    let pool = WorkflowThreadPool::new(1);
    let mut runner = runner(
        &pool,
        Box::new(|handle| {
            handle.new_thread("extra", |_| Ok(()))?;
            Ok(())
        }),
    );

    let err = runner.run_until_all_blocked().unwrap_err();

    assert_eq!(err, EngineError::ThreadPoolExhausted { max_threads: 1 });
    assert_eq!(pool.active_threads(), 0);
}

#[test]
fn test_close_releases_blocked_threads() {
    let pool = WorkflowThreadPool::new(4);
    let mut runner = runner(
        &pool,
        Box::new(|handle| {
            handle.yield_until("forever", || false)?;
            Ok(())
        }),
    );

    runner.run_until_all_blocked().unwrap();
    assert_eq!(pool.active_threads(), 1);
    assert!(runner.stack_trace().contains("BLOCKED on forever"));

    runner.close().unwrap();
    assert_eq!(pool.active_threads(), 0);
    assert_eq!(runner.thread_count(), 0);
}

#[test]
fn test_thread_locals_are_per_thread() {
    let pool = WorkflowThreadPool::new(4);
    let local = Arc::new(WorkflowThreadLocal::<u32>::new());
    let seen = Promise::new();

    let root_local = Arc::clone(&local);
    let root_seen = seen.clone();
    let mut runner = runner(
        &pool,
        Box::new(move |handle| {
            root_local.set(handle, 1);
            let child_local = Arc::clone(&root_local);
            let child = handle.new_thread("child", move |handle| {
                let before = child_local.get(handle);
                child_local.set(handle, 2);
                if before.is_some() || child_local.get(handle) != Some(2) {
                    return Err(WorkflowError::application("thread local leaked"));
                }
                Ok(())
            })?;
            let child_outcome = child.join(handle)?;
            root_seen.complete((root_local.get(handle), child_outcome));
            Ok(())
        }),
    );

    runner.run_until_all_blocked().unwrap();

    assert_eq!(seen.get(), Some((Some(1), ThreadOutcome::Completed)));
    assert_eq!(runner.root_outcome(), Some(&ThreadOutcome::Completed));
}
