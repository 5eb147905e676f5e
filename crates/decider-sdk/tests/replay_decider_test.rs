// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replay tests: workflow code re-executed against recorded histories.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use decider_sdk::decider_protocol::{
    CancelTimerAttributes, CancelWorkflowExecutionAttributes, CompleteWorkflowExecutionAttributes,
    ContinueAsNewWorkflowExecutionAttributes, DEFAULT_VERSION, Decision, DecisionType,
    FailWorkflowExecutionAttributes, LOCAL_ACTIVITY_MARKER_NAME, LocalActivityMarkerData,
    RequestCancelActivityTaskAttributes, StartTimerAttributes,
};
use decider_sdk::testing::{HISTORY_START_MILLIS, HistoryBuilder, TEST_TASK_LIST, test_workflow_info};
use decider_sdk::{
    ActivityOptions, ChildWorkflowOptions, EngineError, ReplayDecider, RunnerOptions,
    ThreadHandle, WorkflowContext, WorkflowError, WorkflowExecution, WorkflowFn, WorkflowResult,
    WorkflowThreadPool, replay_history,
};
use parking_lot::Mutex;

fn options() -> RunnerOptions {
    RunnerOptions {
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn replay<F>(history: HistoryBuilder, workflow: F) -> decider_sdk::Result<Vec<Decision>>
where
    F: Fn(&WorkflowContext, &ThreadHandle, Vec<u8>) -> WorkflowResult<Vec<u8>>
        + Send
        + Sync
        + 'static,
{
    let task = history.task();
    let workflow: WorkflowFn = Arc::new(workflow);
    replay_history(
        test_workflow_info(&task.workflow_type),
        workflow,
        WorkflowThreadPool::new(16),
        options(),
        &task.history,
    )
}

fn complete(result: &[u8]) -> Decision {
    Decision::CompleteWorkflowExecution(CompleteWorkflowExecutionAttributes {
        result: result.to_vec(),
    })
}

fn sleeper(
    ctx: &WorkflowContext,
    handle: &ThreadHandle,
    _input: Vec<u8>,
) -> WorkflowResult<Vec<u8>> {
    ctx.sleep(handle, Duration::from_secs(30))?;
    Ok(b"done".to_vec())
}

fn greeter(
    ctx: &WorkflowContext,
    handle: &ThreadHandle,
    input: Vec<u8>,
) -> WorkflowResult<Vec<u8>> {
    ctx.execute_activity(handle, ActivityOptions::new("compose-greeting"), input)
}

#[test]
fn test_first_task_starts_timer() {
    let decisions = replay(HistoryBuilder::new("sleeper"), sleeper).unwrap();

    assert_eq!(
        decisions,
        vec![Decision::StartTimer(StartTimerAttributes {
            timer_id: "0".to_string(),
            start_to_fire_timeout_seconds: 30,
        })]
    );
}

#[test]
fn test_fired_timer_completes_workflow() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let history = HistoryBuilder::new("sleeper")
        .decision_task_completed()
        .timer_started("0", 30)
        .timer_fired("0")
        .decision_task_started();

    let workflow_observed = Arc::clone(&observed);
    let decisions = replay(history, move |ctx, handle, _| {
        workflow_observed
            .lock()
            .push((ctx.is_replaying(), ctx.current_time_millis()));
        ctx.sleep(handle, Duration::from_secs(30))?;
        workflow_observed
            .lock()
            .push((ctx.is_replaying(), ctx.current_time_millis()));
        Ok(b"done".to_vec())
    })
    .unwrap();

    assert_eq!(decisions, vec![complete(b"done")]);
    assert_eq!(
        *observed.lock(),
        vec![
            (true, HISTORY_START_MILLIS),
            (false, HISTORY_START_MILLIS + 30_000)
        ]
    );
}

#[test]
fn test_completed_activity_result_returned() {
    let history = HistoryBuilder::with_input("greeter", b"Ada".to_vec())
        .decision_task_completed()
        .activity_scheduled("0", "compose-greeting")
        .activity_started("0")
        .activity_completed("0", b"Hello, Ada!")
        .decision_task_started();

    let decisions = replay(history, greeter).unwrap();

    assert_eq!(decisions, vec![complete(b"Hello, Ada!")]);
}

#[test]
fn test_activity_defaults_to_workflow_task_list() {
    let decisions = replay(
        HistoryBuilder::with_input("greeter", b"Ada".to_vec()),
        greeter,
    )
    .unwrap();

    assert!(matches!(
        decisions.as_slice(),
        [Decision::ScheduleActivityTask(attrs)]
            if attrs.activity_id == "0"
                && attrs.activity_type == "compose-greeting"
                && attrs.task_list == TEST_TASK_LIST
                && attrs.input == b"Ada"
    ));
}

#[test]
fn test_failed_activity_fails_workflow() {
    let history = HistoryBuilder::new("greeter")
        .decision_task_completed()
        .activity_scheduled("0", "compose-greeting")
        .activity_failed("0", "template missing")
        .decision_task_started();

    let decisions = replay(history, greeter).unwrap();

    assert_eq!(
        decisions,
        vec![Decision::FailWorkflowExecution(
            FailWorkflowExecutionAttributes {
                reason: "activity compose-greeting failed: template missing".to_string(),
                details: Vec::new(),
            }
        )]
    );
}

#[test]
fn test_application_failure_fails_workflow() {
    let decisions = replay(HistoryBuilder::new("payments"), |_, _, _| {
        Err(WorkflowError::application("payment declined"))
    })
    .unwrap();

    assert_eq!(
        decisions,
        vec![Decision::FailWorkflowExecution(
            FailWorkflowExecutionAttributes {
                reason: "payment declined".to_string(),
                details: Vec::new(),
            }
        )]
    );
}

#[test]
fn test_diverged_code_is_non_deterministic() {
    let history = HistoryBuilder::new("sleeper")
        .decision_task_completed()
        .activity_scheduled("0", "compose-greeting")
        .decision_task_started();

    let err = replay(history, sleeper).unwrap_err();

    assert!(matches!(err, EngineError::NonDeterministic(_)));
    assert_eq!(err.error_code(), "NON_DETERMINISTIC");
}

#[test]
fn test_missing_command_is_non_deterministic() {
    // History recorded a timer the code never starts.
    let history = HistoryBuilder::new("payments")
        .decision_task_completed()
        .timer_started("0", 30)
        .decision_task_started();

    let err = replay(history, |_, handle, _| {
        handle.yield_until("never", || false)?;
        Ok(Vec::new())
    })
    .unwrap_err();

    assert!(matches!(err, EngineError::NonDeterministic(_)));
}

#[test]
fn test_side_effect_replayed_from_marker() {
    let calls = Arc::new(AtomicUsize::new(0));
    let history = HistoryBuilder::new("orders")
        .decision_task_completed()
        .side_effect_marker(b"order-7")
        .timer_started("0", 10)
        .timer_fired("0")
        .decision_task_started();

    let workflow_calls = Arc::clone(&calls);
    let decisions = replay(history, move |ctx, handle, _| {
        let order_id = ctx.side_effect(|| {
            workflow_calls.fetch_add(1, Ordering::SeqCst);
            b"order-live".to_vec()
        })?;
        ctx.sleep(handle, Duration::from_secs(10))?;
        Ok(order_id)
    })
    .unwrap();

    assert_eq!(decisions, vec![complete(b"order-7")]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_side_effect_json_live() {
    let decisions = replay(HistoryBuilder::new("orders"), |ctx, _, _| {
        let order_id: u64 = ctx.side_effect_json(|| 7_u64)?;
        Ok(order_id.to_string().into_bytes())
    })
    .unwrap();

    let types: Vec<DecisionType> = decisions.iter().map(Decision::decision_type).collect();
    assert_eq!(
        types,
        vec![
            DecisionType::RecordMarker,
            DecisionType::CompleteWorkflowExecution
        ]
    );
    assert_eq!(decisions[1], complete(b"7"));
}

fn versioned(
    ctx: &WorkflowContext,
    handle: &ThreadHandle,
    _input: Vec<u8>,
) -> WorkflowResult<Vec<u8>> {
    let version = ctx.get_version("add-fraud-check", DEFAULT_VERSION, 1)?;
    if version == 1 {
        ctx.execute_activity(handle, ActivityOptions::new("fraud-check"), Vec::new())?;
    }
    ctx.sleep(handle, Duration::from_secs(10))?;
    Ok(version.to_string().into_bytes())
}

#[test]
fn test_new_execution_takes_latest_version() {
    let decisions = replay(HistoryBuilder::new("checkout"), versioned).unwrap();

    let types: Vec<DecisionType> = decisions.iter().map(Decision::decision_type).collect();
    assert_eq!(
        types,
        vec![
            DecisionType::RecordMarker,
            DecisionType::ScheduleActivityTask
        ]
    );
}

#[test]
fn test_history_without_version_marker_keeps_old_path() {
    let history = HistoryBuilder::new("checkout")
        .decision_task_completed()
        .timer_started("0", 10)
        .timer_fired("0")
        .decision_task_started();

    let decisions = replay(history, versioned).unwrap();

    assert_eq!(decisions, vec![complete(b"-1")]);
}

#[test]
fn test_workflow_cancellation_cancels_timer() {
    let history = HistoryBuilder::new("sleeper")
        .decision_task_completed()
        .timer_started("0", 30)
        .workflow_cancel_requested("operator")
        .decision_task_started();

    let decisions = replay(history, sleeper).unwrap();

    assert_eq!(
        decisions,
        vec![
            Decision::CancelTimer(CancelTimerAttributes {
                timer_id: "0".to_string(),
            }),
            Decision::CancelWorkflowExecution(CancelWorkflowExecutionAttributes {
                details: b"operator".to_vec(),
            }),
        ]
    );
}

#[test]
fn test_workflow_cancellation_waits_for_activity() {
    let cancel_requested = HistoryBuilder::new("greeter")
        .decision_task_completed()
        .activity_scheduled("0", "compose-greeting")
        .workflow_cancel_requested("operator")
        .decision_task_started();

    let decisions = replay(cancel_requested.clone(), greeter).unwrap();
    assert_eq!(
        decisions,
        vec![Decision::RequestCancelActivityTask(
            RequestCancelActivityTaskAttributes {
                activity_id: "0".to_string(),
            }
        )]
    );

    let canceled = cancel_requested
        .decision_task_completed()
        .activity_cancel_requested("0")
        .activity_canceled("0")
        .decision_task_started();

    let decisions = replay(canceled, greeter).unwrap();
    assert_eq!(
        decisions,
        vec![Decision::CancelWorkflowExecution(
            CancelWorkflowExecutionAttributes {
                details: Vec::new(),
            }
        )]
    );
}

fn approval(
    ctx: &WorkflowContext,
    handle: &ThreadHandle,
    _input: Vec<u8>,
) -> WorkflowResult<Vec<u8>> {
    let approved = ctx.await_condition_with_timeout(handle, Duration::from_secs(90), || false)?;
    Ok(if approved {
        b"approved".to_vec()
    } else {
        b"expired".to_vec()
    })
}

#[test]
fn test_timed_wait_arms_wake_up_timer() {
    let decisions = replay(HistoryBuilder::new("approval"), approval).unwrap();

    assert_eq!(
        decisions,
        vec![Decision::StartTimer(StartTimerAttributes {
            timer_id: "0".to_string(),
            start_to_fire_timeout_seconds: 90,
        })]
    );
}

#[test]
fn test_wake_up_timer_expires_wait() {
    let history = HistoryBuilder::new("approval")
        .decision_task_completed()
        .timer_started("0", 90)
        .timer_fired("0")
        .decision_task_started();

    let decisions = replay(history, approval).unwrap();

    assert_eq!(decisions, vec![complete(b"expired")]);
}

#[test]
fn test_continue_as_new() {
    let decisions = replay(HistoryBuilder::new("poller"), |ctx, _, _| {
        Err(ctx.continue_as_new(b"cursor-2".to_vec()))
    })
    .unwrap();

    assert_eq!(
        decisions,
        vec![Decision::ContinueAsNewWorkflowExecution(
            ContinueAsNewWorkflowExecutionAttributes {
                workflow_type: "poller".to_string(),
                task_list: TEST_TASK_LIST.to_string(),
                input: b"cursor-2".to_vec(),
                execution_start_to_close_timeout_seconds: None,
                task_start_to_close_timeout_seconds: None,
            }
        )]
    );
}

#[test]
fn test_child_workflow_result() {
    let history = HistoryBuilder::new("parent")
        .decision_task_completed()
        .child_workflow_initiated("workflow-1-child-0", "child")
        .child_workflow_started("workflow-1-child-0")
        .child_workflow_completed("workflow-1-child-0", b"child-out")
        .decision_task_started();

    let decisions = replay(history, |ctx, handle, _| {
        let child = ctx.start_child_workflow(handle, ChildWorkflowOptions::new("child"), Vec::new())?;
        let execution = child.execution(handle)?;
        if execution.run_id != "workflow-1-child-0-run" {
            return Err(WorkflowError::application("unexpected child run"));
        }
        child.result(handle)
    })
    .unwrap();

    assert_eq!(decisions, vec![complete(b"child-out")]);
}

#[test]
fn test_signal_external_workflow() {
    let history = HistoryBuilder::new("notifier")
        .decision_task_completed()
        .signal_initiated("other", "ping")
        .external_workflow_signaled("other")
        .decision_task_started();

    let decisions = replay(history, |ctx, handle, _| {
        ctx.signal_external_workflow(handle, WorkflowExecution::new("other", ""), "ping", Vec::new())?;
        Ok(b"signaled".to_vec())
    })
    .unwrap();

    assert_eq!(decisions, vec![complete(b"signaled")]);
}

#[test]
fn test_threads_schedule_in_deterministic_order() {
    let fan_out = |ctx: &WorkflowContext, handle: &ThreadHandle, _: Vec<u8>| -> WorkflowResult<Vec<u8>> {
        let mut threads = Vec::new();
        for activity_type in ["pack", "ship"] {
            let ctx = ctx.clone();
            threads.push(handle.new_thread(activity_type, move |handle| {
                ctx.execute_activity(handle, ActivityOptions::new(activity_type), Vec::new())?;
                Ok(())
            })?);
        }
        for thread in &threads {
            thread.join(handle)?;
        }
        Ok(Vec::new())
    };

    let first = replay(HistoryBuilder::new("fan-out"), fan_out).unwrap();
    let second = replay(HistoryBuilder::new("fan-out"), fan_out).unwrap();

    assert_eq!(first, second);
    let scheduled: Vec<(String, String)> = first
        .iter()
        .filter_map(|d| match d {
            Decision::ScheduleActivityTask(attrs) => {
                Some((attrs.activity_id.clone(), attrs.activity_type.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        scheduled,
        vec![
            ("0".to_string(), "pack".to_string()),
            ("1".to_string(), "ship".to_string())
        ]
    );
}

#[test]
fn test_closed_history_produces_no_decisions() {
    let history = HistoryBuilder::new("sleeper")
        .decision_task_completed()
        .workflow_completed(b"done");

    let decisions = replay(history, |_, _, _| Ok(b"done".to_vec())).unwrap();

    assert!(decisions.is_empty());
}

#[test]
fn test_decider_is_single_use() {
    let history = HistoryBuilder::new("sleeper").build();
    let workflow: WorkflowFn = Arc::new(sleeper);
    let mut decider = ReplayDecider::new(
        test_workflow_info("sleeper"),
        workflow,
        WorkflowThreadPool::new(4),
        options(),
    );

    assert_eq!(decider.decide(&history).unwrap().len(), 1);
    assert!(!decider.is_completed());
    assert!(decider.stack_trace().contains("BLOCKED on timer"));

    let err = decider.decide(&history).unwrap_err();
    assert!(matches!(err, EngineError::IllegalState(_)));
    decider.close().unwrap();
}

/// Books carrier A, then after ten seconds books carrier B and cancels A.
/// B is scheduled before A's cancellation is requested.
fn reroute(
    ctx: &WorkflowContext,
    handle: &ThreadHandle,
    _input: Vec<u8>,
) -> WorkflowResult<Vec<u8>> {
    let rerouted = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&rerouted);
    let second_ctx = ctx.clone();
    let second = handle.new_thread("carrier-b", move |handle| {
        handle.yield_until("reroute", || flag.load(Ordering::SeqCst))?;
        second_ctx.execute_activity(handle, ActivityOptions::new("book-carrier-b"), Vec::new())?;
        Ok(())
    })?;
    let first_ctx = ctx.clone();
    let first = handle.new_thread("carrier-a", move |handle| {
        first_ctx.execute_activity(handle, ActivityOptions::new("book-carrier-a"), Vec::new())?;
        Ok(())
    })?;

    ctx.sleep(handle, Duration::from_secs(10))?;
    rerouted.store(true, Ordering::SeqCst);
    first.cancel(Some("rerouted".to_string()));
    first.join(handle)?;
    second.join(handle)?;
    Ok(b"rerouted".to_vec())
}

#[test]
fn test_cancel_requested_after_schedule_replays() {
    let first_task = replay(HistoryBuilder::new("reroute"), reroute).unwrap();
    let types: Vec<DecisionType> = first_task.iter().map(Decision::decision_type).collect();
    assert_eq!(
        types,
        vec![DecisionType::StartTimer, DecisionType::ScheduleActivityTask]
    );

    let rerouting = HistoryBuilder::new("reroute")
        .decision_task_completed()
        .timer_started("0", 10)
        .activity_scheduled("1", "book-carrier-a")
        .timer_fired("0")
        .decision_task_started();
    let decisions = replay(rerouting.clone(), reroute).unwrap();
    assert!(matches!(
        decisions.as_slice(),
        [
            Decision::ScheduleActivityTask(schedule),
            Decision::RequestCancelActivityTask(cancel),
        ] if schedule.activity_id == "2"
            && schedule.activity_type == "book-carrier-b"
            && cancel.activity_id == "1"
    ));

    // The service records the commands in the order they were sent.
    let recorded = rerouting
        .decision_task_completed()
        .activity_scheduled("2", "book-carrier-b")
        .activity_cancel_requested("1")
        .activity_canceled("1")
        .decision_task_started();
    let decisions = replay(recorded, reroute).unwrap();
    assert!(decisions.is_empty());
}

fn memoized(
    ctx: &WorkflowContext,
    handle: &ThreadHandle,
    _input: Vec<u8>,
) -> WorkflowResult<Vec<u8>> {
    let order_id = ctx.side_effect(|| b"order-live".to_vec())?;
    let config = ctx
        .mutable_side_effect("config", |_| Some(b"config-live".to_vec()))?
        .unwrap_or_default();
    ctx.sleep(handle, Duration::from_secs(10))?;
    Ok([order_id, config].join(&b'/'))
}

#[test]
fn test_same_history_replays_identically() {
    let history = HistoryBuilder::new("memoized")
        .decision_task_completed()
        .side_effect_marker(b"order-7")
        .mutable_side_effect_marker("config", b"v2")
        .timer_started("0", 10)
        .timer_fired("0")
        .decision_task_started();

    let first = replay(history.clone(), memoized).unwrap();
    let second = replay(history, memoized).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, vec![complete(b"order-7/v2")]);
}

#[test]
fn test_removed_version_call_replays() {
    // Recorded by code that still asked for "legacy-pricing".
    let history = HistoryBuilder::new("sleeper")
        .decision_task_completed()
        .version_marker("legacy-pricing", 1)
        .timer_started("0", 30)
        .timer_fired("0")
        .decision_task_started();

    let decisions = replay(history, sleeper).unwrap();

    assert_eq!(decisions, vec![complete(b"done")]);
}

fn quote(
    calls: Arc<AtomicUsize>,
) -> impl Fn(&WorkflowContext, &ThreadHandle, Vec<u8>) -> WorkflowResult<Vec<u8>> + Send + Sync + 'static
{
    move |ctx, handle, _| {
        let calls = Arc::clone(&calls);
        let rate = ctx.execute_local_activity(handle, "lookup-rate", b"EUR".to_vec(), move |input| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok([input.as_slice(), b":1.1"].concat())
        })?;
        ctx.sleep(handle, Duration::from_secs(10))?;
        Ok(rate)
    }
}

#[test]
fn test_local_activity_recorded_live() {
    let calls = Arc::new(AtomicUsize::new(0));

    let decisions = replay(HistoryBuilder::new("quote"), quote(Arc::clone(&calls))).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let Decision::RecordMarker(marker) = &decisions[0] else {
        panic!("expected a marker, got {:?}", decisions[0]);
    };
    assert_eq!(marker.marker_name, LOCAL_ACTIVITY_MARKER_NAME);
    let recorded: LocalActivityMarkerData = serde_json::from_slice(&marker.details).unwrap();
    assert_eq!(recorded.activity_id, "0");
    assert_eq!(recorded.result, b"EUR:1.1");
    assert!(matches!(
        &decisions[1],
        Decision::StartTimer(attrs) if attrs.timer_id == "1"
    ));
}

#[test]
fn test_local_activity_replayed_from_marker() {
    let calls = Arc::new(AtomicUsize::new(0));
    let recorded = LocalActivityMarkerData {
        activity_id: "0".to_string(),
        activity_type: "lookup-rate".to_string(),
        err_reason: None,
        err_details: Vec::new(),
        result: b"EUR:1.2".to_vec(),
        replay_time: HISTORY_START_MILLIS,
    };
    let history = HistoryBuilder::new("quote")
        .decision_task_completed()
        .marker(
            LOCAL_ACTIVITY_MARKER_NAME,
            serde_json::to_vec(&recorded).unwrap(),
        )
        .timer_started("1", 10)
        .timer_fired("1")
        .decision_task_started();

    let decisions = replay(history, quote(Arc::clone(&calls))).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(decisions, vec![complete(b"EUR:1.2")]);
}

#[test]
fn test_failed_local_activity_fails_workflow() {
    let decisions = replay(HistoryBuilder::new("quote"), |ctx, handle, _| {
        ctx.execute_local_activity(handle, "lookup-rate", Vec::new(), |_| {
            Err(WorkflowError::application("rate service down"))
        })
    })
    .unwrap();

    assert!(matches!(
        decisions.as_slice(),
        [Decision::RecordMarker(_), Decision::FailWorkflowExecution(attrs)]
            if attrs.reason == "activity lookup-rate failed: rate service down"
    ));
}
