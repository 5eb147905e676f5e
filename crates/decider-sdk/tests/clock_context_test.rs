// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the deterministic clock: timers, side effects and versions.

use decider_sdk::clock::ClockContext;
use decider_sdk::decider_protocol::{
    DEFAULT_VERSION, Decision, DecisionType, HistoryEvent, TimerFiredAttributes,
    TimerStartedAttributes,
};
use decider_sdk::testing::{HISTORY_START_MILLIS, HistoryBuilder};
use decider_sdk::tracker::DecisionTracker;
use decider_sdk::{EngineError, Promise, WorkflowError};

type TimerOutcome = Result<(), WorkflowError>;

fn live_clock() -> (ClockContext, DecisionTracker) {
    let mut clock = ClockContext::new();
    clock.set_replaying(false);
    clock.set_replay_current_time_millis(HISTORY_START_MILLIS);
    let mut tracker = DecisionTracker::new();
    tracker.start_decision_task(3);
    (clock, tracker)
}

fn replay_clock() -> (ClockContext, DecisionTracker) {
    let (mut clock, tracker) = live_clock();
    clock.set_replaying(true);
    (clock, tracker)
}

/// History whose first decision task recorded `markers` right after its
/// `DecisionTaskCompleted` (event 4), so the first marker is event 5.
fn recorded(markers: impl FnOnce(HistoryBuilder) -> HistoryBuilder) -> Vec<HistoryEvent> {
    markers(HistoryBuilder::new("clock-test").decision_task_completed()).build()
}

fn timer_callback(promise: &Promise<TimerOutcome>) -> decider_sdk::clock::TimerCallback {
    let promise = promise.clone();
    Box::new(move |outcome| {
        promise.complete(outcome);
    })
}

#[test]
fn test_timer_fires_after_started() {
    let (mut clock, mut tracker) = live_clock();
    let fired = Promise::new();

    let started_event_id = clock
        .create_timer(&mut tracker, 30, timer_callback(&fired))
        .unwrap()
        .unwrap();
    assert_eq!(started_event_id, 5);
    assert_eq!(
        clock.timer_fire_time(started_event_id),
        Some(HISTORY_START_MILLIS + 30_000)
    );
    assert!(matches!(
        tracker.decisions().as_slice(),
        [Decision::StartTimer(attrs)] if attrs.timer_id == "0" && attrs.start_to_fire_timeout_seconds == 30
    ));

    tracker.handle_decision_task_started_event();
    tracker
        .handle_timer_started(
            started_event_id,
            &TimerStartedAttributes {
                timer_id: "0".to_string(),
                start_to_fire_timeout_seconds: 30,
                decision_task_completed_event_id: 4,
            },
        )
        .unwrap();
    assert!(!fired.is_ready());

    clock
        .handle_timer_fired(
            &mut tracker,
            &TimerFiredAttributes {
                timer_id: "0".to_string(),
                started_event_id,
            },
        )
        .unwrap();
    assert_eq!(fired.get(), Some(Ok(())));
    assert!(!clock.has_pending_timer(started_event_id));
    assert_eq!(clock.pending_timer_count(), 0);
}

#[test]
fn test_zero_delay_timer_completes_without_command() {
    let (mut clock, mut tracker) = live_clock();
    let fired = Promise::new();

    let started_event_id = clock
        .create_timer(&mut tracker, 0, timer_callback(&fired))
        .unwrap();

    assert_eq!(started_event_id, None);
    assert_eq!(fired.get(), Some(Ok(())));
    assert!(tracker.decisions().is_empty());
    assert_eq!(tracker.next_decision_event_id(), 5);
}

#[test]
fn test_negative_delay_rejected() {
    let (mut clock, mut tracker) = live_clock();
    let fired = Promise::new();

    let err = clock
        .create_timer(&mut tracker, -1, timer_callback(&fired))
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidArgument(_)));
    assert!(!fired.is_ready());
}

#[test]
fn test_cancel_unsent_timer_completes_with_reason() {
    let (mut clock, mut tracker) = live_clock();
    let fired = Promise::new();
    let started_event_id = clock
        .create_timer(&mut tracker, 60, timer_callback(&fired))
        .unwrap()
        .unwrap();

    clock
        .cancel_timer(&mut tracker, started_event_id, Some("no longer needed".to_string()))
        .unwrap();

    assert_eq!(
        fired.get(),
        Some(Err(WorkflowError::Cancelled {
            reason: Some("no longer needed".to_string())
        }))
    );
    assert!(tracker.decisions().is_empty());
    assert!(!clock.has_pending_timer(started_event_id));

    // Unknown timers are ignored.
    clock.cancel_timer(&mut tracker, 99, None).unwrap();
}

#[test]
fn test_side_effect_live_records_marker() {
    let (mut clock, mut tracker) = live_clock();

    let result = clock
        .side_effect(&mut tracker, || b"order-42".to_vec())
        .unwrap();

    assert_eq!(result, b"order-42".to_vec());
    assert!(matches!(
        tracker.decisions().as_slice(),
        [Decision::RecordMarker(attrs)] if attrs.marker_name == "SideEffect" && attrs.details == b"order-42"
    ));
}

#[test]
fn test_side_effect_replay_skips_function() {
    let (mut clock, mut tracker) = replay_clock();
    let history = recorded(|b| b.side_effect_marker(b"recorded"));
    clock.handle_marker_recorded(&mut tracker, &history[4]).unwrap();

    let result = clock
        .side_effect(&mut tracker, || panic!("side effect re-executed during replay"))
        .unwrap();

    assert_eq!(result, b"recorded".to_vec());
    assert_eq!(tracker.decisions().len(), 1);
}

#[test]
fn test_mutable_side_effect_records_only_changes() {
    let (mut clock, mut tracker) = live_clock();

    let first = clock
        .mutable_side_effect(&mut tracker, "config", |stored| {
            assert_eq!(stored, None);
            Some(b"a".to_vec())
        })
        .unwrap();
    let unchanged = clock
        .mutable_side_effect(&mut tracker, "config", |stored| {
            assert_eq!(stored, Some(&b"a"[..]));
            None
        })
        .unwrap();
    let changed = clock
        .mutable_side_effect(&mut tracker, "config", |_| Some(b"b".to_vec()))
        .unwrap();

    assert_eq!(first, Some(b"a".to_vec()));
    assert_eq!(unchanged, Some(b"a".to_vec()));
    assert_eq!(changed, Some(b"b".to_vec()));

    let markers: Vec<DecisionType> = tracker
        .decisions()
        .iter()
        .map(Decision::decision_type)
        .collect();
    assert_eq!(markers, vec![DecisionType::RecordMarker; 2]);
}

#[test]
fn test_mutable_side_effect_replay_uses_recorded_value() {
    let (mut clock, mut tracker) = replay_clock();
    let history = recorded(|b| b.mutable_side_effect_marker("config", b"recorded"));
    clock.handle_marker_recorded(&mut tracker, &history[4]).unwrap();

    let value = clock
        .mutable_side_effect(&mut tracker, "config", |_| {
            panic!("mutable side effect evaluated during replay")
        })
        .unwrap();
    assert_eq!(value, Some(b"recorded".to_vec()));

    // Later calls without a marker see the latest recorded value.
    let later = clock
        .mutable_side_effect(&mut tracker, "config", |_| {
            panic!("mutable side effect evaluated during replay")
        })
        .unwrap();
    assert_eq!(later, Some(b"recorded".to_vec()));
    assert_eq!(tracker.decisions().len(), 1);
}

#[test]
fn test_version_live_is_recorded_once() {
    let (mut clock, mut tracker) = live_clock();

    let first = clock.get_version(&mut tracker, "payment-v2", DEFAULT_VERSION, 2).unwrap();
    let second = clock.get_version(&mut tracker, "payment-v2", DEFAULT_VERSION, 2).unwrap();

    assert_eq!(first, 2);
    assert_eq!(second, 2);
    assert_eq!(tracker.decisions().len(), 1);
}

#[test]
fn test_version_replay_from_marker() {
    let (mut clock, mut tracker) = replay_clock();
    let history = recorded(|b| b.version_marker("payment-v2", 1));
    clock.handle_marker_recorded(&mut tracker, &history[4]).unwrap();

    let version = clock.get_version(&mut tracker, "payment-v2", DEFAULT_VERSION, 2).unwrap();

    assert_eq!(version, 1);
    assert!(matches!(
        tracker.decisions().as_slice(),
        [Decision::RecordMarker(attrs)] if attrs.marker_name == "Version"
    ));
}

#[test]
fn test_version_outside_supported_range() {
    let (mut clock, mut tracker) = replay_clock();
    let history = recorded(|b| b.version_marker("payment-v2", 1));
    clock.handle_marker_recorded(&mut tracker, &history[4]).unwrap();

    let err = clock.get_version(&mut tracker, "payment-v2", 2, 3).unwrap_err();

    assert_eq!(
        err,
        EngineError::UnsupportedVersion {
            change_id: "payment-v2".to_string(),
            version: 1,
            min_supported: 2,
            max_supported: 3,
        }
    );
}

#[test]
fn test_marker_handler_rejects_other_events() {
    let (mut clock, mut tracker) = replay_clock();
    let history = HistoryBuilder::new("clock-test").build();

    let err = clock.handle_marker_recorded(&mut tracker, &history[0]).unwrap_err();

    assert!(matches!(err, EngineError::Internal(_)));
}

#[test]
fn test_replaying_same_history_twice_returns_same_values() {
    let history = recorded(|b| {
        b.side_effect_marker(b"order-7")
            .mutable_side_effect_marker("config", b"v2")
    });
    let replay_once = || {
        let (mut clock, mut tracker) = replay_clock();
        for event in &history[4..] {
            clock.handle_marker_recorded(&mut tracker, event).unwrap();
        }
        let order = clock
            .side_effect(&mut tracker, || panic!("side effect re-executed during replay"))
            .unwrap();
        let config = clock
            .mutable_side_effect(&mut tracker, "config", |_| {
                panic!("mutable side effect evaluated during replay")
            })
            .unwrap();
        (order, config, tracker.decisions())
    };

    let first = replay_once();
    let second = replay_once();

    assert_eq!(first, second);
    assert_eq!(first.0, b"order-7".to_vec());
    assert_eq!(first.1, Some(b"v2".to_vec()));
    assert_eq!(first.2.len(), 2);
}

#[test]
fn test_huge_timer_delay_is_invalid() {
    let (mut clock, mut tracker) = live_clock();
    let fired = Promise::new();

    let err = clock
        .create_timer(&mut tracker, i64::MAX / 100, timer_callback(&fired))
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidArgument(_)));
    assert!(!fired.is_ready());
    assert!(tracker.decisions().is_empty());
}
