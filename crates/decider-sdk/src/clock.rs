// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic clock and side-effect context.
//!
//! Workflow code must read time, create timers and run non-deterministic
//! computations only through this context. Time comes from history, timers
//! become commands, and side-effect results are recorded as markers so a
//! replay returns exactly what the original execution saw.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use decider_protocol::{
    DEFAULT_VERSION, HistoryEvent, LOCAL_ACTIVITY_MARKER_NAME, LocalActivityMarkerData,
    MUTABLE_SIDE_EFFECT_MARKER_NAME, MarkerName, MarkerPayload, MarkerRecordedAttributes,
    SIDE_EFFECT_MARKER_NAME, StartTimerAttributes, TimerCanceledAttributes, TimerFiredAttributes,
    VERSION_MARKER_NAME,
};
use tracing::{debug, warn};

use crate::error::{EngineError, Result, WorkflowError};
use crate::tracker::DecisionTracker;

/// Invoked once when a timer fires (`Ok`) or is canceled (`Err(Cancelled)`).
pub type TimerCallback = Box<dyn FnOnce(std::result::Result<(), WorkflowError>) + Send>;

struct PendingTimer {
    fire_time_ms: i64,
    callback: TimerCallback,
}

/// Recorded values of one mutable side effect or version id, keyed by the
/// event id of the marker that recorded them.
type MarkerValues = BTreeMap<i64, Vec<u8>>;

/// Remembers a default version decided during replay without a marker.
const DEFAULT_VERSION_KEY: i64 = i64::MIN;

/// Virtual clock, pending timers and side-effect memoization of one
/// workflow execution.
pub struct ClockContext {
    replay_current_time_ms: i64,
    replaying: bool,
    /// started event id -> timer
    timers: HashMap<i64, PendingTimer>,
    /// marker event id -> result
    side_effect_results: HashMap<i64, Vec<u8>>,
    mutable_side_effects: HashMap<String, MarkerValues>,
    versions: HashMap<String, MarkerValues>,
    /// activity id -> recorded outcome
    local_activity_results: HashMap<String, LocalActivityMarkerData>,
}

impl Default for ClockContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockContext {
    pub fn new() -> Self {
        Self {
            replay_current_time_ms: 0,
            replaying: true,
            timers: HashMap::new(),
            side_effect_results: HashMap::new(),
            mutable_side_effects: HashMap::new(),
            versions: HashMap::new(),
            local_activity_results: HashMap::new(),
        }
    }

    pub fn current_time_millis(&self) -> i64 {
        self.replay_current_time_ms
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.replay_current_time_ms).unwrap_or_default()
    }

    /// Only the replay driver moves the clock, from decision task timestamps.
    pub fn set_replay_current_time_millis(&mut self, time_ms: i64) {
        self.replay_current_time_ms = time_ms;
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Start a durable timer.
    ///
    /// A zero delay completes `callback` synchronously without a command
    /// and returns `None`. Otherwise returns the timer's started event id,
    /// which identifies it for [`cancel_timer`](Self::cancel_timer).
    pub fn create_timer(
        &mut self,
        tracker: &mut DecisionTracker,
        delay_seconds: i64,
        callback: TimerCallback,
    ) -> Result<Option<i64>> {
        if delay_seconds < 0 {
            return Err(EngineError::InvalidArgument(format!(
                "negative timer delay: {}s",
                delay_seconds
            )));
        }
        if delay_seconds == 0 {
            callback(Ok(()));
            return Ok(None);
        }

        let fire_time_ms = delay_seconds
            .checked_mul(1_000)
            .and_then(|delay_ms| self.current_time_millis().checked_add(delay_ms))
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!(
                    "timer delay of {}s is out of range",
                    delay_seconds
                ))
            })?;
        let timer_id = tracker.next_id().to_string();
        let started_event_id = tracker.start_timer(StartTimerAttributes {
            timer_id: timer_id.clone(),
            start_to_fire_timeout_seconds: delay_seconds,
        });
        debug!(timer_id = %timer_id, started_event_id, fire_time_ms, "Timer created");
        self.timers.insert(
            started_event_id,
            PendingTimer {
                fire_time_ms,
                callback,
            },
        );
        Ok(Some(started_event_id))
    }

    /// Cancel a timer created by this context. The pending callback
    /// completes with a cancellation carrying `reason`.
    pub fn cancel_timer(
        &mut self,
        tracker: &mut DecisionTracker,
        started_event_id: i64,
        reason: Option<String>,
    ) -> Result<()> {
        let Some(timer) = self.timers.remove(&started_event_id) else {
            return Ok(());
        };
        let callback = timer.callback;
        tracker.cancel_timer(
            started_event_id,
            Some(Box::new(move || {
                callback(Err(WorkflowError::Cancelled { reason }))
            })),
        )?;
        Ok(())
    }

    pub fn handle_timer_fired(
        &mut self,
        tracker: &mut DecisionTracker,
        attributes: &TimerFiredAttributes,
    ) -> Result<()> {
        if tracker.handle_timer_closed(attributes)? {
            if let Some(timer) = self.timers.remove(&attributes.started_event_id) {
                (timer.callback)(Ok(()));
            }
        }
        Ok(())
    }

    pub fn handle_timer_canceled(
        &mut self,
        tracker: &mut DecisionTracker,
        attributes: &TimerCanceledAttributes,
    ) -> Result<()> {
        if tracker.handle_timer_canceled(attributes)? {
            if let Some(timer) = self.timers.remove(&attributes.started_event_id) {
                (timer.callback)(Err(WorkflowError::Cancelled { reason: None }));
            }
        }
        Ok(())
    }

    pub fn has_pending_timer(&self, started_event_id: i64) -> bool {
        self.timers.contains_key(&started_event_id)
    }

    pub fn pending_timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Absolute virtual time the timer fires at.
    pub fn timer_fire_time(&self, started_event_id: i64) -> Option<i64> {
        self.timers.get(&started_event_id).map(|t| t.fire_time_ms)
    }

    // ========================================================================
    // Side effects
    // ========================================================================

    /// Run `func` once and record its result; during replay return the
    /// recorded result instead. A missing recording is replay-fatal.
    pub fn side_effect<F>(&mut self, tracker: &mut DecisionTracker, func: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Vec<u8>,
    {
        tracker.add_missing_version_markers(None);
        let event_id = tracker.next_decision_event_id();
        let result = if self.replaying {
            self.side_effect_results
                .remove(&event_id)
                .ok_or(EngineError::MissingSideEffectResult { event_id })?
        } else {
            func()
        };
        tracker.record_marker(SIDE_EFFECT_MARKER_NAME, result.clone());
        Ok(result)
    }

    /// Side effect that is recorded only when its value changes.
    ///
    /// `func` receives the latest recorded value and returns a new value to
    /// record, or `None` to keep the current one. It is never called while
    /// replaying.
    pub fn mutable_side_effect<F>(
        &mut self,
        tracker: &mut DecisionTracker,
        id: &str,
        func: F,
    ) -> Result<Option<Vec<u8>>>
    where
        F: FnOnce(Option<&[u8]>) -> Option<Vec<u8>>,
    {
        tracker.add_missing_version_markers(None);
        let event_id = tracker.next_decision_event_id();
        let values = self.mutable_side_effects.entry(id.to_string()).or_default();

        if self.replaying {
            if let Some(data) = values.get(&event_id) {
                let details = MarkerPayload::new(id, data.clone()).encode()?;
                tracker.record_marker(MUTABLE_SIDE_EFFECT_MARKER_NAME, details.to_vec());
                return Ok(Some(data.clone()));
            }
            return Ok(latest_before(values, event_id).cloned());
        }

        let stored = latest_before(values, event_id).cloned();
        match func(stored.as_deref()) {
            Some(data) => {
                let details = MarkerPayload::new(id, data.clone()).encode()?;
                let marker_event_id =
                    tracker.record_marker(MUTABLE_SIDE_EFFECT_MARKER_NAME, details.to_vec());
                values.insert(marker_event_id, data.clone());
                Ok(Some(data))
            }
            None => Ok(stored),
        }
    }

    /// Version of the code path guarded by `change_id`.
    ///
    /// New executions record `max_supported`. Executions that reached this
    /// point before the change existed replay without a marker and get
    /// [`DEFAULT_VERSION`].
    pub fn get_version(
        &mut self,
        tracker: &mut DecisionTracker,
        change_id: &str,
        min_supported: i32,
        max_supported: i32,
    ) -> Result<i32> {
        tracker.add_missing_version_markers(Some(change_id));
        let event_id = tracker.next_decision_event_id();
        let values = self.versions.entry(change_id.to_string()).or_default();

        let version = if let Some(data) = values.get(&event_id) {
            let details = MarkerPayload::new(change_id, data.clone()).encode()?;
            tracker.record_marker(VERSION_MARKER_NAME, details.to_vec());
            serde_json::from_slice(data)?
        } else if let Some(data) = latest_before(values, event_id) {
            serde_json::from_slice(data)?
        } else if self.replaying {
            values.insert(DEFAULT_VERSION_KEY, serde_json::to_vec(&DEFAULT_VERSION)?);
            DEFAULT_VERSION
        } else {
            let data = serde_json::to_vec(&max_supported)?;
            let details = MarkerPayload::new(change_id, data.clone()).encode()?;
            let marker_event_id = tracker.record_marker(VERSION_MARKER_NAME, details.to_vec());
            values.insert(marker_event_id, data);
            max_supported
        };

        if version < min_supported || version > max_supported {
            return Err(EngineError::UnsupportedVersion {
                change_id: change_id.to_string(),
                version,
                min_supported,
                max_supported,
            });
        }
        Ok(version)
    }

    // ========================================================================
    // Local activities
    // ========================================================================

    /// Run a short activity inside the decider and record its outcome in a
    /// marker. While replaying the recorded outcome is returned and `func`
    /// is not called.
    pub fn execute_local_activity<F>(
        &mut self,
        tracker: &mut DecisionTracker,
        activity_type: &str,
        func: F,
    ) -> Result<LocalActivityMarkerData>
    where
        F: FnOnce() -> std::result::Result<Vec<u8>, String>,
    {
        tracker.add_missing_version_markers(None);
        let activity_id = tracker.next_id().to_string();

        let outcome = match self.local_activity_results.remove(&activity_id) {
            Some(recorded) if recorded.activity_type == activity_type => recorded,
            Some(recorded) => {
                return Err(EngineError::NonDeterministic(format!(
                    "local activity {} was recorded as {} but the workflow code ran {}",
                    activity_id, recorded.activity_type, activity_type
                )));
            }
            None if self.replaying => {
                return Err(EngineError::NonDeterministic(format!(
                    "local activity {} ({}) has no recorded marker",
                    activity_id, activity_type
                )));
            }
            None => {
                let (result, err_reason) = match func() {
                    Ok(result) => (result, None),
                    Err(reason) => (Vec::new(), Some(reason)),
                };
                LocalActivityMarkerData {
                    activity_id,
                    activity_type: activity_type.to_string(),
                    err_reason,
                    err_details: Vec::new(),
                    result,
                    replay_time: self.current_time_millis(),
                }
            }
        };

        let details = serde_json::to_vec(&outcome)?;
        let marker_event_id = tracker.record_marker(LOCAL_ACTIVITY_MARKER_NAME, details);
        debug!(
            activity_id = %outcome.activity_id,
            activity_type = %outcome.activity_type,
            marker_event_id,
            failed = outcome.err_reason.is_some(),
            "Local activity recorded"
        );
        Ok(outcome)
    }

    /// Fill the memoization caches from a recorded marker. Must run before
    /// workflow code reaches the matching call site.
    pub fn handle_marker_recorded(
        &mut self,
        tracker: &mut DecisionTracker,
        event: &HistoryEvent,
    ) -> Result<()> {
        let decider_protocol::EventAttributes::MarkerRecorded(MarkerRecordedAttributes {
            marker_name,
            details,
            ..
        }) = &event.attributes
        else {
            return Err(EngineError::Internal(format!(
                "event {} is not a marker",
                event.event_id
            )));
        };

        match MarkerName::parse(marker_name) {
            Some(MarkerName::SideEffect) => {
                self.side_effect_results
                    .insert(event.event_id, details.clone());
            }
            Some(MarkerName::MutableSideEffect) => {
                let payload = MarkerPayload::decode(details)?;
                self.mutable_side_effects
                    .entry(payload.id)
                    .or_default()
                    .insert(event.event_id, payload.data);
            }
            Some(MarkerName::Version) => {
                let payload = MarkerPayload::decode(details)?;
                tracker.add_history_version_marker(
                    event.event_id,
                    payload.id.clone(),
                    details.clone(),
                );
                self.versions
                    .entry(payload.id)
                    .or_default()
                    .insert(event.event_id, payload.data);
            }
            Some(MarkerName::LocalActivity) => {
                let outcome: LocalActivityMarkerData = serde_json::from_slice(details)?;
                self.local_activity_results
                    .insert(outcome.activity_id.clone(), outcome);
            }
            None => {
                warn!(
                    event_id = event.event_id,
                    marker_name = %marker_name,
                    "Unexpected marker ignored"
                );
            }
        }
        Ok(())
    }
}

fn latest_before(values: &MarkerValues, event_id: i64) -> Option<&Vec<u8>> {
    values.range(..event_id).next_back().map(|(_, data)| data)
}

impl std::fmt::Debug for ClockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockContext")
            .field("replay_current_time_ms", &self.replay_current_time_ms)
            .field("replaying", &self.replaying)
            .field("pending_timers", &self.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decider_protocol::{Decision, EventAttributes};

    fn marker(event_id: i64, name: &str, details: Vec<u8>) -> HistoryEvent {
        HistoryEvent::new(
            event_id,
            0,
            EventAttributes::MarkerRecorded(MarkerRecordedAttributes {
                marker_name: name.to_string(),
                details,
                decision_task_completed_event_id: event_id - 1,
            }),
        )
    }

    #[test]
    fn test_current_time_from_replay_clock() {
        let mut clock = ClockContext::new();
        clock.set_replay_current_time_millis(1_700_000_000_123);
        assert_eq!(clock.current_time_millis(), 1_700_000_000_123);
        assert_eq!(clock.current_time().timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_side_effect_replay_uses_recorded_result() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        tracker.start_decision_task(3);
        clock
            .handle_marker_recorded(&mut tracker, &marker(5, SIDE_EFFECT_MARKER_NAME, vec![42]))
            .unwrap();

        let result = clock
            .side_effect(&mut tracker, || panic!("must not run during replay"))
            .unwrap();
        assert_eq!(result, vec![42]);
        assert_eq!(tracker.decisions().len(), 1);
    }

    #[test]
    fn test_side_effect_missing_result_is_fatal() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        tracker.start_decision_task(3);

        let err = clock.side_effect(&mut tracker, || vec![1]).unwrap_err();
        assert_eq!(err, EngineError::MissingSideEffectResult { event_id: 5 });
        assert!(tracker.decisions().is_empty());
    }

    #[test]
    fn test_unknown_marker_is_ignored() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        clock
            .handle_marker_recorded(&mut tracker, &marker(5, "RetryState", vec![1, 2]))
            .unwrap();
    }

    #[test]
    fn test_malformed_mutable_marker_is_fatal() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        let err = clock
            .handle_marker_recorded(
                &mut tracker,
                &marker(5, MUTABLE_SIDE_EFFECT_MARKER_NAME, vec![0, 9]),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::MarkerDecode(_)));
    }

    #[test]
    fn test_local_activity_runs_once_live() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        clock.set_replaying(false);
        clock.set_replay_current_time_millis(7_000);
        tracker.start_decision_task(3);

        let outcome = clock
            .execute_local_activity(&mut tracker, "lookup-rate", || Ok(b"1.1".to_vec()))
            .unwrap();
        assert_eq!(outcome.activity_id, "0");
        assert_eq!(outcome.result, b"1.1");
        assert_eq!(outcome.replay_time, 7_000);
        assert!(matches!(
            tracker.decisions().as_slice(),
            [Decision::RecordMarker(attrs)] if attrs.marker_name == LOCAL_ACTIVITY_MARKER_NAME
        ));
    }

    #[test]
    fn test_local_activity_replay_uses_marker() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        tracker.start_decision_task(3);
        let recorded = LocalActivityMarkerData {
            activity_id: "0".to_string(),
            activity_type: "lookup-rate".to_string(),
            err_reason: Some("rate service down".to_string()),
            err_details: Vec::new(),
            result: Vec::new(),
            replay_time: 7_000,
        };
        clock
            .handle_marker_recorded(
                &mut tracker,
                &marker(
                    5,
                    LOCAL_ACTIVITY_MARKER_NAME,
                    serde_json::to_vec(&recorded).unwrap(),
                ),
            )
            .unwrap();

        let outcome = clock
            .execute_local_activity(&mut tracker, "lookup-rate", || {
                panic!("must not run during replay")
            })
            .unwrap();
        assert_eq!(outcome, recorded);
        assert_eq!(tracker.next_decision_event_id(), 6);
    }

    #[test]
    fn test_local_activity_without_marker_during_replay_is_fatal() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        tracker.start_decision_task(3);

        let err = clock
            .execute_local_activity(&mut tracker, "lookup-rate", || Ok(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, EngineError::NonDeterministic(_)));
    }

    #[test]
    fn test_removed_version_call_keeps_ids_aligned() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        tracker.start_decision_task(3);
        let details = MarkerPayload::new("old-change", serde_json::to_vec(&1).unwrap())
            .encode()
            .unwrap()
            .to_vec();
        clock
            .handle_marker_recorded(&mut tracker, &marker(5, VERSION_MARKER_NAME, details))
            .unwrap();
        clock
            .handle_marker_recorded(&mut tracker, &marker(6, SIDE_EFFECT_MARKER_NAME, vec![3]))
            .unwrap();

        // The code no longer asks for "old-change"; the side effect still
        // lands on event 6.
        let result = clock
            .side_effect(&mut tracker, || panic!("must not run during replay"))
            .unwrap();
        assert_eq!(result, vec![3]);
        assert_eq!(tracker.next_decision_event_id(), 7);
        assert_eq!(tracker.decisions().len(), 2);
        assert_eq!(clock.get_version(&mut tracker, "old-change", 1, 1).unwrap(), 1);
    }

    #[test]
    fn test_version_live_records_max() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        clock.set_replaying(false);
        tracker.start_decision_task(3);

        assert_eq!(clock.get_version(&mut tracker, "v", 1, 3).unwrap(), 3);
        assert_eq!(clock.get_version(&mut tracker, "v", 1, 3).unwrap(), 3);
        assert_eq!(tracker.decisions().len(), 1);
    }

    #[test]
    fn test_version_replay_without_marker_is_default() {
        let mut clock = ClockContext::new();
        let mut tracker = DecisionTracker::new();
        tracker.start_decision_task(3);

        assert_eq!(
            clock
                .get_version(&mut tracker, "v", DEFAULT_VERSION, 1)
                .unwrap(),
            DEFAULT_VERSION
        );
        clock.set_replaying(false);
        assert_eq!(
            clock
                .get_version(&mut tracker, "v", DEFAULT_VERSION, 1)
                .unwrap(),
            DEFAULT_VERSION
        );
        assert!(tracker.decisions().is_empty());

        let err = clock.get_version(&mut tracker, "v", 1, 2).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedVersion { version: -1, .. }));
    }
}
