// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Splitting a history into decision task batches.

use decider_protocol::{EventAttributes, EventType, HistoryEvent};

/// Events handled by one decision task.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionEvents {
    /// Events recorded since the previous decision task, excluding decision
    /// task bookkeeping.
    pub events: Vec<HistoryEvent>,
    /// Events produced by the commands of this task. Empty for the task
    /// currently being decided.
    pub decision_events: Vec<HistoryEvent>,
    /// The task already completed in history.
    pub replay: bool,
    /// Timestamp of the task's `DecisionTaskStarted` event.
    pub replay_current_time_millis: i64,
    /// `None` when the history ends without a started task.
    pub started_event_id: Option<i64>,
}

impl DecisionEvents {
    pub fn markers(&self) -> impl Iterator<Item = &HistoryEvent> {
        self.decision_events
            .iter()
            .filter(|e| matches!(e.attributes, EventAttributes::MarkerRecorded(_)))
    }
}

/// Iterates a full history one decision task at a time.
///
/// Decision tasks that failed or timed out produced no commands, so their
/// events are folded into the next task.
pub struct DecisionEventsIterator<'a> {
    history: &'a [HistoryEvent],
    position: usize,
}

impl<'a> DecisionEventsIterator<'a> {
    pub fn new(history: &'a [HistoryEvent]) -> Self {
        Self {
            history,
            position: 0,
        }
    }

    fn peek_type(&self) -> Option<EventType> {
        self.history.get(self.position).map(|e| e.event_type())
    }
}

impl Iterator for DecisionEventsIterator<'_> {
    type Item = DecisionEvents;

    fn next(&mut self) -> Option<DecisionEvents> {
        if self.position >= self.history.len() {
            return None;
        }
        let mut batch = DecisionEvents::default();

        while let Some(event) = self.history.get(self.position) {
            self.position += 1;
            match event.event_type() {
                EventType::DecisionTaskStarted => {
                    batch.started_event_id = Some(event.event_id);
                    batch.replay_current_time_millis = event.timestamp_ms;
                    match self.peek_type() {
                        None => return Some(batch),
                        Some(EventType::DecisionTaskCompleted) => {
                            self.position += 1;
                            batch.replay = true;
                            while let Some(next) = self.history.get(self.position) {
                                if !next.event_type().is_decision_event() {
                                    break;
                                }
                                batch.decision_events.push(next.clone());
                                self.position += 1;
                            }
                            return Some(batch);
                        }
                        // Failed or timed out: the next task sees these events too.
                        Some(_) => batch.started_event_id = None,
                    }
                }
                EventType::DecisionTaskScheduled
                | EventType::DecisionTaskCompleted
                | EventType::DecisionTaskFailed
                | EventType::DecisionTaskTimedOut => {}
                _ => batch.events.push(event.clone()),
            }
        }
        Some(batch)
    }
}
