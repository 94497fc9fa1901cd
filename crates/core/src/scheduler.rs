//! Logical-time timer queue.
//!
//! Time only moves when the owner pops due timers. Timers are ordered by due tick, then by
//! [`TimerKind`] (progress ticks before credential issue), then by the order they were first
//! scheduled, so replaying the same submissions always fires timers in the same order.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use thiserror::Error;

use crate::domain::request::RequestId;

pub type Tick = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimerId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    ProgressTick,
    CredentialIssue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FiredTimer {
    pub id: TimerId,
    pub request_id: RequestId,
    pub kind: TimerKind,
    pub due: Tick,
}

/// A deadline that would land past the end of the logical clock.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("deadline {delay} ticks after tick {now} exceeds the logical clock")]
pub struct DeadlineOverflow {
    pub now: Tick,
    pub delay: u64,
}

#[derive(Clone, Copy, Debug)]
struct TimerEntry {
    request_id: RequestId,
    period: Option<u64>,
}

type TimerKey = (Tick, TimerKind, TimerId);

#[derive(Debug, Default)]
pub struct Scheduler {
    now: Tick,
    next_timer: u64,
    queue: BTreeMap<TimerKey, TimerEntry>,
    keys: HashMap<TimerId, TimerKey>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn deadline_after(&self, delay: u64) -> Result<Tick, DeadlineOverflow> {
        self.now.checked_add(delay).ok_or(DeadlineOverflow { now: self.now, delay })
    }

    pub fn schedule_once(
        &mut self,
        request_id: RequestId,
        kind: TimerKind,
        delay: u64,
    ) -> Result<TimerId, DeadlineOverflow> {
        let due = self.deadline_after(delay)?;
        Ok(self.insert(request_id, kind, due, None))
    }

    /// Fires every `period` ticks, first at `now + period`, until cancelled.
    pub fn schedule_every(
        &mut self,
        request_id: RequestId,
        kind: TimerKind,
        period: u64,
    ) -> Result<TimerId, DeadlineOverflow> {
        let period = period.max(1);
        let due = self.deadline_after(period)?;
        Ok(self.insert(request_id, kind, due, Some(period)))
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.keys.remove(&id) {
            Some(key) => self.queue.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Tick> {
        self.queue.keys().next().map(|(due, _, _)| *due)
    }

    pub fn active_timers(&self) -> usize {
        self.queue.len()
    }

    pub fn active_timers_for(&self, request_id: RequestId) -> usize {
        self.queue.values().filter(|entry| entry.request_id == request_id).count()
    }

    /// Removes the earliest timer due at or before `until` and moves the clock to its due tick.
    /// Recurring timers are re-armed one period later under the same id, unless that period
    /// would run past the end of the clock.
    pub fn pop_due(&mut self, until: Tick) -> Option<FiredTimer> {
        let (&key, _) = self.queue.iter().next().filter(|((due, _, _), _)| *due <= until)?;
        let entry = self.queue.remove(&key)?;
        let (due, kind, id) = key;
        self.now = self.now.max(due);

        match entry.period.and_then(|period| due.checked_add(period)) {
            Some(next_due) => {
                let next_key = (next_due, kind, id);
                self.queue.insert(next_key, entry);
                self.keys.insert(id, next_key);
            }
            None => {
                self.keys.remove(&id);
            }
        }

        Some(FiredTimer { id, request_id: entry.request_id, kind, due })
    }

    /// Moves the clock forward without firing anything. Callers drain `pop_due` first.
    pub fn settle_at(&mut self, tick: Tick) {
        self.now = self.now.max(tick);
    }

    fn insert(
        &mut self,
        request_id: RequestId,
        kind: TimerKind,
        due: Tick,
        period: Option<u64>,
    ) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;

        let key = (due, kind, id);
        self.queue.insert(key, TimerEntry { request_id, period });
        self.keys.insert(id, key);
        id
    }
}
