use std::collections::BTreeMap;

use chrono::{DateTime, Local};

use crate::prelude::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Alarm {
    HourBoundary,
    MonthBoundary,
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlarmId(u64);

/// Fire-once alarms of the host.
pub trait Scheduler {
    fn schedule(&mut self, alarm: Alarm, at: DateTime<Local>) -> AlarmId;

    /// Returns `false` if the alarm has already fired or has been cancelled.
    fn cancel(&mut self, id: AlarmId) -> bool;
}

/// In-memory scheduler which fires the alarms while replaying recorded input.
#[derive(Default)]
pub struct ReplayScheduler {
    pending: BTreeMap<(DateTime<Local>, AlarmId), Alarm>,
    next_id: u64,
}

impl ReplayScheduler {
    /// Take the earliest alarm due at or before `until`.
    pub fn pop_due(&mut self, until: DateTime<Local>) -> Option<(DateTime<Local>, Alarm)> {
        let entry = self.pending.first_entry()?;
        if entry.key().0 > until {
            return None;
        }
        let ((at, _), alarm) = entry.remove_entry();
        Some((at, alarm))
    }

    #[must_use]
    pub fn n_pending(&self) -> usize {
        self.pending.len()
    }
}

impl Scheduler for ReplayScheduler {
    fn schedule(&mut self, alarm: Alarm, at: DateTime<Local>) -> AlarmId {
        let id = AlarmId(self.next_id);
        self.next_id += 1;
        debug!(?alarm, ?at, ?id, "scheduled");
        self.pending.insert((at, id), alarm);
        id
    }

    fn cancel(&mut self, id: AlarmId) -> bool {
        let n_pending = self.pending.len();
        self.pending.retain(|(_, alarm_id), _| *alarm_id != id);
        self.pending.len() != n_pending
    }
}
