use chrono::{DateTime, Datelike, TimeZone, Timelike};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{prelude::*, quantity::energy::KilowattHours};

/// Peak hours are tracked within one calendar month.
pub const N_PEAK_HOURS: usize = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn of<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        Self { year: instant.year(), month: instant.month() }
    }
}

/// Energy used in one clock hour of a day.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakHour {
    /// Day of month.
    pub day: u32,

    /// Hour of day.
    pub hour: u32,

    pub energy: KilowattHours,
}

impl PeakHour {
    pub fn new<Tz: TimeZone>(at: &DateTime<Tz>, energy: KilowattHours) -> Self {
        Self { day: at.day(), hour: at.hour(), energy: energy.max(KilowattHours::ZERO) }
    }
}

/// Outcome of [`PeakHours::observe`].
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Unchanged,

    /// The entry of the same day got a higher energy.
    Raised,

    Appended,

    /// The lowest entry has been pushed out.
    Replaced,
}

impl Change {
    pub const fn is_changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Top hours of the month, at most one per day.
#[derive(Clone, Debug, Default)]
pub struct PeakHours {
    month: Option<Month>,
    entries: Vec<PeakHour>,
}

impl PeakHours {
    #[must_use]
    pub fn entries(&self) -> &[PeakHour] {
        &self.entries
    }

    /// Average energy over the present entries.
    #[must_use]
    pub fn average(&self) -> Option<KilowattHours> {
        if self.entries.is_empty() {
            None
        } else {
            #[expect(clippy::cast_precision_loss)]
            let n_entries = self.entries.len() as f64;
            Some(self.entries.iter().map(|entry| entry.energy).sum::<KilowattHours>() / n_entries)
        }
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            info!(n_entries = self.entries.len(), "clearing the peak hours");
        }
        self.entries.clear();
    }

    /// Switch to the month, clearing the entries of a previous one.
    ///
    /// Returns `true` when existing entries have been dropped.
    pub fn roll_over(&mut self, month: Month) -> bool {
        if self.month.replace(month) == Some(month) || self.entries.is_empty() {
            return false;
        }
        info!(?month, "new month");
        self.clear();
        true
    }

    /// Account the energy used in the hour of `at`.
    pub fn observe<Tz: TimeZone>(&mut self, at: &DateTime<Tz>, energy: KilowattHours) -> Change {
        let candidate = PeakHour::new(at, energy);

        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.day == candidate.day) {
            if candidate.energy > entry.energy {
                *entry = candidate;
                return Change::Raised;
            }
            return Change::Unchanged;
        }

        if self.entries.len() < N_PEAK_HOURS {
            debug!(?candidate, "new peak hour");
            self.entries.push(candidate);
            return Change::Appended;
        }

        let Some(lowest) = self.entries.iter_mut().min_by_key(|entry| entry.energy) else {
            return Change::Unchanged;
        };
        if candidate.energy > lowest.energy {
            debug!(?candidate, replaced = ?*lowest, "peak hour replaced");
            *lowest = candidate;
            Change::Replaced
        } else {
            Change::Unchanged
        }
    }

    /// Replace the state with previously saved entries.
    pub fn restore(&mut self, month: Month, entries: Vec<PeakHour>) -> Result {
        ensure!(entries.len() <= N_PEAK_HOURS, "too many peak hours: {}", entries.len());
        ensure!(entries.iter().map(|entry| entry.day).all_unique(), "duplicate day in peak hours");
        for entry in &entries {
            ensure!(
                entry.energy.0.is_finite() && entry.energy >= KilowattHours::ZERO,
                "invalid peak hour energy: {:?}",
                entry.energy,
            );
            ensure!(entry.hour < 24, "invalid hour: {}", entry.hour);
            ensure!((1..=31).contains(&entry.day), "invalid day: {}", entry.day);
        }
        self.month = Some(month);
        self.entries = entries;
        Ok(())
    }
}
