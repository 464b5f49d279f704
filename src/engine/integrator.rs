use chrono::{DateTime, Local, TimeDelta};

use crate::{
    clock::start_of_next_hour,
    meter::Reading,
    prelude::*,
    quantity::{energy::KilowattHours, power::Watts, time::Hours},
};

/// Readings further apart than this are treated as a disconnected sensor.
pub const MAX_GAP: TimeDelta = TimeDelta::hours(1);

/// Energy used in the current hour.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EnergyUpdate {
    /// Energy accumulated since the start of the hour, unrounded.
    pub energy: KilowattHours,

    /// Power of the sample whose interval has just been closed.
    pub power: Watts,

    /// Instant of that sample.
    pub at: DateTime<Local>,

    /// Instant of the event which produced the update.
    pub observed_at: DateTime<Local>,
}

impl EnergyUpdate {
    /// Extrapolate the energy to the end of the hour, assuming the power stays the same.
    pub fn estimate_end_of_hour(&self) -> KilowattHours {
        let remaining = Hours::from(start_of_next_hour(&self.observed_at) - self.observed_at);
        self.energy + self.power * remaining
    }
}

/// Converts successive power readings into the energy used within the clock hour.
#[must_use]
#[derive(Default)]
pub struct EnergyIntegrator {
    accumulated: Option<KilowattHours>,
    last_reading: Option<Reading>,

    /// Instant of the last actual reading, which stays put when the reading is carried over.
    sampled_at: Option<DateTime<Local>>,
}

impl EnergyIntegrator {
    pub const fn accumulated(&self) -> Option<KilowattHours> {
        self.accumulated
    }

    /// Seed the accumulator with a restored value.
    pub fn restore(&mut self, energy: KilowattHours) {
        self.accumulated = Some(energy.max(KilowattHours::ZERO));
    }

    /// Pair the reading with the previous one and integrate the interval between them.
    pub fn push(&mut self, reading: Reading) -> Option<EnergyUpdate> {
        if let Some(last_reading) = &self.last_reading
            && reading.at < last_reading.at
        {
            warn!(at = ?reading.at, last = ?last_reading.at, "reading is out of order, discarding");
            return None;
        }
        let is_fresh = self.is_fresh_at(reading.at);
        self.sampled_at = Some(reading.at);
        let previous = self.last_reading.replace(reading.clone())?;
        if !is_fresh {
            warn!(at = ?reading.at, "more than one hour since the last actual reading, discarding");
            return None;
        }
        self.integrate(&previous, &reading)
    }

    fn is_fresh_at(&self, at: DateTime<Local>) -> bool {
        self.sampled_at.is_none_or(|sampled_at| at - sampled_at <= MAX_GAP)
    }

    /// Integrate the power of `previous` over the interval until `current`.
    ///
    /// Returns [`None`] when the interval contributes nothing: either reading is unavailable,
    /// the previous unit is not recognized, or the interval is negative or longer than an hour.
    pub fn integrate(&mut self, previous: &Reading, current: &Reading) -> Option<EnergyUpdate> {
        if !previous.is_available() || !current.is_available() {
            debug!(previous = %previous.state, current = %current.state, "skipping unavailable reading");
            return None;
        }

        let gap = current.at - previous.at;
        if gap > MAX_GAP {
            warn!(?gap, since = ?previous.at, "more than one hour since the last reading, discarding");
            return None;
        }
        if gap < TimeDelta::zero() {
            warn!(?gap, since = ?previous.at, "reading is out of order, discarding");
            return None;
        }

        let Some(power) = previous.power() else {
            warn!(unit = %previous.unit, "unrecognized unit, the sample contributes nothing");
            return None;
        };

        // Only the import counts towards the tariff.
        let delta = power.max(Watts::ZERO) * Hours::from(gap);
        let energy = self.accumulated.unwrap_or(KilowattHours::ZERO) + delta;
        self.accumulated = Some(energy);
        trace!(?power, ?gap, ?delta, ?energy, "integrated");

        Some(EnergyUpdate { energy, power, at: previous.at, observed_at: current.at })
    }

    /// Close the hour at the boundary and start a new one.
    ///
    /// Returns the final update of the closing hour, if the open interval contributed,
    /// and the zero update of the new hour. A fresh last reading is re-anchored at the boundary,
    /// so that the first interval of the new hour is integrated from there. A stale one is kept
    /// as it is and carries no power into the new hour.
    pub fn reset_hour(
        &mut self,
        boundary: DateTime<Local>,
    ) -> (Option<EnergyUpdate>, EnergyUpdate) {
        let is_fresh = self.is_fresh_at(boundary);
        let closing = match self.last_reading.take() {
            Some(last_reading) if last_reading.at < boundary && is_fresh => {
                let anchor = last_reading.moved_to(boundary);
                let closing = self.integrate(&last_reading, &anchor);
                self.last_reading = Some(anchor);
                closing
            }
            last_reading => {
                self.last_reading = last_reading;
                None
            }
        };

        self.accumulated = Some(KilowattHours::ZERO);
        let power = self
            .last_reading
            .as_ref()
            .filter(|_| is_fresh)
            .and_then(Reading::power)
            .unwrap_or(Watts::ZERO);
        info!(at = ?boundary, ?power, "hourly reset");
        let opening =
            EnergyUpdate { energy: KilowattHours::ZERO, power, at: boundary, observed_at: boundary };
        (closing, opening)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    use super::*;
    use crate::meter::{MeterState, PowerUnit};

    fn reading(minute: u32, second: u32, watts: f64) -> Reading {
        Reading::builder()
            .at(Local.with_ymd_and_hms(2024, 1, 3, 10, minute, second).unwrap())
            .state(MeterState::Known(watts))
            .unit(PowerUnit::Watts)
            .build()
    }

    #[test]
    fn test_first_reading_emits_nothing() {
        let mut integrator = EnergyIntegrator::default();
        assert!(integrator.push(reading(0, 0, 1000.0)).is_none());
        assert_eq!(integrator.accumulated(), None);
    }

    #[test]
    fn test_integrates_previous_power() {
        let mut integrator = EnergyIntegrator::default();
        integrator.push(reading(0, 0, 3600.0));
        let update = integrator.push(reading(1, 0, 0.0)).unwrap();
        assert_abs_diff_eq!(update.energy.0, 0.06);
        assert_eq!(update.power, Watts(3600.0));
        assert_eq!(update.at, reading(0, 0, 0.0).at);
        assert_eq!(update.observed_at, reading(1, 0, 0.0).at);
    }

    #[test]
    fn test_sum_of_intervals() {
        let samples = [(0, 0, 1200.0), (0, 10, 800.0), (0, 40, 2500.0), (5, 0, 100.0), (30, 0, 0.0)];
        let mut integrator = EnergyIntegrator::default();
        for (minute, second, watts) in samples {
            integrator.push(reading(minute, second, watts));
        }
        let expected = (1200.0 * 10.0 + 800.0 * 30.0 + 2500.0 * 260.0 + 100.0 * 1500.0) / 3_600_000.0;
        assert_abs_diff_eq!(integrator.accumulated().unwrap().0, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_energy_is_monotonic_with_export() {
        let mut integrator = EnergyIntegrator::default();
        integrator.push(reading(0, 0, 1800.0));
        let first = integrator.push(reading(10, 0, -500.0)).unwrap();
        let second = integrator.push(reading(20, 0, 0.0)).unwrap();
        assert_abs_diff_eq!(first.energy.0, 0.3);
        assert_eq!(second.energy, first.energy);
        assert_eq!(second.power, Watts(-500.0));
    }

    #[test]
    fn test_unavailable_reading_is_skipped() {
        let mut integrator = EnergyIntegrator::default();
        integrator.push(reading(0, 0, 1000.0));
        let unavailable = Reading { state: MeterState::Unavailable, ..reading(1, 0, 0.0) };
        assert!(integrator.push(unavailable).is_none());
        assert!(integrator.push(reading(2, 0, 1000.0)).is_none());
        assert!(integrator.push(reading(3, 0, 1000.0)).is_some());
    }

    #[test]
    fn test_unrecognized_unit_contributes_nothing() {
        let mut integrator = EnergyIntegrator::default();
        integrator.push(reading(0, 0, 3600.0));
        integrator.push(reading(1, 0, 3600.0));
        let volt_amperes = Reading { unit: PowerUnit::Other("VA".to_owned()), ..reading(2, 0, 5000.0) };
        integrator.push(volt_amperes);
        let before = integrator.accumulated();
        assert!(integrator.push(reading(3, 0, 0.0)).is_none());
        assert_eq!(integrator.accumulated(), before);
    }

    #[test]
    fn test_out_of_order_reading_keeps_the_last_one() {
        let mut integrator = EnergyIntegrator::default();
        integrator.push(reading(10, 0, 3600.0));
        assert!(integrator.push(reading(5, 0, 0.0)).is_none());
        assert_eq!(integrator.last_reading.as_ref().map(|reading| reading.at), Some(reading(10, 0, 0.0).at));
        assert_abs_diff_eq!(integrator.push(reading(11, 0, 0.0)).unwrap().energy.0, 0.06);
    }

    #[test]
    fn test_stale_gap_is_discarded() {
        let mut integrator = EnergyIntegrator::default();
        let previous = reading(0, 0, 1000.0);
        let current = previous.moved_to(previous.at + TimeDelta::seconds(3601));
        assert!(integrator.integrate(&previous, &current).is_none());
        assert_eq!(integrator.accumulated(), None);
    }

    #[test]
    fn test_exactly_one_hour_is_accepted() {
        let mut integrator = EnergyIntegrator::default();
        let previous = reading(0, 0, 1000.0);
        let current = previous.moved_to(previous.at + MAX_GAP);
        let update = integrator.integrate(&previous, &current).unwrap();
        assert_abs_diff_eq!(update.energy.0, 1.0);
    }

    #[test]
    fn test_reset_hour_closes_the_open_interval() {
        let mut integrator = EnergyIntegrator::default();
        integrator.push(reading(59, 0, 3600.0));
        let boundary = Local.with_ymd_and_hms(2024, 1, 3, 11, 0, 0).unwrap();

        let (closing, opening) = integrator.reset_hour(boundary);
        let closing = closing.unwrap();
        assert_abs_diff_eq!(closing.energy.0, 0.06);
        assert_eq!(closing.at, reading(59, 0, 0.0).at);

        assert_eq!(opening.energy, KilowattHours::ZERO);
        assert_eq!(opening.power, Watts(3600.0));
        assert_eq!(opening.at, boundary);
        assert_eq!(integrator.accumulated(), Some(KilowattHours::ZERO));
        assert_eq!(integrator.last_reading.as_ref().map(|reading| reading.at), Some(boundary));

        let first = integrator.push(reading(59, 0, 0.0).moved_to(boundary + TimeDelta::seconds(30)));
        assert_abs_diff_eq!(first.unwrap().energy.0, 0.03);
    }

    #[test]
    fn test_silent_meter_is_not_carried_over() {
        let mut integrator = EnergyIntegrator::default();
        integrator.push(reading(5, 0, 5000.0));

        let (closing, _) = integrator.reset_hour(Local.with_ymd_and_hms(2024, 1, 3, 11, 0, 0).unwrap());
        assert!(closing.is_some());

        let (closing, opening) = integrator.reset_hour(Local.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap());
        assert!(closing.is_none());
        assert_eq!(opening.power, Watts::ZERO);
        assert_eq!(integrator.last_reading.as_ref().map(|reading| reading.at), Some(reading(5, 0, 0.0).at));

        let late = reading(0, 0, 0.0).moved_to(Local.with_ymd_and_hms(2024, 1, 3, 12, 30, 0).unwrap());
        assert!(integrator.push(late).is_none());
        assert_eq!(integrator.accumulated(), Some(KilowattHours::ZERO));
    }

    #[test]
    fn test_reset_hour_without_readings() {
        let mut integrator = EnergyIntegrator::default();
        let boundary = Local.with_ymd_and_hms(2024, 1, 3, 11, 0, 0).unwrap();
        let (closing, opening) = integrator.reset_hour(boundary);
        assert!(closing.is_none());
        assert_eq!(opening.power, Watts::ZERO);
        assert_eq!(integrator.accumulated(), Some(KilowattHours::ZERO));
    }

    #[test]
    fn test_estimate_end_of_hour() {
        let update = EnergyUpdate {
            energy: KilowattHours(1.0),
            power: Watts(6000.0),
            at: Local.with_ymd_and_hms(2024, 1, 3, 10, 29, 0).unwrap(),
            observed_at: Local.with_ymd_and_hms(2024, 1, 3, 10, 30, 0).unwrap(),
        };
        assert_abs_diff_eq!(update.estimate_end_of_hour().0, 4.0);
    }
}
