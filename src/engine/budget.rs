use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{
    clock::{seconds_between, start_of_next_hour},
    engine::{integrator::EnergyUpdate, tariff::ThresholdUpdate},
    prelude::*,
    quantity::{energy::KilowattHours, power::Watts},
};

/// Energy the hour must not exceed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Target {
    /// Configured target, the tariff level is ignored.
    Fixed(KilowattHours),

    /// Threshold of the current tariff level.
    Tariff,
}

impl From<Option<KilowattHours>> for Target {
    fn from(target_energy: Option<KilowattHours>) -> Self {
        target_energy.map_or(Self::Tariff, Self::Fixed)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Budget {
    /// Power that may still be added for the rest of the hour.
    pub power: Watts,

    /// Threshold the budget has been computed against.
    pub threshold: KilowattHours,
}

/// Power which can be added to the current consumption without exceeding the threshold
/// by the end of the hour.
#[must_use]
pub fn remaining_power(
    threshold: KilowattHours,
    energy: KilowattHours,
    power: Watts,
    seconds_left: f64,
    max_power: Option<Watts>,
) -> Watts {
    let seconds_left = seconds_left.max(1.0);
    let mut budget = Watts((threshold - energy).0 * 3_600_000.0 / seconds_left) - power;
    if let Some(max_power) = max_power {
        if budget > max_power {
            budget = max_power - power;
        }
        // Keeps the value range bounded.
        budget = budget.max(-max_power);
    }
    budget
}

/// Terminal consumer of the energy and the threshold updates.
#[derive(Debug)]
pub struct BudgetEstimator {
    target: Target,
    max_power: Option<Watts>,
    energy: Option<EnergyUpdate>,
    threshold: Option<KilowattHours>,
    budget: Option<Budget>,
}

impl BudgetEstimator {
    pub const fn new(target: Target, max_power: Option<Watts>) -> Self {
        let threshold = match target {
            Target::Fixed(target_energy) => Some(target_energy),
            Target::Tariff => None,
        };
        Self { target, max_power, energy: None, threshold, budget: None }
    }

    /// A fixed target makes the estimator independent of the tariff level.
    pub const fn follows_tariff(&self) -> bool {
        matches!(self.target, Target::Tariff)
    }

    pub const fn budget(&self) -> Option<Budget> {
        self.budget
    }

    pub const fn threshold(&self) -> Option<KilowattHours> {
        self.threshold
    }

    /// Seed the tariff threshold before the first classification.
    pub fn restore_threshold(&mut self, threshold: KilowattHours) {
        if self.follows_tariff() {
            self.threshold = Some(threshold);
            self.update();
        }
    }

    pub fn on_energy(&mut self, update: Option<&EnergyUpdate>) {
        self.energy = update.copied();
        self.update();
    }

    pub fn on_threshold(&mut self, update: Option<&ThresholdUpdate>) {
        if self.follows_tariff() {
            self.threshold = update.map(|update| update.level.threshold);
            self.update();
        }
    }

    fn update(&mut self) {
        self.budget = match (self.energy, self.threshold) {
            (Some(energy), Some(threshold)) => {
                Some(self.estimate(&energy, threshold, energy.observed_at))
            }
            _ => None,
        };
        trace!(budget = ?self.budget, "updated");
    }

    fn estimate(
        &self,
        energy: &EnergyUpdate,
        threshold: KilowattHours,
        now: DateTime<Local>,
    ) -> Budget {
        let seconds_left = seconds_between(&start_of_next_hour(&now), &now);
        let power = remaining_power(threshold, energy.energy, energy.power, seconds_left, self.max_power);
        Budget { power, threshold }
    }
}
