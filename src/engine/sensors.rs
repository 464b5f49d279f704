//! Read-only projection of the latest broadcast values.

use serde::Serialize;

use crate::{
    engine::{
        budget::Budget,
        integrator::EnergyUpdate,
        peak_hours::PeakHour,
        tariff::ThresholdUpdate,
    },
    quantity::{cost::Cost, energy::KilowattHours, power::Watts},
};

/// Latest values of both channels.
#[derive(Default)]
pub struct Sensors {
    energy: Option<EnergyUpdate>,
    threshold: Option<ThresholdUpdate>,
}

impl Sensors {
    pub fn on_energy(&mut self, update: Option<&EnergyUpdate>) {
        self.energy = update.copied();
    }

    pub fn on_threshold(&mut self, update: Option<&ThresholdUpdate>) {
        self.threshold = update.cloned();
    }

    pub fn readout(&self, budget: Option<Budget>, precision: u8) -> Readout {
        let energy = self.energy.as_ref();
        let threshold = self.threshold.as_ref();
        Readout {
            energy_used_this_hour: energy.map(|update| update.energy.round_to(precision)),
            estimated_energy_this_hour: energy
                .map(|update| update.estimate_end_of_hour().round_to(precision)),
            power: energy.map(|update| update.power),
            average_peak_hour_energy: threshold.map(|update| update.average.round_to(precision)),
            peak_hours: threshold.map_or_else(Vec::new, |update| {
                update
                    .peak_hours
                    .iter()
                    .map(|peak_hour| PeakHour { energy: peak_hour.energy.round_to(precision), ..*peak_hour })
                    .collect()
            }),
            level_name: threshold.map(|update| update.level.name.clone()),
            level_threshold: threshold.map(|update| update.level.threshold),
            level_price: threshold.map(|update| update.level.price),
            available_power: budget.map(|budget| budget.power.round_to(precision)),
            budget_threshold: budget.map(|budget| budget.threshold),
        }
    }
}

/// Sensor values for the presentation layer, [`None`] meaning unknown.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Readout {
    pub energy_used_this_hour: Option<KilowattHours>,

    /// Extrapolated with the latest power until the end of the hour.
    pub estimated_energy_this_hour: Option<KilowattHours>,

    /// Power of the latest integrated sample.
    pub power: Option<Watts>,

    pub average_peak_hour_energy: Option<KilowattHours>,
    pub peak_hours: Vec<PeakHour>,
    pub level_name: Option<String>,
    pub level_threshold: Option<KilowattHours>,
    pub level_price: Option<Cost>,

    /// Power which may be added for the rest of the hour.
    pub available_power: Option<Watts>,

    /// Threshold the available power has been computed against.
    pub budget_threshold: Option<KilowattHours>,
}
