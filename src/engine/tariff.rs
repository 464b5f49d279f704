use std::rc::Rc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    broadcast::Channel,
    engine::peak_hours::{N_PEAK_HOURS, PeakHour, PeakHours},
    prelude::*,
    quantity::{cost::Cost, energy::KilowattHours},
};

/// Capacity tariff price bracket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TariffLevel {
    pub name: String,

    /// The level applies while the peak hour average stays below the threshold.
    pub threshold: KilowattHours,

    pub price: Cost,
}

/// Tariff levels ordered by strictly ascending threshold.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "Vec<TariffLevel>")]
pub struct TariffTable(Vec<TariffLevel>);

impl TryFrom<Vec<TariffLevel>> for TariffTable {
    type Error = Error;

    fn try_from(levels: Vec<TariffLevel>) -> Result<Self> {
        Self::try_new(levels)
    }
}

impl TariffTable {
    pub fn try_new(levels: Vec<TariffLevel>) -> Result<Self> {
        ensure!(!levels.is_empty(), "at least one tariff level is required");
        if let Some(level) = levels.iter().find(|level| !level.threshold.0.is_finite()) {
            bail!("threshold of `{}` is not a finite number", level.name);
        }
        if let Some((lhs, rhs)) =
            levels.iter().tuple_windows().find(|(lhs, rhs)| lhs.threshold >= rhs.threshold)
        {
            bail!(
                "thresholds must be strictly ascending: `{}` ({}) is followed by `{}` ({})",
                lhs.name,
                lhs.threshold,
                rhs.name,
                rhs.threshold,
            );
        }
        Ok(Self(levels))
    }

    #[must_use]
    pub fn levels(&self) -> &[TariffLevel] {
        &self.0
    }

    /// Select the first level whose threshold is strictly above the average.
    ///
    /// An average equal to a threshold falls into the next level.
    #[must_use]
    pub fn classify(&self, average: KilowattHours) -> Option<&TariffLevel> {
        self.0.iter().find(|level| level.threshold > average)
    }
}

/// Classification result shared by every consumer of the peak hours.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdUpdate {
    pub level: TariffLevel,

    /// Copy of the peak hours the level has been selected for.
    pub peak_hours: Vec<PeakHour>,

    pub average: KilowattHours,
}

/// Publishes the tariff level of the peak hours onto the threshold channel.
pub struct Classifier {
    table: TariffTable,
    channel: Rc<Channel<ThresholdUpdate>>,
}

impl Classifier {
    pub const fn new(table: TariffTable, channel: Rc<Channel<ThresholdUpdate>>) -> Self {
        Self { table, channel }
    }

    /// Publish the level of the peak hours, or revert to unknown while the month has fewer
    /// than [`N_PEAK_HOURS`] of them.
    pub fn reclassify(&self, peak_hours: &PeakHours) {
        let n_entries = peak_hours.entries().len();
        let Some(average) = peak_hours.average().filter(|_| n_entries >= N_PEAK_HOURS) else {
            debug!(n_entries, "not enough peak hours for a level");
            self.clear();
            return;
        };
        let Some(level) = self.table.classify(average) else {
            error!(?average, "the peak hour average exceeds every tariff level, check the configuration");
            return;
        };
        let previous = self.channel.current();
        if previous.as_ref().is_none_or(|previous| previous.level != *level) {
            info!(name = level.name, threshold = ?level.threshold, ?average, "tariff level");
        }
        self.channel.publish(ThresholdUpdate {
            level: level.clone(),
            peak_hours: peak_hours.entries().to_vec(),
            average,
        });
    }

    /// Revert the level to unknown.
    pub fn clear(&self) {
        if self.channel.current().is_some() {
            info!("tariff level cleared");
        }
        self.channel.clear();
    }
}

#[cfg(test)]
pub mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    /// Five brackets with the thresholds of 2, 5, 10, 15 and 20 kWh.
    pub fn table() -> TariffTable {
        let levels = [(2.0, 83.0), (5.0, 147.0), (10.0, 252.0), (15.0, 371.0), (20.0, 490.0)]
            .into_iter()
            .map(|(threshold, price)| TariffLevel {
                name: format!("{threshold}-kWh"),
                threshold: KilowattHours(threshold),
                price: Cost(price),
            })
            .collect();
        TariffTable::try_new(levels).unwrap()
    }

    fn peak_hours(energies: &[f64]) -> PeakHours {
        let mut peak_hours = PeakHours::default();
        for (day, energy) in (1..).zip(energies) {
            let at = Utc.with_ymd_and_hms(2024, 1, day, 18, 0, 0).unwrap();
            let _ = peak_hours.observe(&at, KilowattHours(*energy));
        }
        peak_hours
    }

    #[test]
    fn test_average_equal_to_threshold_selects_the_next_level() {
        let level = table().classify(KilowattHours(10.0)).unwrap().clone();
        assert_eq!(level.threshold, KilowattHours(15.0));
        assert_eq!(level.price, Cost(371.0));
    }

    #[test]
    fn test_average_below_threshold() {
        let table = table();
        assert_eq!(table.classify(KilowattHours(9.85)).unwrap().threshold, KilowattHours(10.0));
        assert_eq!(table.classify(KilowattHours(0.0)).unwrap().threshold, KilowattHours(2.0));
    }

    #[test]
    fn test_average_above_every_threshold() {
        assert!(table().classify(KilowattHours(20.0)).is_none());
    }

    #[test]
    fn test_empty_table_is_rejected() {
        assert!(TariffTable::try_new(Vec::new()).is_err());
    }

    #[test]
    fn test_non_ascending_table_is_rejected() {
        let level = |threshold| TariffLevel {
            name: "level".to_owned(),
            threshold: KilowattHours(threshold),
            price: Cost(1.0),
        };
        assert!(TariffTable::try_new(vec![level(5.0), level(5.0)]).is_err());
        assert!(TariffTable::try_new(vec![level(5.0), level(2.0)]).is_err());
        assert!(TariffTable::try_new(vec![level(f64::NAN)]).is_err());
        assert!(TariffTable::try_new(vec![level(2.0), level(5.0)]).is_ok());
    }

    #[test]
    fn test_deserialize_table() -> Result {
        // language=json
        let body = r#"[
            {"name": "low", "threshold": 2.0, "price": 83.0},
            {"name": "high", "threshold": 5.0, "price": 147.0}
        ]"#;
        let table = serde_json::from_str::<TariffTable>(body)?;
        assert_eq!(table.levels().len(), 2);

        // language=json
        let body = r#"[{"name": "high", "threshold": 5.0, "price": 1.0}, {"name": "low", "threshold": 2.0, "price": 1.0}]"#;
        assert!(serde_json::from_str::<TariffTable>(body).is_err());
        Ok(())
    }

    #[test]
    fn test_reclassify_publishes_the_snapshot() {
        let channel = Rc::new(Channel::new("threshold"));
        let classifier = Classifier::new(table(), Rc::clone(&channel));
        let peak_hours = peak_hours(&[10.0, 10.0, 10.45]);
        classifier.reclassify(&peak_hours);

        let update = channel.current().unwrap();
        assert_eq!(update.level.threshold, KilowattHours(15.0));
        assert_eq!(update.peak_hours, peak_hours.entries());
        assert!((update.average.0 - 10.15).abs() < 1e-9);
    }

    #[test]
    fn test_miss_keeps_the_last_level() {
        let channel = Rc::new(Channel::new("threshold"));
        let classifier = Classifier::new(table(), Rc::clone(&channel));
        classifier.reclassify(&peak_hours(&[9.0, 9.0, 9.0]));
        classifier.reclassify(&peak_hours(&[25.0, 25.0, 25.0]));
        assert_eq!(channel.current().unwrap().level.threshold, KilowattHours(10.0));
    }

    #[test]
    fn test_empty_peak_hours_clear_the_level() {
        let channel = Rc::new(Channel::new("threshold"));
        let classifier = Classifier::new(table(), Rc::clone(&channel));
        classifier.reclassify(&peak_hours(&[3.0, 3.0, 3.0]));
        classifier.reclassify(&PeakHours::default());
        assert!(channel.current().is_none());
    }

    #[test]
    fn test_level_is_unknown_until_three_peak_hours() {
        let channel = Rc::new(Channel::new("threshold"));
        let classifier = Classifier::new(table(), Rc::clone(&channel));
        classifier.reclassify(&peak_hours(&[3.0]));
        assert!(channel.current().is_none());
        classifier.reclassify(&peak_hours(&[3.0, 4.0]));
        assert!(channel.current().is_none());
        classifier.reclassify(&peak_hours(&[3.0, 4.0, 8.0]));
        assert_eq!(channel.current().unwrap().level.threshold, KilowattHours(10.0));
    }
}
