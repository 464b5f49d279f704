use std::{fmt::Debug, fs, path::Path, str::FromStr};

use serde::Deserialize;

use crate::{
    engine::{budget::Target, tariff::TariffTable},
    prelude::*,
    quantity::{energy::KilowattHours, power::Watts},
};

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Decimal places of the reported values.
    #[serde(default = "default_precision")]
    pub precision: u8,

    /// Fixed hourly energy target, overrides the tariff level threshold for the power budget.
    #[serde(default)]
    pub target_energy: Option<KilowattHours>,

    /// Main fuse limit, caps the power budget.
    #[serde(default)]
    pub max_power: Option<Watts>,

    #[serde(default = "default_currency")]
    pub currency: String,

    pub levels: TariffTable,
}

const fn default_precision() -> u8 {
    2
}

fn default_currency() -> String {
    "NOK".to_owned()
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(body: &str) -> Result<Self> {
        let config: Self = toml::from_str(body)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    #[instrument(name = "Reading the configuration…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let body = fs::read_to_string(&path)
            .with_context(|| format!("failed to read the configuration from {path:?}"))?;
        body.parse().with_context(|| format!("invalid configuration in {path:?}"))
    }

    pub fn target(&self) -> Target {
        Target::from(self.target_energy)
    }

    fn validate(&self) -> Result {
        ensure!(self.precision <= 6, "precision must be at most 6, got {}", self.precision);
        if let Some(target_energy) = self.target_energy {
            ensure!(
                target_energy.0.is_finite() && target_energy > KilowattHours::ZERO,
                "target energy must be positive, got {target_energy:?}",
            );
        }
        if let Some(max_power) = self.max_power {
            ensure!(
                max_power.0.is_finite() && max_power > Watts::ZERO,
                "maximum power must be positive, got {max_power:?}",
            );
        }
        Ok(())
    }
}
