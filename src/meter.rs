use std::{
    convert::Infallible,
    fmt::{Display, Formatter},
    str::FromStr,
};

use bon::Builder;
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

use crate::{
    prelude::*,
    quantity::power::{Kilowatts, Watts},
};

/// Meter state as reported by the host.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MeterState {
    Known(f64),
    Unknown,
    Unavailable,
}

impl MeterState {
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl FromStr for MeterState {
    type Err = Error;

    fn from_str(state: &str) -> Result<Self> {
        match state {
            "unknown" => Ok(Self::Unknown),
            "unavailable" => Ok(Self::Unavailable),
            _ => {
                let value: f64 = state
                    .parse()
                    .with_context(|| format!("`{state}` is neither a number nor a known state"))?;
                if value.is_finite() {
                    Ok(Self::Known(value))
                } else {
                    warn!(state, "non-finite meter state, treating as unknown");
                    Ok(Self::Unknown)
                }
            }
        }
    }
}

impl Display for MeterState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(value) => write!(f, "{value}"),
            Self::Unknown => f.write_str("unknown"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// Declared unit of the meter state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PowerUnit {
    Watts,
    Kilowatts,
    Other(String),
}

impl FromStr for PowerUnit {
    type Err = Infallible;

    fn from_str(unit: &str) -> Result<Self, Self::Err> {
        Ok(match unit {
            "W" => Self::Watts,
            "kW" => Self::Kilowatts,
            _ => Self::Other(unit.to_owned()),
        })
    }
}

impl Display for PowerUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Watts => f.write_str("W"),
            Self::Kilowatts => f.write_str("kW"),
            Self::Other(unit) => f.write_str(unit),
        }
    }
}

/// Single power reading of the metering source.
#[must_use]
#[serde_as]
#[derive(Clone, Debug, Deserialize, Builder)]
pub struct Reading {
    #[serde(rename = "last_updated")]
    pub at: DateTime<Local>,

    #[serde_as(as = "DisplayFromStr")]
    pub state: MeterState,

    #[serde_as(as = "DisplayFromStr")]
    #[serde(rename = "unit_of_measurement")]
    pub unit: PowerUnit,
}

impl Reading {
    pub const fn is_available(&self) -> bool {
        self.state.is_available()
    }

    /// Power in watts, or [`None`] for an unavailable state or an unrecognized unit.
    #[must_use]
    pub fn power(&self) -> Option<Watts> {
        let MeterState::Known(value) = self.state else {
            return None;
        };
        match self.unit {
            PowerUnit::Watts => Some(Watts(value)),
            PowerUnit::Kilowatts => Some(Watts::from(Kilowatts(value))),
            PowerUnit::Other(_) => None,
        }
    }

    /// The same reading moved to another instant.
    pub fn moved_to(&self, at: DateTime<Local>) -> Self {
        Self { at, ..self.clone() }
    }
}

/// Events fired by the host besides the readings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
pub enum HostEventType {
    /// Request to forget the peak hours of the current month.
    #[serde(rename = "gridcap_reset_peak_hours")]
    ResetPeakHours,
}

#[derive(Copy, Clone, Debug, Deserialize)]
pub struct HostEvent {
    pub event_type: HostEventType,
    pub time_fired: DateTime<Local>,
}

/// Line of the replay input.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Input {
    Reading(Reading),
    Event(HostEvent),
}

impl Input {
    pub fn at(&self) -> DateTime<Local> {
        match self {
            Self::Reading(reading) => reading.at,
            Self::Event(event) => event.time_fired,
        }
    }
}
