use std::{fmt::Debug, fs, io::ErrorKind, path::Path};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::{
    engine::peak_hours::PeakHour,
    prelude::*,
    quantity::energy::KilowattHours,
};

/// State saved by the host between the runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub saved_at: DateTime<Local>,

    #[serde(default)]
    pub energy_used_this_hour: Option<KilowattHours>,

    #[serde(default)]
    pub peak_hours: Vec<PeakHour>,

    #[serde(default)]
    pub level_threshold: Option<KilowattHours>,
}

impl Snapshot {
    /// Read the snapshot, or [`None`] for a cold start.
    #[instrument(name = "Reading the snapshot…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Option<Self> {
        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                info!("no snapshot, starting cold");
                return None;
            }
            Err(error) => {
                warn!("failed to read the snapshot, starting cold: {error:#}");
                return None;
            }
        };
        match serde_json::from_str(&body) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                warn!("malformed snapshot, starting cold: {error:#}");
                None
            }
        }
    }

    #[instrument(skip(self), name = "Writing the snapshot…")]
    pub fn write_to<P: AsRef<Path> + Debug>(&self, path: P) -> Result {
        let body = serde_json::to_string_pretty(self).context("failed to serialize the snapshot")?;
        fs::write(&path, body).with_context(|| format!("failed to write the snapshot to {path:?}"))?;
        Ok(())
    }
}
