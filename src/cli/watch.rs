use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
};

use clap::Parser;

use crate::{
    cli::ConfigArgs,
    engine::{Engine, scheduler::ReplayScheduler, snapshot::Snapshot},
    meter::Input,
    prelude::*,
    tables::{build_peak_hours_table, build_readout_table},
};

#[derive(Parser)]
pub struct WatchArgs {
    #[clap(flatten)]
    pub config: ConfigArgs,

    /// JSON lines with the meter readings and host events, standard input by default.
    #[clap(long, env = "GRIDCAP_INPUT")]
    pub input: Option<PathBuf>,

    /// Restore the state from and save it to the file.
    #[clap(long, env = "GRIDCAP_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Print the sensor values as JSON.
    #[clap(long)]
    pub json: bool,
}

impl WatchArgs {
    pub fn run(&self) -> Result {
        let config = self.config.read()?;
        let inputs = self.read_inputs()?;
        info!(n_inputs = inputs.len(), "loaded the input");

        let Some(started_at) = inputs.first().map(Input::at) else {
            warn!("no input to replay");
            return Ok(());
        };
        let finished_at = inputs.last().map_or(started_at, Input::at);

        let mut engine = Engine::new(&config);
        let mut scheduler = ReplayScheduler::default();
        if let Some(path) = &self.snapshot
            && let Some(snapshot) = Snapshot::read_from(path)
        {
            engine.restore(snapshot, started_at);
        }
        engine.start(started_at, &mut scheduler);

        for input in inputs {
            engine.advance_to(input.at(), &mut scheduler);
            engine.on_input(input);
        }

        if let Some(path) = &self.snapshot {
            engine.snapshot(finished_at).write_to(path)?;
        }
        if let Some(update) = engine.hub().threshold.current() {
            info!(level = update.level.name, average = ?update.average, "replayed");
        }
        let readout = engine.readout();
        engine.shutdown(&mut scheduler);
        debug!(n_pending = scheduler.n_pending(), "alarms left");

        if self.json {
            println!("{}", serde_json::to_string_pretty(&readout)?);
        } else {
            println!("{}", build_readout_table(&readout, &config.currency, config.precision));
            println!("{}", build_peak_hours_table(&readout.peak_hours, config.precision));
        }
        Ok(())
    }

    fn read_inputs(&self) -> Result<Vec<Input>> {
        let reader: Box<dyn BufRead> = match &self.input {
            Some(path) => Box::new(BufReader::new(
                File::open(path).with_context(|| format!("failed to open {path:?}"))?,
            )),
            None => Box::new(BufReader::new(io::stdin())),
        };
        parse_inputs(reader)
    }
}

/// Parse the JSON lines, skipping the blank and malformed ones.
fn parse_inputs(reader: impl BufRead) -> Result<Vec<Input>> {
    let mut inputs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read the input")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Input>(&line) {
            Ok(input) => inputs.push(input),
            Err(error) => warn!(line = index + 1, "skipping a malformed line: {error:#}"),
        }
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inputs() -> Result {
        // language=json
        let body = r#"
            {"state": "1200", "unit_of_measurement": "W", "last_updated": "2024-01-03T10:00:00+00:00"}
            {"state": "on", "unit_of_measurement": "W", "last_updated": "2024-01-03T10:01:00+00:00"}

            {"event_type": "gridcap_reset_peak_hours", "time_fired": "2024-01-03T10:02:00+00:00"}
            {"state": "unavailable", "unit_of_measurement": "W", "last_updated": "2024-01-03T10:03:00+00:00"}
        "#;
        let inputs = parse_inputs(body.as_bytes())?;
        assert_eq!(inputs.len(), 3);
        assert!(matches!(inputs[0], Input::Reading(_)));
        assert!(matches!(inputs[1], Input::Event(_)));
        assert!(matches!(inputs[2], Input::Reading(_)));
        Ok(())
    }
}
