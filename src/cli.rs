mod classify;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use self::{classify::ClassifyArgs, watch::WatchArgs};
use crate::{config::Config, prelude::*};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay meter readings and host events, and print the resulting sensor values.
    #[clap(name = "watch")]
    Watch(Box<WatchArgs>),

    /// Print the tariff levels and the one selected for the peak hour average.
    #[clap(name = "classify")]
    Classify(ClassifyArgs),
}

#[derive(Parser)]
pub struct ConfigArgs {
    /// TOML configuration with the tariff levels.
    #[clap(long = "config", env = "GRIDCAP_CONFIG", default_value = "gridcap.toml")]
    pub path: PathBuf,
}

impl ConfigArgs {
    pub fn read(&self) -> Result<Config> {
        Config::read_from(&self.path)
    }
}
