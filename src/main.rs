#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod broadcast;
mod cli;
mod clock;
mod config;
mod engine;
mod meter;
mod prelude;
mod quantity;
mod tables;

use clap::{Parser, crate_version};

use crate::{
    cli::{Args, Command},
    prelude::*,
};

fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().with_writer(std::io::stderr).init();
    info!(version = crate_version!(), "starting…");

    match Args::parse().command {
        Command::Watch(args) => args.run(),
        Command::Classify(args) => args.run(),
    }
}
