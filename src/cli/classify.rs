use clap::Parser;

use crate::{
    cli::ConfigArgs,
    prelude::*,
    quantity::energy::KilowattHours,
    tables::build_levels_table,
};

#[derive(Parser)]
pub struct ClassifyArgs {
    #[clap(flatten)]
    pub config: ConfigArgs,

    /// Average energy of the peak hours, kWh.
    pub average: KilowattHours,
}

impl ClassifyArgs {
    pub fn run(&self) -> Result {
        let config = self.config.read()?;
        let level = config.levels.classify(self.average);
        println!("{}", build_levels_table(&config.levels, level, &config.currency));
        let level = level.with_context(|| {
            format!("the average of {} exceeds every tariff level", self.average)
        })?;
        info!(name = level.name, threshold = ?level.threshold, price = ?level.price, "selected");
        Ok(())
    }
}
