use std::fmt::Display;

use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    engine::{
        peak_hours::PeakHour,
        sensors::Readout,
        tariff::{TariffLevel, TariffTable},
    },
    quantity::power::Watts,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

fn value_cell(value: Option<impl Display>) -> Cell {
    value.map_or_else(
        || Cell::new("unknown").add_attribute(Attribute::Dim),
        |value| Cell::new(value).set_alignment(CellAlignment::Right),
    )
}

/// Format the quantity with the given number of decimal places.
fn quantity_cell(value: Option<impl Display>, precision: u8) -> Cell {
    value_cell(value.map(|value| format!("{:.*}", usize::from(precision), value)))
}

pub fn build_readout_table(readout: &Readout, currency: &str, precision: u8) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Sensor", "Value"]);
    table.add_row(vec![Cell::new("Energy used this hour"), quantity_cell(readout.energy_used_this_hour, precision)]);
    table.add_row(vec![
        Cell::new("Estimated energy this hour"),
        quantity_cell(readout.estimated_energy_this_hour, precision),
    ]);
    table.add_row(vec![Cell::new("Power"), quantity_cell(readout.power, precision)]);
    table.add_row(vec![
        Cell::new("Average peak hour energy"),
        quantity_cell(readout.average_peak_hour_energy, precision),
    ]);
    table.add_row(vec![Cell::new("Level"), value_cell(readout.level_name.as_deref())]);
    table.add_row(vec![Cell::new("Level threshold"), quantity_cell(readout.level_threshold, precision)]);
    table.add_row(vec![
        Cell::new("Level price"),
        value_cell(readout.level_price.map(|price| format!("{price} {currency}"))),
    ]);
    table.add_row(vec![
        Cell::new("Available power"),
        quantity_cell(readout.available_power, precision).fg(match readout.available_power {
            Some(power) if power < Watts::ZERO => Color::Red,
            Some(_) => Color::Green,
            None => Color::Reset,
        }),
    ]);
    table
}

pub fn build_peak_hours_table(peak_hours: &[PeakHour], precision: u8) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Day", "Hour", "Energy"]);
    for peak_hour in peak_hours {
        table.add_row(vec![
            Cell::new(peak_hour.day).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:02}:00", peak_hour.hour)),
            Cell::new(format!("{:.*}", usize::from(precision), peak_hour.energy))
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn build_levels_table(
    levels: &TariffTable,
    selected: Option<&TariffLevel>,
    currency: &str,
) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Level", "Threshold", "Price"]);
    for level in levels.levels() {
        let is_selected = selected == Some(level);
        let cells = vec![
            Cell::new(&level.name),
            Cell::new(level.threshold).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} {currency}", level.price)).set_alignment(CellAlignment::Right),
        ];
        table.add_row(cells.into_iter().map(|cell| {
            if is_selected { cell.fg(Color::Green).add_attribute(Attribute::Bold) } else { cell }
        }));
    }
    table
}
