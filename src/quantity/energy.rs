use std::ops::Div;

use crate::quantity::{power::Kilowatts, time::Hours};

quantity!(KilowattHours, via: f64, suffix: "kWh", precision: 3);

impl Div<Hours> for KilowattHours {
    type Output = Kilowatts;

    fn div(self, hours: Hours) -> Self::Output {
        Kilowatts(self.0 / hours.0)
    }
}

impl Div<f64> for KilowattHours {
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        Self(self.0 / rhs)
    }
}
