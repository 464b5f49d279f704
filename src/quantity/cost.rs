use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Tariff level price in the configured currency.
#[derive(Copy, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize, derive_more::From)]
pub struct Cost(pub f64);

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Debug for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}¤", self.0)
    }
}
