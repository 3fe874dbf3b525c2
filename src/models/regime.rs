//! Coarse market regime used to select decision thresholds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Market condition of the benchmark index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketRegime {
    Bull,
    Bear,
    #[default]
    Sideways,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 3] = [MarketRegime::Bull, MarketRegime::Bear, MarketRegime::Sideways];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Bull => "bull",
            MarketRegime::Bear => "bear",
            MarketRegime::Sideways => "sideways",
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
