use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The daily price tables known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Market {
    /// Mainland China A-shares (`daily`).
    Cn,
    /// US equities, unadjusted (`us_daily`).
    Us,
    /// US equities, adjusted for splits and dividends (`us_daily_adj`).
    UsAdjusted,
}

impl Market {
    /// Returns the table that holds this market's daily bars.
    pub fn daily_table(&self) -> &'static str {
        match self {
            Market::Cn => "daily",
            Market::Us => "us_daily",
            Market::UsAdjusted => "us_daily_adj",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Market::Cn => "cn",
            Market::Us => "us",
            Market::UsAdjusted => "us-adj",
        };
        f.write_str(name)
    }
}

impl FromStr for Market {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cn" => Ok(Market::Cn),
            "us" => Ok(Market::Us),
            "us-adj" | "us_adj" | "us-adjusted" => Ok(Market::UsAdjusted),
            other => Err(CoreError::InvalidInput(
                "market".to_string(),
                format!("unknown market '{other}', expected cn, us or us-adj"),
            )),
        }
    }
}
