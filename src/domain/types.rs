use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Household usage shape recorded on the battery profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UsagePattern {
    #[default]
    Flat,
    MorningPeak,
    EveningPeak,
    DoublePeak,
}

/// One hourly price block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time_start: DateTime<FixedOffset>,
    pub time_end: DateTime<FixedOffset>,
    pub price_eur_per_kwh: f64,
}

/// 95% band around a daily consumption estimate (kWh)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionInterval {
    pub mean: f64,
    pub lower_95: f64,
    pub upper_95: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_usage_pattern_round_trips_through_strings() {
        assert_eq!(UsagePattern::DoublePeak.to_string(), "double_peak");
        assert_eq!(
            UsagePattern::from_str("Morning_Peak").unwrap(),
            UsagePattern::MorningPeak
        );
        assert!(UsagePattern::from_str("sideways").is_err());
    }
}
