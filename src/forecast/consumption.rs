//! Household consumption estimates derived from a yearly total
//!
//! The yearly figure is spread evenly over days, scaled by a monthly
//! seasonal factor, then shaped across the day with a weekday or weekend
//! multiplier table.

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeMap;

use crate::domain::ConsumptionInterval;

/// Relative standard deviation assumed for daily consumption
const DAILY_STD_DEV_FRACTION: f64 = 0.15;
/// Two-sided 95% z-score
const Z_95: f64 = 1.96;

#[derive(Debug, Clone)]
pub struct ConsumptionModel {
    yearly_consumption_kwh: f64,
    monthly_distribution: BTreeMap<u32, f64>,
}

impl ConsumptionModel {
    pub fn new(yearly_consumption_kwh: f64, monthly_distribution: BTreeMap<u32, f64>) -> Self {
        Self {
            yearly_consumption_kwh,
            monthly_distribution,
        }
    }

    pub fn yearly_consumption_kwh(&self) -> f64 {
        self.yearly_consumption_kwh
    }

    pub fn seasonal_factor(&self, month: u32) -> f64 {
        self.monthly_distribution.get(&month).copied().unwrap_or(1.0)
    }

    pub fn daily_for_date(&self, date: NaiveDate) -> f64 {
        self.yearly_consumption_kwh / 365.0 * self.seasonal_factor(date.month())
    }

    /// Expected consumption in kWh for `hour` (0-23) of `date`
    pub fn hourly(&self, hour: u32, date: NaiveDate) -> f64 {
        let base = self.daily_for_date(date) / 24.0;
        base * Self::hour_multiplier(hour, is_weekend(date))
    }

    fn hour_multiplier(hour: u32, weekend: bool) -> f64 {
        if weekend {
            match hour {
                9..=12 => 1.8,  // late morning
                13..=22 => 1.5, // afternoon and evening
                _ => 0.4,
            }
        } else {
            match hour {
                7..=9 => 2.0,   // morning peak
                17..=22 => 2.5, // evening peak
                0..=6 => 0.3,   // night
                _ => 0.8,       // at work
            }
        }
    }

    pub fn confidence_intervals(&self, date: NaiveDate) -> ConsumptionInterval {
        let mean = self.daily_for_date(date);
        let std_dev = mean * DAILY_STD_DEV_FRACTION;
        ConsumptionInterval {
            mean,
            lower_95: mean - Z_95 * std_dev,
            upper_95: mean + Z_95 * std_dev,
        }
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_monthly_distribution;
    use rstest::rstest;

    fn model() -> ConsumptionModel {
        ConsumptionModel::new(5475.0, default_monthly_distribution())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_unmapped_month_is_neutral() {
        let model = ConsumptionModel::new(3650.0, BTreeMap::from([(1, 1.4)]));
        assert_eq!(model.seasonal_factor(7), 1.0);
        assert_eq!(model.seasonal_factor(0), 1.0);
        assert_eq!(model.seasonal_factor(1), 1.4);
    }

    #[test]
    fn test_daily_consumption_is_seasonal() {
        // 5475 / 365 = 15 kWh/day before seasonal scaling
        let january = model().daily_for_date(date(2024, 1, 10));
        let july = model().daily_for_date(date(2024, 7, 10));
        assert!((january - 18.0).abs() < 1e-9);
        assert!((july - 10.5).abs() < 1e-9);
    }

    // 2024-06-12 is a Wednesday, 2024-06-15 a Saturday; June factor 0.7
    #[rstest]
    #[case(date(2024, 6, 12), 3, 0.3)]
    #[case(date(2024, 6, 12), 8, 2.0)]
    #[case(date(2024, 6, 12), 12, 0.8)]
    #[case(date(2024, 6, 12), 18, 2.5)]
    #[case(date(2024, 6, 12), 23, 0.8)]
    #[case(date(2024, 6, 15), 3, 0.4)]
    #[case(date(2024, 6, 15), 10, 1.8)]
    #[case(date(2024, 6, 15), 15, 1.5)]
    #[case(date(2024, 6, 15), 23, 0.4)]
    fn test_hourly_multipliers(#[case] day: NaiveDate, #[case] hour: u32, #[case] multiplier: f64) {
        let expected = 15.0 * 0.7 / 24.0 * multiplier;
        assert!((model().hourly(hour, day) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_interval_is_symmetric() {
        let ci = model().confidence_intervals(date(2024, 3, 1));
        assert!((ci.mean - 15.0).abs() < 1e-9);
        assert!((ci.upper_95 - ci.mean - 1.96 * 0.15 * 15.0).abs() < 1e-9);
        assert!((ci.mean - ci.lower_95 - (ci.upper_95 - ci.mean)).abs() < 1e-9);
    }
}
