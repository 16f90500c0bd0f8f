use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::config::{PriceBand, PriceModelConfig};
use crate::domain::PricePoint;

pub const MIN_FORECAST_HOURS: u32 = 12;
pub const MAX_FORECAST_HOURS: u32 = 36;

/// Confidence never drops below this for far-out hours
const MIN_CONFIDENCE: f64 = 0.2;
/// e-folding horizon of forecast confidence, in hours
const CONFIDENCE_DECAY_HOURS: f64 = 48.0;
/// Horizon over which the uncertainty sigmoid ramps up, in hours
const UNCERTAINTY_RAMP_HOURS: f64 = 24.0;

#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    #[error("base price must be positive, got {0}")]
    InvalidBasePrice(f64),
    #[error("price floor must be non-negative, got {0}")]
    InvalidPriceFloor(f64),
    #[error("{name} band must satisfy low <= high, got [{low}, {high}]")]
    InvalidBand {
        name: &'static str,
        low: f64,
        high: f64,
    },
    #[error("hour of day must be 0-23, got {0}")]
    InvalidHour(u32),
    #[error("uncertainty bounds must be finite with min > 0, got min={min} max={max}")]
    InvalidUncertainty { min: f64, max: f64 },
}

pub trait PriceForecaster: Send {
    /// Hourly prices starting at the current hour
    fn get_day_ahead_prices(&mut self, forecast_hours: u32) -> Vec<PricePoint>;

    /// Whether tomorrow's day-ahead prices have been published yet
    fn is_prices_available_for_tomorrow(&self) -> bool;

    /// Confidence in the forecast price for the hour starting at `at`
    fn get_price_forecast_confidence(&self, at: DateTime<FixedOffset>) -> f64;
}

/// Day-ahead price stand-in built from a time-of-day/week pattern
///
/// Every call draws fresh randomness; nothing is cached. Noise grows with
/// distance from now through a sigmoid, so the first hours stay close to
/// the deterministic pattern.
pub struct SyntheticPriceForecaster<R = StdRng> {
    config: PriceModelConfig,
    clock: Arc<dyn Clock>,
    rng: R,
}

impl SyntheticPriceForecaster<StdRng> {
    /// Seeds from `config.random_seed` when set, otherwise from entropy
    pub fn new(config: PriceModelConfig, clock: Arc<dyn Clock>) -> Result<Self, ForecastError> {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, clock, rng)
    }
}

impl<R: Rng> SyntheticPriceForecaster<R> {
    pub fn with_rng(
        config: PriceModelConfig,
        clock: Arc<dyn Clock>,
        rng: R,
    ) -> Result<Self, ForecastError> {
        config.validate()?;
        Ok(Self { config, clock, rng })
    }

    pub fn config(&self) -> &PriceModelConfig {
        &self.config
    }

    /// Tomorrow's prices are published at `publication_hour` local time
    pub fn is_prices_available_for_tomorrow(&self) -> bool {
        self.clock.now().hour() >= self.config.publication_hour
    }

    /// 1.0 for published hours, otherwise exponential decay floored at 0.2
    pub fn get_price_forecast_confidence(&self, at: DateTime<FixedOffset>) -> f64 {
        let hours_ahead = hours_between(self.clock.now(), at);
        if hours_ahead <= 24.0 && self.is_prices_available_for_tomorrow() {
            return 1.0;
        }
        (-hours_ahead / CONFIDENCE_DECAY_HOURS).exp().max(MIN_CONFIDENCE)
    }

    pub fn get_day_ahead_prices(&mut self, forecast_hours: u32) -> Vec<PricePoint> {
        let forecast_hours = forecast_hours.clamp(MIN_FORECAST_HOURS, MAX_FORECAST_HOURS);
        let now = self.clock.now();
        let start = truncate_to_hour(now);

        let points: Vec<PricePoint> = (0..i64::from(forecast_hours))
            .map(|h| {
                let time_start = start + Duration::hours(h);
                PricePoint {
                    time_start,
                    time_end: time_start + Duration::hours(1),
                    price_eur_per_kwh: self.price_at(time_start, now),
                }
            })
            .collect();

        debug!(
            hours = points.len(),
            start = %start,
            "generated synthetic day-ahead prices"
        );
        points
    }

    fn price_at(&mut self, ts: DateTime<FixedOffset>, now: DateTime<FixedOffset>) -> f64 {
        let cfg = &self.config;
        let hour = ts.hour();

        let weekly_factor = if ts.weekday().number_from_monday() <= 5 {
            1.0 + cfg.weekday_adjustment
        } else {
            1.0 - cfg.weekday_adjustment
        };
        let daily_factor = (2.0 * PI * f64::from(hour) / 24.0).sin() * cfg.daily_amplitude;

        let band = if cfg.peak_hours.contains(&hour) {
            cfg.peak_band
        } else if cfg.shoulder_hours.contains(&hour) {
            cfg.shoulder_band
        } else {
            cfg.off_peak_band
        };
        let base_price = cfg.base_price_eur_per_kwh;
        let max_uncertainty = cfg.max_uncertainty;
        let min_uncertainty = cfg.min_uncertainty;
        let floor = cfg.min_price_eur_per_kwh;

        let bucket = sample_band(&mut self.rng, band);
        let price = base_price * weekly_factor * (1.0 + bucket + daily_factor);

        let hours_ahead = hours_between(now, ts);
        let ramp = 1.0 + (-hours_ahead / UNCERTAINTY_RAMP_HOURS).exp();
        let uncertainty = (max_uncertainty / ramp).max(min_uncertainty);
        let noise = Normal::new(0.0, uncertainty)
            .map(|normal| normal.sample(&mut self.rng))
            .unwrap_or(0.0);

        (price * (1.0 + noise)).max(floor)
    }
}

impl<R: Rng + Send> PriceForecaster for SyntheticPriceForecaster<R> {
    fn get_day_ahead_prices(&mut self, forecast_hours: u32) -> Vec<PricePoint> {
        SyntheticPriceForecaster::get_day_ahead_prices(self, forecast_hours)
    }

    fn is_prices_available_for_tomorrow(&self) -> bool {
        SyntheticPriceForecaster::is_prices_available_for_tomorrow(self)
    }

    fn get_price_forecast_confidence(&self, at: DateTime<FixedOffset>) -> f64 {
        SyntheticPriceForecaster::get_price_forecast_confidence(self, at)
    }
}

fn sample_band<R: Rng>(rng: &mut R, band: PriceBand) -> f64 {
    if band.low < band.high {
        rng.gen_range(band.low..=band.high)
    } else {
        band.low
    }
}

/// Non-negative hours from `from` to `to`
fn hours_between(from: DateTime<FixedOffset>, to: DateTime<FixedOffset>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
}

fn truncate_to_hour(ts: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    ts.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, mi, 0)
            .unwrap()
    }

    fn forecaster_at(now: DateTime<FixedOffset>, seed: u64) -> SyntheticPriceForecaster {
        let config = PriceModelConfig {
            random_seed: Some(seed),
            ..Default::default()
        };
        SyntheticPriceForecaster::new(config, Arc::new(ManualClock::new(now))).unwrap()
    }

    #[test]
    fn test_truncate_to_hour() {
        let ts = at(2024, 6, 12, 14, 37) + Duration::seconds(12);
        assert_eq!(truncate_to_hour(ts), at(2024, 6, 12, 14, 0));
    }

    #[test]
    fn test_hours_between_never_negative() {
        assert_eq!(hours_between(at(2024, 6, 12, 14, 0), at(2024, 6, 12, 13, 0)), 0.0);
        assert_eq!(hours_between(at(2024, 6, 12, 14, 0), at(2024, 6, 12, 15, 30)), 1.5);
    }

    #[test]
    fn test_degenerate_band_returns_low() {
        let mut rng = StdRng::seed_from_u64(1);
        let band = PriceBand { low: 0.2, high: 0.2 };
        assert_eq!(sample_band(&mut rng, band), 0.2);
    }

    #[test]
    fn test_band_samples_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let band = PriceBand { low: -0.3, high: 0.0 };
        for _ in 0..1000 {
            let v = sample_band(&mut rng, band);
            assert!((-0.3..=0.0).contains(&v));
        }
    }

    #[test]
    fn test_noise_free_model_follows_pattern() {
        // Zero-width bands and a tiny sigma make the price nearly deterministic
        let config = PriceModelConfig {
            peak_band: PriceBand { low: 0.4, high: 0.4 },
            shoulder_band: PriceBand { low: 0.2, high: 0.2 },
            off_peak_band: PriceBand { low: -0.1, high: -0.1 },
            max_uncertainty: 0.0,
            min_uncertainty: 1e-12,
            random_seed: Some(9),
            ..Default::default()
        };
        // Wednesday 07:00
        let now = at(2024, 6, 12, 7, 0);
        let mut forecaster =
            SyntheticPriceForecaster::new(config, Arc::new(ManualClock::new(now))).unwrap();
        let prices = forecaster.get_day_ahead_prices(12);

        let daily = |h: f64| (2.0 * PI * h / 24.0).sin() * 0.1;
        let expected_peak = 0.22 * 1.05 * (1.0 + 0.4 + daily(7.0));
        let expected_shoulder = 0.22 * 1.05 * (1.0 + 0.2 + daily(12.0));
        assert!((prices[0].price_eur_per_kwh - expected_peak).abs() < 1e-6);
        assert!((prices[5].price_eur_per_kwh - expected_shoulder).abs() < 1e-6);
    }

    #[test]
    fn test_weekend_prices_are_discounted() {
        let config = PriceModelConfig {
            off_peak_band: PriceBand { low: 0.0, high: 0.0 },
            max_uncertainty: 0.0,
            min_uncertainty: 1e-12,
            random_seed: Some(11),
            ..Default::default()
        };
        // Friday 12:00 -> forecast runs into Saturday
        let now = at(2024, 6, 14, 12, 0);
        let mut forecaster =
            SyntheticPriceForecaster::new(config, Arc::new(ManualClock::new(now))).unwrap();
        let prices = forecaster.get_day_ahead_prices(24);

        // Friday 23:00 vs Saturday 03:00, both off-peak
        let friday = &prices[11];
        let saturday = &prices[15];
        assert_eq!(friday.time_start.hour(), 23);
        assert_eq!(saturday.time_start.hour(), 3);
        let daily = |h: f64| (2.0 * PI * h / 24.0).sin() * 0.1;
        assert!((friday.price_eur_per_kwh - 0.22 * 1.05 * (1.0 + daily(23.0))).abs() < 1e-6);
        assert!((saturday.price_eur_per_kwh - 0.22 * 0.95 * (1.0 + daily(3.0))).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PriceModelConfig {
            base_price_eur_per_kwh: -1.0,
            ..Default::default()
        };
        let clock = Arc::new(ManualClock::new(at(2024, 6, 12, 7, 0)));
        let err = SyntheticPriceForecaster::new(config, clock).err();
        assert_eq!(err, Some(ForecastError::InvalidBasePrice(-1.0)));
    }

    #[test]
    fn test_trait_object_dispatch() {
        let mut forecaster: Box<dyn PriceForecaster> =
            Box::new(forecaster_at(at(2024, 6, 12, 7, 30), 5));
        assert_eq!(forecaster.get_day_ahead_prices(24).len(), 24);
        assert!(!forecaster.is_prices_available_for_tomorrow());
        // Unpublished: decays from the first hour
        let confidence = forecaster.get_price_forecast_confidence(at(2024, 6, 12, 19, 30));
        assert!((confidence - (-12.0f64 / 48.0).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_trait_object_reports_publication() {
        let forecaster: Box<dyn PriceForecaster> =
            Box::new(forecaster_at(at(2024, 6, 12, 13, 0), 5));
        assert!(forecaster.is_prices_available_for_tomorrow());
        assert_eq!(forecaster.get_price_forecast_confidence(at(2024, 6, 13, 12, 0)), 1.0);
        let far = forecaster.get_price_forecast_confidence(at(2024, 6, 17, 13, 0));
        assert!((far - 0.2).abs() < 1e-9);
    }
}
