use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::{BatteryError, UsagePattern};
use crate::forecast::ForecastError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "HEMS__";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub battery: BatteryConfig,
    pub prices: PriceModelConfig,
}

/// Battery hardware limits plus the household consumption profile it serves
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub capacity_kwh: f64,
    pub min_soc: f64,
    pub max_soc: f64,
    pub charge_rate_kw: f64,
    pub profile_name: Option<String>,
    pub daily_consumption_kwh: f64,
    pub usage_pattern: UsagePattern,
    pub yearly_consumption_kwh: f64,
    /// Month (1-12) to seasonal multiplier. Unmapped months use 1.0.
    #[serde(deserialize_with = "deserialize_month_keys")]
    pub monthly_distribution: BTreeMap<u32, f64>,
    /// Per-kWh surcharge on top of the market price
    pub surcharge_rate: f64,
    pub min_daily_cycles: f64,
    pub max_daily_cycles: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 10.0,
            min_soc: 0.1,
            max_soc: 0.9,
            charge_rate_kw: 5.0,
            profile_name: None,
            daily_consumption_kwh: 15.0,
            usage_pattern: UsagePattern::Flat,
            yearly_consumption_kwh: 5475.0,
            monthly_distribution: default_monthly_distribution(),
            surcharge_rate: 0.050,
            min_daily_cycles: 0.5,
            max_daily_cycles: 1.5,
        }
    }
}

/// Northern-hemisphere household profile: winter heavy, summer light
pub fn default_monthly_distribution() -> BTreeMap<u32, f64> {
    BTreeMap::from([
        (1, 1.2),
        (2, 1.15),
        (3, 1.0),
        (4, 0.9),
        (5, 0.8),
        (6, 0.7),
        (7, 0.7),
        (8, 0.7),
        (9, 0.8),
        (10, 0.9),
        (11, 1.0),
        (12, 1.15),
    ])
}

/// TOML tables and env keys are always strings, so months arrive as `"1"`..`"12"`
fn deserialize_month_keys<'de, D>(deserializer: D) -> Result<BTreeMap<u32, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, f64>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, factor)| {
            key.trim()
                .parse::<u32>()
                .map(|month| (month, factor))
                .map_err(|_| {
                    de::Error::custom(format!("month key must be an integer 1-12, got {key:?}"))
                })
        })
        .collect()
}

impl BatteryConfig {
    pub fn validate(&self) -> Result<(), BatteryError> {
        if !self.capacity_kwh.is_finite() || self.capacity_kwh <= 0.0 {
            return Err(BatteryError::InvalidCapacity(self.capacity_kwh));
        }
        if !self.charge_rate_kw.is_finite() || self.charge_rate_kw <= 0.0 {
            return Err(BatteryError::InvalidChargeRate(self.charge_rate_kw));
        }
        let soc_ok = self.min_soc.is_finite()
            && self.max_soc.is_finite()
            && self.min_soc >= 0.0
            && self.min_soc < self.max_soc
            && self.max_soc <= 1.0;
        if !soc_ok {
            return Err(BatteryError::InvalidSocBounds {
                min: self.min_soc,
                max: self.max_soc,
            });
        }
        let cycles_ok = self.min_daily_cycles.is_finite()
            && self.max_daily_cycles.is_finite()
            && self.min_daily_cycles >= 0.0
            && self.min_daily_cycles <= self.max_daily_cycles;
        if !cycles_ok {
            return Err(BatteryError::InvalidCycleBounds {
                min: self.min_daily_cycles,
                max: self.max_daily_cycles,
            });
        }
        for value in [self.yearly_consumption_kwh, self.daily_consumption_kwh] {
            if !value.is_finite() || value < 0.0 {
                return Err(BatteryError::InvalidConsumption(value));
            }
        }
        if !self.surcharge_rate.is_finite() || self.surcharge_rate < 0.0 {
            return Err(BatteryError::InvalidSurcharge(self.surcharge_rate));
        }
        for (&month, &factor) in &self.monthly_distribution {
            if !(1..=12).contains(&month) {
                return Err(BatteryError::InvalidMonth(month));
            }
            if !factor.is_finite() || factor < 0.0 {
                return Err(BatteryError::InvalidSeasonalFactor { month, factor });
            }
        }
        Ok(())
    }
}

/// Price band as a uniform `[low, high]` surcharge on the base price
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PriceBand {
    pub low: f64,
    pub high: f64,
}

/// Constants of the synthetic day-ahead price model
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PriceModelConfig {
    pub base_price_eur_per_kwh: f64,
    pub min_price_eur_per_kwh: f64,
    pub peak_hours: Vec<u32>,
    pub shoulder_hours: Vec<u32>,
    pub peak_band: PriceBand,
    pub shoulder_band: PriceBand,
    pub off_peak_band: PriceBand,
    /// Added on weekdays, subtracted on weekends
    pub weekday_adjustment: f64,
    pub daily_amplitude: f64,
    /// Ceiling of the noise standard deviation for far-out hours
    pub max_uncertainty: f64,
    pub min_uncertainty: f64,
    /// Local hour at which tomorrow's prices are published
    pub publication_hour: u32,
    pub default_horizon_hours: u32,
    /// Fixed seed for reproducible forecasts; entropy when unset
    pub random_seed: Option<u64>,
}

impl Default for PriceModelConfig {
    fn default() -> Self {
        Self {
            base_price_eur_per_kwh: 0.22,
            min_price_eur_per_kwh: 0.05,
            peak_hours: vec![7, 8, 9, 17, 18, 19, 20],
            shoulder_hours: vec![10, 11, 12, 13, 14, 15, 16],
            peak_band: PriceBand { low: 0.3, high: 0.5 },
            shoulder_band: PriceBand { low: 0.1, high: 0.3 },
            off_peak_band: PriceBand { low: -0.3, high: 0.0 },
            weekday_adjustment: 0.05,
            daily_amplitude: 0.1,
            max_uncertainty: 0.2,
            min_uncertainty: 0.001,
            publication_hour: 13,
            default_horizon_hours: 24,
            random_seed: None,
        }
    }
}

impl PriceModelConfig {
    pub fn validate(&self) -> Result<(), ForecastError> {
        if !self.base_price_eur_per_kwh.is_finite() || self.base_price_eur_per_kwh <= 0.0 {
            return Err(ForecastError::InvalidBasePrice(self.base_price_eur_per_kwh));
        }
        if !self.min_price_eur_per_kwh.is_finite() || self.min_price_eur_per_kwh < 0.0 {
            return Err(ForecastError::InvalidPriceFloor(self.min_price_eur_per_kwh));
        }
        for (name, band) in [
            ("peak", self.peak_band),
            ("shoulder", self.shoulder_band),
            ("off_peak", self.off_peak_band),
        ] {
            if !band.low.is_finite() || !band.high.is_finite() || band.low > band.high {
                return Err(ForecastError::InvalidBand {
                    name,
                    low: band.low,
                    high: band.high,
                });
            }
        }
        if let Some(&hour) = self
            .peak_hours
            .iter()
            .chain(self.shoulder_hours.iter())
            .find(|&&h| h > 23)
        {
            return Err(ForecastError::InvalidHour(hour));
        }
        if self.publication_hour > 23 {
            return Err(ForecastError::InvalidHour(self.publication_hour));
        }
        let uncertainty_ok = self.min_uncertainty.is_finite()
            && self.max_uncertainty.is_finite()
            && self.min_uncertainty > 0.0
            && self.max_uncertainty >= 0.0;
        if !uncertainty_ok {
            return Err(ForecastError::InvalidUncertainty {
                min: self.min_uncertainty,
                max: self.max_uncertainty,
            });
        }
        Ok(())
    }
}

impl Config {
    /// Load `config/default.toml` (if present) overlaid with `HEMS__*` env vars
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let cfg: Self = figment
            .extract()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let cfg: Self = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .context("failed to parse configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.battery.validate().context("invalid [battery] section")?;
        self.prices.validate().context("invalid [prices] section")?;
        Ok(())
    }
}
