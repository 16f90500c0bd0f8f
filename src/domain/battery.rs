use chrono::{NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::BatteryConfig;
use crate::domain::provider::{BatteryCommand, LiveStatusProvider};
use crate::domain::{ConsumptionInterval, UsagePattern};
use crate::forecast::ConsumptionModel;

/// Initial state of charge for every new model
pub const INITIAL_SOC: f64 = 0.5;

/// SoC below which the simulated battery always charges
const LOW_SOC_THRESHOLD: f64 = 0.3;
/// SoC above which the simulated battery always discharges
const HIGH_SOC_THRESHOLD: f64 = 0.8;

/// Invalid battery profile
#[derive(Debug, Error, PartialEq)]
pub enum BatteryError {
    #[error("capacity must be a positive number of kWh, got {0}")]
    InvalidCapacity(f64),
    #[error("charge rate must be a positive number of kW, got {0}")]
    InvalidChargeRate(f64),
    #[error("SoC bounds must satisfy 0 <= min < max <= 1, got min={min} max={max}")]
    InvalidSocBounds { min: f64, max: f64 },
    #[error("daily cycle bounds must satisfy 0 <= min <= max, got min={min} max={max}")]
    InvalidCycleBounds { min: f64, max: f64 },
    #[error("consumption must be a non-negative number of kWh, got {0}")]
    InvalidConsumption(f64),
    #[error("surcharge rate must be non-negative, got {0}")]
    InvalidSurcharge(f64),
    #[error("monthly distribution key must be 1-12, got {0}")]
    InvalidMonth(u32),
    #[error("seasonal factor for month {month} must be non-negative, got {factor}")]
    InvalidSeasonalFactor { month: u32, factor: f64 },
}

/// Where the model's readings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryMode {
    Live,
    Simulated,
}

/// Point-in-time view of the model for logging and reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatterySnapshot {
    pub mode: BatteryMode,
    pub soc: f64,
    pub energy_kwh: f64,
    pub available_capacity_kwh: f64,
    pub power_kw: f64,
    pub daily_cycles: f64,
    pub remaining_cycles: f64,
    pub last_cycle_reset: NaiveDate,
}

/// Home battery with a daily cycle budget
///
/// Without a [`LiveStatusProvider`] the model simulates its own state of
/// charge. With one, every read refreshes SoC and power from the provider
/// and every charge/discharge is forwarded to it as a [`BatteryCommand`].
///
/// SoC bounds are checked when an operation is requested, not continuously:
/// a provider may report values outside `[min_soc, max_soc]` and they are
/// taken as-is.
pub struct BatteryModel {
    capacity: f64,
    min_soc: f64,
    max_soc: f64,
    charge_rate: f64,
    current_soc: f64,
    current_power: f64,
    surcharge_rate: f64,
    min_daily_cycles: f64,
    max_daily_cycles: f64,
    daily_cycles: f64,
    last_cycle_reset: NaiveDate,
    profile_name: Option<String>,
    daily_consumption: f64,
    usage_pattern: UsagePattern,
    consumption: ConsumptionModel,
    provider: Option<Box<dyn LiveStatusProvider>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BatteryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatteryModel")
            .field("capacity", &self.capacity)
            .field("current_soc", &self.current_soc)
            .field("current_power", &self.current_power)
            .field("daily_cycles", &self.daily_cycles)
            .field("last_cycle_reset", &self.last_cycle_reset)
            .field("live", &self.provider.is_some())
            .finish_non_exhaustive()
    }
}

impl BatteryModel {
    pub fn new(
        config: BatteryConfig,
        clock: Arc<dyn Clock>,
        provider: Option<Box<dyn LiveStatusProvider>>,
    ) -> Result<Self, BatteryError> {
        config.validate()?;

        if provider.is_none() {
            info!(
                capacity_kwh = config.capacity_kwh,
                "no live battery provider configured, using simulated state"
            );
        }

        let last_cycle_reset = clock.today();
        Ok(Self {
            capacity: config.capacity_kwh,
            min_soc: config.min_soc,
            max_soc: config.max_soc,
            charge_rate: config.charge_rate_kw,
            current_soc: INITIAL_SOC,
            current_power: 0.0,
            surcharge_rate: round3(config.surcharge_rate),
            min_daily_cycles: config.min_daily_cycles,
            max_daily_cycles: config.max_daily_cycles,
            daily_cycles: 0.0,
            last_cycle_reset,
            profile_name: config.profile_name,
            daily_consumption: config.daily_consumption_kwh,
            usage_pattern: config.usage_pattern,
            consumption: ConsumptionModel::new(
                config.yearly_consumption_kwh,
                config.monthly_distribution,
            ),
            provider,
            clock,
        })
    }

    /// Simulated battery on the system clock
    pub fn simulated(config: BatteryConfig) -> Result<Self, BatteryError> {
        Self::new(config, Arc::new(SystemClock), None)
    }

    pub fn is_live(&self) -> bool {
        self.provider.is_some()
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn charge_rate(&self) -> f64 {
        self.charge_rate
    }

    pub fn soc_bounds(&self) -> (f64, f64) {
        (self.min_soc, self.max_soc)
    }

    /// Last known SoC without refreshing from the provider
    pub fn current_soc(&self) -> f64 {
        self.current_soc
    }

    /// Last commanded or reported power in kW, positive while charging
    pub fn last_power(&self) -> f64 {
        self.current_power
    }

    pub fn daily_cycles(&self) -> f64 {
        self.daily_cycles
    }

    pub fn last_cycle_reset(&self) -> NaiveDate {
        self.last_cycle_reset
    }

    pub fn surcharge_rate(&self) -> f64 {
        self.surcharge_rate
    }

    pub fn profile_name(&self) -> Option<&str> {
        self.profile_name.as_deref()
    }

    pub fn daily_consumption(&self) -> f64 {
        self.daily_consumption
    }

    pub fn usage_pattern(&self) -> UsagePattern {
        self.usage_pattern
    }

    fn refresh_from_provider(&mut self) {
        let Some(provider) = self.provider.as_deref() else {
            return;
        };
        if let Some(status) = provider.get_battery_status() {
            self.current_soc = status.current_soc;
            self.current_power = status.current_power;
        }
    }

    /// Headroom in kWh up to `max_soc`
    pub fn get_available_capacity(&mut self) -> f64 {
        self.refresh_from_provider();
        self.capacity * (self.max_soc - self.current_soc)
    }

    pub fn get_current_energy(&mut self) -> f64 {
        self.refresh_from_provider();
        self.capacity * self.current_soc
    }

    /// Current power flow in kW, positive while charging
    ///
    /// Uses the provider's live reading when it has one; otherwise estimates
    /// what the battery would be doing at this hour given its SoC.
    pub fn get_current_power(&mut self) -> f64 {
        if let Some(status) = self
            .provider
            .as_deref()
            .and_then(|provider| provider.get_battery_status())
        {
            return status.current_power;
        }

        let now = self.clock.now();
        let hour = now.hour();
        let consumption = self.get_hourly_consumption(hour, now.date_naive());

        if self.current_soc < LOW_SOC_THRESHOLD {
            self.charge_rate.min(self.get_available_capacity())
        } else if self.current_soc > HIGH_SOC_THRESHOLD {
            -self.charge_rate.min(consumption)
        } else {
            match hour {
                0..=5 => (self.charge_rate * 0.8).min(self.get_available_capacity()),
                10..=15 => -(self.charge_rate * 0.6).min(consumption),
                _ => -(self.charge_rate * 0.3).min(consumption),
            }
        }
    }

    pub fn can_charge(&mut self, amount: f64) -> bool {
        self.refresh_from_provider();
        self.current_soc + amount / self.capacity <= self.max_soc
    }

    pub fn can_discharge(&mut self, amount: f64) -> bool {
        self.refresh_from_provider();
        self.current_soc - amount / self.capacity >= self.min_soc
    }

    /// Charge `amount` kWh. Returns `false` with no state change when the
    /// SoC limit, the daily cycle budget or the provider refuses.
    ///
    /// `amount` must be non-negative. A negative charge is not rejected: it
    /// lowers SoC and is only checked against `max_soc`, so it can leave the
    /// pack below `min_soc`. Use [`Self::discharge`] to take energy out.
    pub fn charge(&mut self, amount: f64) -> bool {
        if !self.can_charge(amount) {
            debug!(amount, soc = self.current_soc, "charge rejected: above max SoC");
            return false;
        }
        if !self.can_complete_cycles(amount) {
            debug!(amount, daily_cycles = self.daily_cycles, "charge rejected: cycle budget");
            return false;
        }
        self.apply(BatteryCommand::charge(amount), amount)
    }

    /// Discharge `amount` kWh. Same failure semantics as [`Self::charge`],
    /// and `amount` must likewise be non-negative.
    pub fn discharge(&mut self, amount: f64) -> bool {
        if !self.can_discharge(amount) {
            debug!(amount, soc = self.current_soc, "discharge rejected: below min SoC");
            return false;
        }
        if !self.can_complete_cycles(-amount) {
            debug!(amount, daily_cycles = self.daily_cycles, "discharge rejected: cycle budget");
            return false;
        }
        self.apply(BatteryCommand::discharge(amount), -amount)
    }

    /// `signed_amount` is positive for charge, negative for discharge
    fn apply(&mut self, command: BatteryCommand, signed_amount: f64) -> bool {
        let accepted = self
            .provider
            .as_deref()
            .map(|provider| provider.update_battery_settings(&command));

        match accepted {
            Some(false) => {
                warn!(
                    mode = %command.mode(),
                    power_kw = command.power_kw(),
                    "provider rejected battery command"
                );
                false
            }
            Some(true) => {
                self.record_cycle_usage(signed_amount);
                self.refresh_from_provider();
                true
            }
            None => {
                self.current_soc += signed_amount / self.capacity;
                self.current_power = signed_amount;
                self.record_cycle_usage(signed_amount);
                true
            }
        }
    }

    /// Reset the daily cycle counter if `today` is past the last reset date.
    /// Returns whether a reset happened.
    pub fn advance_day_if_needed(&mut self, today: NaiveDate) -> bool {
        if today <= self.last_cycle_reset {
            return false;
        }
        debug!(
            from = %self.last_cycle_reset,
            to = %today,
            used_cycles = self.daily_cycles,
            "resetting daily cycle counter"
        );
        self.daily_cycles = 0.0;
        self.last_cycle_reset = today;
        true
    }

    fn reset_daily_cycles_if_needed(&mut self) {
        let today = self.clock.today();
        self.advance_day_if_needed(today);
    }

    pub fn record_cycle_usage(&mut self, amount: f64) {
        self.reset_daily_cycles_if_needed();
        self.daily_cycles += amount.abs() / self.capacity;
    }

    /// Whether adding `amount` kWh of throughput keeps today's cycle count
    /// within `[min_daily_cycles, max_daily_cycles]`.
    ///
    /// The lower bound applies per operation: with a non-zero minimum, a
    /// small first operation of the day is rejected for not using enough
    /// of the budget.
    pub fn can_complete_cycles(&mut self, amount: f64) -> bool {
        self.reset_daily_cycles_if_needed();
        let new_cycles = self.daily_cycles + amount.abs() / self.capacity;
        self.min_daily_cycles <= new_cycles && new_cycles <= self.max_daily_cycles
    }

    pub fn get_remaining_cycles(&mut self) -> f64 {
        self.reset_daily_cycles_if_needed();
        self.max_daily_cycles - self.daily_cycles
    }

    pub fn get_seasonal_factor(&self, month: u32) -> f64 {
        self.consumption.seasonal_factor(month)
    }

    pub fn get_daily_consumption_for_date(&self, date: NaiveDate) -> f64 {
        self.consumption.daily_for_date(date)
    }

    pub fn get_hourly_consumption(&self, hour: u32, date: NaiveDate) -> f64 {
        self.consumption.hourly(hour, date)
    }

    pub fn get_consumption_confidence_intervals(&self, date: NaiveDate) -> ConsumptionInterval {
        self.consumption.confidence_intervals(date)
    }

    pub fn daily_consumption_today(&self) -> f64 {
        self.get_daily_consumption_for_date(self.clock.today())
    }

    pub fn hourly_consumption_now(&self) -> f64 {
        let now = self.clock.now();
        self.get_hourly_consumption(now.hour(), now.date_naive())
    }

    pub fn consumption_confidence_today(&self) -> ConsumptionInterval {
        self.get_consumption_confidence_intervals(self.clock.today())
    }

    /// Market price plus surcharge, rounded to 3 decimals.
    /// `hour` is accepted for time-of-use surcharges but not used yet.
    pub fn get_effective_price(&self, base_price: f64, _hour: u32) -> f64 {
        round3(base_price + self.surcharge_rate)
    }

    pub fn snapshot(&mut self) -> BatterySnapshot {
        let energy_kwh = self.get_current_energy();
        let available_capacity_kwh = self.get_available_capacity();
        let power_kw = self.get_current_power();
        let remaining_cycles = self.get_remaining_cycles();
        BatterySnapshot {
            mode: if self.is_live() {
                BatteryMode::Live
            } else {
                BatteryMode::Simulated
            },
            soc: self.current_soc,
            energy_kwh,
            available_capacity_kwh,
            power_kw,
            daily_cycles: self.daily_cycles,
            remaining_cycles,
            last_cycle_reset: self.last_cycle_reset,
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
