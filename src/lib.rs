//! Home battery state-of-charge model and a synthetic day-ahead price forecast
//!
//! [`domain::BatteryModel`] tracks SoC and a daily cycle budget, either on its
//! own or backed by a [`domain::LiveStatusProvider`].
//! [`forecast::SyntheticPriceForecaster`] produces hourly prices with
//! uncertainty that grows with forecast distance.

pub mod clock;
pub mod config;
pub mod domain;
pub mod forecast;
pub mod telemetry;
