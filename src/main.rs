use anyhow::{Context, Result};
use chrono::Timelike;
use home_battery_sim::clock::{Clock, SystemClock};
use home_battery_sim::config::Config;
use home_battery_sim::domain::BatteryModel;
use home_battery_sim::forecast::{PriceForecaster, SyntheticPriceForecaster};
use home_battery_sim::telemetry::init_tracing;
use std::sync::Arc;
use tracing::info;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let mut battery = BatteryModel::new(cfg.battery.clone(), clock.clone(), None)
        .context("failed to build battery model")?;
    let mut forecaster: Box<dyn PriceForecaster> = Box::new(
        SyntheticPriceForecaster::new(cfg.prices.clone(), clock.clone())
            .context("failed to build price forecaster")?,
    );

    let snapshot = battery.snapshot();
    info!(report = %serde_json::to_string(&snapshot)?, "battery status");

    let consumption = battery.consumption_confidence_today();
    info!(
        mean_kwh = consumption.mean,
        lower_95_kwh = consumption.lower_95,
        upper_95_kwh = consumption.upper_95,
        "expected consumption today"
    );

    let tomorrow_published = forecaster.is_prices_available_for_tomorrow();
    for point in forecaster.get_day_ahead_prices(cfg.prices.default_horizon_hours) {
        let hour = point.time_start.hour();
        info!(
            time_start = %point.time_start,
            price = point.price_eur_per_kwh,
            effective_price = battery.get_effective_price(point.price_eur_per_kwh, hour),
            confidence = forecaster.get_price_forecast_confidence(point.time_start),
            tomorrow_published,
            "price forecast"
        );
    }

    Ok(())
}
