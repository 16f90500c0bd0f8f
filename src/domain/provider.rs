use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use strum::Display;

/// Live reading reported by a battery backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiveStatus {
    /// Fraction of capacity
    pub current_soc: f64,
    /// kW, positive while charging
    pub current_power: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CommandMode {
    Charge,
    Discharge,
}

/// Directional setpoint sent to a battery backend
///
/// Serializes as `{"mode": "charge", "charge_power": kW}` or
/// `{"mode": "discharge", "discharge_power": kW}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BatteryCommand {
    Charge { charge_power: f64 },
    Discharge { discharge_power: f64 },
}

impl BatteryCommand {
    pub fn charge(power_kw: f64) -> Self {
        Self::Charge { charge_power: power_kw }
    }

    pub fn discharge(power_kw: f64) -> Self {
        Self::Discharge { discharge_power: power_kw }
    }

    pub fn mode(&self) -> CommandMode {
        match self {
            Self::Charge { .. } => CommandMode::Charge,
            Self::Discharge { .. } => CommandMode::Discharge,
        }
    }

    pub fn power_kw(&self) -> f64 {
        match *self {
            Self::Charge { charge_power } => charge_power,
            Self::Discharge { discharge_power } => discharge_power,
        }
    }
}

/// Backend that can report live battery state and accept setpoints
///
/// `None` from [`get_battery_status`](Self::get_battery_status) means the
/// backend had nothing to report this time; callers keep their own state.
#[cfg_attr(test, mockall::automock)]
pub trait LiveStatusProvider: Send + Sync {
    fn get_battery_status(&self) -> Option<LiveStatus>;
    fn update_battery_settings(&self, command: &BatteryCommand) -> bool;
}

impl<T: LiveStatusProvider + ?Sized> LiveStatusProvider for Arc<T> {
    fn get_battery_status(&self) -> Option<LiveStatus> {
        (**self).get_battery_status()
    }

    fn update_battery_settings(&self, command: &BatteryCommand) -> bool {
        (**self).update_battery_settings(command)
    }
}

/// Provider with pre-programmed responses
///
/// Reports whatever status was last set and answers commands from a queue
/// of outcomes, falling back to `default_outcome` once the queue is empty.
/// Every command received is kept for inspection.
#[derive(Debug)]
pub struct ScriptedStatusProvider {
    status: Mutex<Option<LiveStatus>>,
    outcomes: Mutex<VecDeque<bool>>,
    default_outcome: bool,
    commands: Mutex<Vec<BatteryCommand>>,
}

impl ScriptedStatusProvider {
    pub fn new(status: Option<LiveStatus>) -> Self {
        Self {
            status: Mutex::new(status),
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome: true,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(status: Option<LiveStatus>) -> Self {
        Self {
            default_outcome: false,
            ..Self::new(status)
        }
    }

    pub fn set_status(&self, status: Option<LiveStatus>) {
        *self.status.lock() = status;
    }

    pub fn push_outcome(&self, accepted: bool) {
        self.outcomes.lock().push_back(accepted);
    }

    pub fn commands(&self) -> Vec<BatteryCommand> {
        self.commands.lock().clone()
    }
}

impl LiveStatusProvider for ScriptedStatusProvider {
    fn get_battery_status(&self) -> Option<LiveStatus> {
        *self.status.lock()
    }

    fn update_battery_settings(&self, command: &BatteryCommand) -> bool {
        self.commands.lock().push(*command);
        self.outcomes.lock().pop_front().unwrap_or(self.default_outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shape() {
        let json = serde_json::to_value(BatteryCommand::charge(2.5)).unwrap();
        assert_eq!(json, serde_json::json!({"mode": "charge", "charge_power": 2.5}));

        let json = serde_json::to_value(BatteryCommand::discharge(1.0)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"mode": "discharge", "discharge_power": 1.0})
        );
    }

    #[test]
    fn test_command_accessors() {
        let cmd = BatteryCommand::discharge(3.0);
        assert_eq!(cmd.mode(), CommandMode::Discharge);
        assert_eq!(cmd.mode().to_string(), "discharge");
        assert_eq!(cmd.power_kw(), 3.0);
    }

    #[test]
    fn test_scripted_provider_replays_outcomes_then_default() {
        let provider = ScriptedStatusProvider::new(None);
        provider.push_outcome(false);

        assert!(!provider.update_battery_settings(&BatteryCommand::charge(1.0)));
        assert!(provider.update_battery_settings(&BatteryCommand::charge(2.0)));
        assert_eq!(
            provider.commands(),
            vec![BatteryCommand::charge(1.0), BatteryCommand::charge(2.0)]
        );
    }

    #[test]
    fn test_shared_provider_sees_status_updates() {
        let provider = Arc::new(ScriptedStatusProvider::rejecting(None));
        let shared: Box<dyn LiveStatusProvider> = Box::new(provider.clone());

        assert!(shared.get_battery_status().is_none());
        provider.set_status(Some(LiveStatus {
            current_soc: 0.4,
            current_power: -1.2,
        }));
        assert_eq!(shared.get_battery_status().map(|s| s.current_soc), Some(0.4));
        assert!(!shared.update_battery_settings(&BatteryCommand::charge(1.0)));
    }
}
