use serde::{Deserialize, Serialize};

use crate::device::constants::{DEFAULT_SCAN_TIMEOUT, LAMP_DEVICE_NAME};
use crate::timer::TimerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// How long a scan started from the command line runs, in milliseconds.
    pub scan_timeout_ms: u64,
    /// Name of the lamp that was connected to most recently.
    pub preferred_device: String,
    pub timer: TimerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT,
            preferred_device: LAMP_DEVICE_NAME.to_string(),
            timer: TimerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"preferredDevice":"ESP32-Bedroom"}"#).unwrap();

        assert_eq!(config.preferred_device, "ESP32-Bedroom");
        assert_eq!(config.scan_timeout_ms, DEFAULT_SCAN_TIMEOUT);
        assert_eq!(config.timer, TimerConfig::default());
    }

    #[test]
    fn json_round_trip() {
        let mut config = Config::default();
        config.timer.enabled = true;

        let json = serde_json::to_string_pretty(&config).unwrap();
        assert_eq!(serde_json::from_str::<Config>(&json).unwrap(), config);
    }
}
