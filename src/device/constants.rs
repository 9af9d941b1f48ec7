use std::time::Duration;
use uuid::Uuid;

/**
 * The UUID of the Bluetooth BLE service exposed by the lamp firmware.
 */
pub const LAMP_SERVICE: &str = "6b447bc4-70ac-4602-8a97-71bbcc14cde9";

/**
 * The UUID of the Bluetooth BLE remote GATT characteristic that accepts LED commands and
 * returns the LED status when read.
 */
pub const LED_CHARACTERISTIC: &str = "9017bf83-2249-4f30-ae68-8a06b992a5aa";

/**
 * The name the lamp firmware advertises itself with.
 */
pub const LAMP_DEVICE_NAME: &str = "ESP32-LED";

/**
 * How long (milliseconds) a scan runs when no explicit timeout is given.
 */
pub const DEFAULT_SCAN_TIMEOUT: u64 = 5000;

/**
 * How long (milliseconds) the scan screen scans for.
 */
pub const SCREEN_SCAN_TIMEOUT: u64 = 10000;

/**
 * Capacity of the broadcast channel carrying device events to the presentation layer.
 */
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

pub fn make_lamp_service_uuid() -> Uuid {
    Uuid::parse_str(LAMP_SERVICE).unwrap()
}

pub fn make_led_characteristic_uuid() -> Uuid {
    Uuid::parse_str(LED_CHARACTERISTIC).unwrap()
}

pub fn default_scan_timeout() -> Duration {
    Duration::from_millis(DEFAULT_SCAN_TIMEOUT)
}

/// Heuristic used by the scan screen to warn before connecting to something that is probably
/// not a lamp: any name mentioning "esp", in any case.
pub fn looks_like_lamp(name: &str) -> bool {
    name.to_ascii_lowercase().contains("esp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuids_parse() {
        assert_eq!(make_lamp_service_uuid().to_string(), LAMP_SERVICE);
        assert_eq!(make_led_characteristic_uuid().to_string(), LED_CHARACTERISTIC);
    }

    #[test]
    fn lamp_name_heuristic() {
        assert!(looks_like_lamp("ESP32-LED"));
        assert!(looks_like_lamp("esp32-led"));
        assert!(looks_like_lamp("ESP-Kitchen"));
        assert!(looks_like_lamp("my Esp32 lamp"));
        assert!(looks_like_lamp(LAMP_DEVICE_NAME));
        assert!(!looks_like_lamp("OtherDevice"));
        assert!(!looks_like_lamp(""));
    }
}
