use std::fmt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier of a peripheral, as reported by the bluetooth stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralId(pub String);

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        PeripheralId(value.to_string())
    }
}

/// A peripheral seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralRef {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

impl PeripheralRef {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedState {
    On,
    Off,
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            LedState::On => "on",
            LedState::Off => "off",
        };

        write!(f, "{}", result)
    }
}

/// The command envelope written to the LED characteristic: `{"command":"on"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedCommand {
    pub command: LedState,
}

impl LedCommand {
    pub const ON: LedCommand = LedCommand { command: LedState::On };
    pub const OFF: LedCommand = LedCommand { command: LedState::Off };

    pub fn from_bool(on: bool) -> Self {
        if on { LedCommand::ON } else { LedCommand::OFF }
    }
}

/// Whatever the firmware returned when the LED characteristic was read. The shape is not
/// validated beyond being JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct LedStatus(pub Value);

impl LedStatus {
    /// The `isOn` field the lamp firmware reports, if present.
    pub fn is_on(&self) -> Option<bool> {
        self.0.get("isOn").and_then(Value::as_bool)
    }
}

/// Low level events emitted by a transport while it scans.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Discovered(PeripheralRef),
    ScanError(String),
}

/// Events published by the connection manager for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    ScanStarted,
    Discovered(PeripheralRef),
    ScanFinished(usize),
    ScanError(String),
    PermissionDenied,
    Connected(PeripheralId),
    Disconnected(PeripheralId),
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn peripheral_names() {
        let named = PeripheralRef { id: "a".into(), name: Some("ESP32-LED".to_string()), rssi: Some(-55) };
        let empty = PeripheralRef { id: "b".into(), name: Some(String::new()), rssi: None };
        let unnamed = PeripheralRef { id: "c".into(), name: None, rssi: None };

        assert!(named.has_name());
        assert!(!empty.has_name());
        assert!(!unnamed.has_name());
        assert_eq!(unnamed.display_name(), "Unknown");
    }

    #[test]
    fn status_is_on() {
        assert_eq!(LedStatus(json!({"isOn": true})).is_on(), Some(true));
        assert_eq!(LedStatus(json!({"isOn": false})).is_on(), Some(false));
        assert_eq!(LedStatus(json!({"brightness": 3})).is_on(), None);
        assert_eq!(LedStatus(json!([1, 2])).is_on(), None);
    }
}
