use log::{info, warn};

use crate::device::codec::{decode_status, encode_command};
use crate::device::manager::ConnectionManager;
use crate::device::types::{LedCommand, LedStatus, PeripheralId};

impl ConnectionManager {
    fn connected_peripheral(&self) -> Option<PeripheralId> {
        let id = self.active_peripheral();
        if id.is_none() {
            warn!("Not connected to any device");
        }
        id
    }

    /// Read the LED status from the active lamp. `None` when not connected, when the read fails
    /// or when the lamp answered with something that is not JSON.
    pub async fn read_status(&self) -> Option<LedStatus> {
        let id = self.connected_peripheral()?;

        let bytes = match self.transport.read(&id, &self.led).await {
            Ok(v) => v,
            Err(err) => {
                warn!("Error reading LED status: {:?}", err);
                return None;
            },
        };

        match decode_status(&bytes) {
            Ok(status) => Some(status),
            Err(err) => {
                warn!("Error decoding LED status: {}", err);
                None
            },
        }
    }

    /// Send an LED command and wait for the lamp to acknowledge it.
    pub async fn send_command(&self, command: LedCommand) -> bool {
        let Some(id) = self.connected_peripheral() else {
            return false;
        };

        let payload = match encode_command(&command) {
            Ok(v) => v,
            Err(err) => {
                warn!("Error encoding LED command: {}", err);
                return false;
            },
        };

        match self.transport.write(&id, &self.led, &payload).await {
            Ok(()) => {
                info!("LED turned {}", command.command);
                true
            },
            Err(err) => {
                warn!("Error turning LED {}: {:?}", command.command, err);
                false
            },
        }
    }

    pub async fn set_led(&self, on: bool) -> bool {
        self.send_command(LedCommand::from_bool(on)).await
    }

    pub async fn turn_on(&self) -> bool {
        self.send_command(LedCommand::ON).await
    }

    pub async fn turn_off(&self) -> bool {
        self.send_command(LedCommand::OFF).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use serde_json::json;
    use crate::device::constants::make_led_characteristic_uuid;
    use crate::device::fake::{FakePermissions, FakeTransport, TransportCall};
    use crate::device::permissions::PermissionModel;
    use super::*;

    async fn connected(transport: &Arc<FakeTransport>) -> ConnectionManager {
        transport.add_lamp("lamp", "ESP32-LED", -55);
        let manager = ConnectionManager::new(
            transport.clone(),
            Arc::new(FakePermissions::granted(PermissionModel::Modern)),
        );
        assert!(manager.connect(&"lamp".into()).await);
        manager
    }

    #[tokio::test]
    async fn no_transport_calls_without_connection() {
        let transport = Arc::new(FakeTransport::new());
        let manager = ConnectionManager::new(
            transport.clone(),
            Arc::new(FakePermissions::granted(PermissionModel::Modern)),
        );

        assert!(!manager.turn_on().await);
        assert!(!manager.turn_off().await);
        assert_eq!(manager.read_status().await, None);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn turn_on_writes_command() {
        let transport = Arc::new(FakeTransport::new());
        let manager = connected(&transport).await;

        assert!(manager.turn_on().await);

        let led = make_led_characteristic_uuid();
        assert_eq!(
            transport.calls().last(),
            Some(&TransportCall::Write("lamp".into(), led, br#"{"command":"on"}"#.to_vec())),
        );
        assert_eq!(manager.read_status().await.and_then(|s| s.is_on()), Some(true));

        assert!(manager.set_led(false).await);
        assert_eq!(manager.read_status().await.and_then(|s| s.is_on()), Some(false));
    }

    #[tokio::test]
    async fn failed_write_reports_false() {
        let transport = Arc::new(FakeTransport::new());
        let manager = connected(&transport).await;
        transport.fail_writes(true);

        assert!(!manager.turn_off().await);
        assert_eq!(transport.count_calls(|c| matches!(c, TransportCall::Write(..))), 1);
    }

    #[tokio::test]
    async fn read_status_returns_firmware_json() {
        let transport = Arc::new(FakeTransport::new());
        let manager = connected(&transport).await;
        transport.set_value("lamp", make_led_characteristic_uuid(), br#"{"isOn":true}"#);

        assert_eq!(manager.read_status().await, Some(LedStatus(json!({"isOn": true}))));
    }

    #[tokio::test]
    async fn malformed_status_is_none() {
        let transport = Arc::new(FakeTransport::new());
        let manager = connected(&transport).await;
        transport.set_value("lamp", make_led_characteristic_uuid(), b"isOn=1");

        assert_eq!(manager.read_status().await, None);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn lost_link_stops_commands() {
        let transport = Arc::new(FakeTransport::new());
        let manager = connected(&transport).await;
        transport.drop_link("lamp");

        assert!(!manager.turn_on().await);
        assert_eq!(transport.count_calls(TransportCall::is_characteristic_io), 0);
    }
}
