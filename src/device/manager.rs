use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::device::constants::{make_lamp_service_uuid, make_led_characteristic_uuid, EVENT_CHANNEL_CAPACITY};
use crate::device::permissions::PermissionProvider;
use crate::device::scanner::Scanner;
use crate::device::transport::{BleTransport, CharacteristicRef};
use crate::device::types::{DeviceEvent, PeripheralId, PeripheralRef};
use crate::error::TransportError;

/// Owns the bluetooth transport, the scanner and the single active connection to a lamp.
///
/// Construct one per application and share it (it is `Send + Sync`). All state changes are
/// published on the channel returned by `subscribe`.
pub struct ConnectionManager {
    pub(crate) transport: Arc<dyn BleTransport>,
    pub(crate) led: CharacteristicRef,
    scanner: Scanner,
    active: Mutex<Option<PeripheralId>>,
    device_events: broadcast::Sender<DeviceEvent>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn BleTransport>, permissions: Arc<dyn PermissionProvider>) -> Self {
        let (device_events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        ConnectionManager {
            scanner: Scanner::new(transport.clone(), permissions, device_events.clone()),
            transport,
            led: CharacteristicRef {
                service: make_lamp_service_uuid(),
                characteristic: make_led_characteristic_uuid(),
            },
            active: Mutex::new(None),
            device_events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.device_events.subscribe()
    }

    fn publish(&self, event: DeviceEvent) {
        let _ = self.device_events.send(event);
    }

    pub async fn scan(&self, timeout: Duration) -> Vec<PeripheralRef> {
        self.scanner.scan(timeout).await
    }

    pub fn cancel_scan(&self) {
        self.scanner.cancel();
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Lock the connection slot, after clearing it if the transport no longer holds a link to
    /// the active peripheral.
    fn connection_slot(&self) -> MutexGuard<Option<PeripheralId>> {
        let mut active = self.active.lock().expect("Failed to lock active connection");

        let lost = active.as_ref().map_or(false, |id| !self.transport.is_linked(id));
        if lost {
            if let Some(id) = active.take() {
                warn!("Connection to {} lost", id);
                self.publish(DeviceEvent::Disconnected(id));
            }
        }

        active
    }

    pub fn active_peripheral(&self) -> Option<PeripheralId> {
        self.connection_slot().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_slot().is_some()
    }

    async fn handshake(&self, id: &PeripheralId) -> Result<(), TransportError> {
        info!("Connecting to peripheral {}...", id);
        self.transport.connect(id).await?;

        info!("Connected; Discovering services...");
        let characteristics = match self.transport.discover(id).await {
            Ok(v) => v,
            Err(err) => {
                self.abandon_link(id).await;
                return Err(err);
            },
        };

        if !characteristics.contains(&self.led) {
            self.abandon_link(id).await;
            return Err(TransportError::MissingCharacteristic);
        }

        Ok(())
    }

    async fn abandon_link(&self, id: &PeripheralId) {
        if let Err(err) = self.transport.disconnect(id).await {
            debug!("Failed to close half-open link to {}: {:?}", id, err);
        }
    }

    /// Connect to a peripheral found by the last scan and make it the active connection.
    ///
    /// On failure the previous state, including a previously active connection, is left as it
    /// was. On success a previously active connection to another peripheral is closed.
    pub async fn connect(&self, id: &PeripheralId) -> bool {
        if let Err(err) = self.handshake(id).await {
            warn!("Connecting to peripheral {} failed: {:?}", id, err);
            return false;
        }

        let previous = self.connection_slot().replace(id.clone());

        if let Some(previous) = previous {
            if previous != *id {
                info!("Replacing connection to {}", previous);
                self.abandon_link(&previous).await;
                self.publish(DeviceEvent::Disconnected(previous));
            }
        }

        info!("Peripheral {} ready", id);
        self.publish(DeviceEvent::Connected(id.clone()));
        true
    }

    /// Close the active connection. Always leaves the manager disconnected and always succeeds,
    /// also when nothing was connected.
    pub async fn disconnect(&self) -> bool {
        let active = self.connection_slot().take();

        if let Some(id) = active {
            info!("Disconnecting from {}", id);
            if let Err(err) = self.transport.disconnect(&id).await {
                warn!("Error disconnecting: {:?}", err);
            }
            self.publish(DeviceEvent::Disconnected(id));
        }

        true
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("active", &self.active_peripheral())
            .field("scanning", &self.is_scanning())
            .finish()
    }
}
