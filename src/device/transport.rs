use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::device::types::{PeripheralId, TransportEvent};
use crate::error::TransportError;

/// A characteristic, qualified by the service that exposes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// The capabilities of a bluetooth stack that the connection manager relies on.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Start scanning. Every sighting and scan failure is delivered on the returned channel,
    /// which stays open until `stop_scan`.
    async fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<TransportEvent>, TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;

    /// Whether the link to `id` opened by `connect` is still up. Becomes false as soon as the
    /// peripheral drops the link or `disconnect` is called.
    fn is_linked(&self, id: &PeripheralId) -> bool;

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError>;

    /// Discover all services of a connected peripheral and list their characteristics.
    async fn discover(&self, id: &PeripheralId) -> Result<Vec<CharacteristicRef>, TransportError>;

    async fn read(&self, id: &PeripheralId, characteristic: &CharacteristicRef) -> Result<Vec<u8>, TransportError>;

    /// Write with response; resolves once the peripheral acknowledged the write.
    async fn write(&self, id: &PeripheralId, characteristic: &CharacteristicRef, value: &[u8]) -> Result<(), TransportError>;

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError>;
}
