use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::device::permissions::{Capability, PermissionModel, PermissionProvider};
use crate::device::transport::{BleTransport, CharacteristicRef};
use crate::device::types::{PeripheralId, PeripheralRef, TransportEvent};
use crate::error::TransportError;

type PeripheralMap = Arc<Mutex<HashMap<PeripheralId, Peripheral>>>;
type LinkSet = Arc<Mutex<HashSet<PeripheralId>>>;
type ScanSink = Arc<Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>>;

/// `BleTransport` on top of btleplug, using the first bluetooth adapter of the system.
pub struct BtleTransport {
    // kept alive for the lifetime of the adapter
    _manager: Manager,
    adapter: Adapter,
    peripherals: PeripheralMap,
    links: LinkSet,
    scan_sink: ScanSink,
    access_granted: AtomicBool,
    cancel: CancellationToken,
}

impl BtleTransport {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager.adapters().await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;

        info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

        let peripherals: PeripheralMap = Arc::new(Mutex::new(HashMap::new()));
        let links: LinkSet = Arc::new(Mutex::new(HashSet::new()));
        let scan_sink: ScanSink = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let central_events = adapter.events().await?;
        spawn(forward_central_events(
            cancel.clone(),
            adapter.clone(),
            central_events,
            peripherals.clone(),
            links.clone(),
            scan_sink.clone(),
        ));

        Ok(BtleTransport {
            _manager: manager,
            adapter,
            peripherals,
            links,
            scan_sink,
            access_granted: AtomicBool::new(false),
            cancel,
        })
    }

    fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral, TransportError> {
        let peripherals = self.peripherals.lock().expect("Failed to lock peripheral map");
        peripherals
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeripheral(id.to_string()))
    }

    fn links(&self) -> MutexGuard<HashSet<PeripheralId>> {
        self.links.lock().expect("Failed to lock link set")
    }

    fn set_scan_sink(&self, sink: Option<mpsc::UnboundedSender<TransportEvent>>) {
        *self.scan_sink.lock().expect("Failed to lock scan sink") = sink;
    }

    fn characteristic(peripheral: &Peripheral, characteristic: &CharacteristicRef) -> Result<Characteristic, TransportError> {
        peripheral.characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.characteristic && c.service_uuid == characteristic.service)
            .ok_or(TransportError::MissingCharacteristic)
    }

    // Starting a scan is the only reliable way to find out whether the OS lets us use bluetooth.
    // On macOS this is also what makes the OS show its permission dialog.
    async fn probe_access(&self) -> Result<bool, TransportError> {
        match self.adapter.start_scan(ScanFilter::default()).await {
            Ok(()) => {
                if let Err(err) = self.adapter.stop_scan().await {
                    debug!("Failed to stop probe scan: {:?}", err);
                }
                self.access_granted.store(true, Ordering::SeqCst);
                Ok(true)
            },
            Err(btleplug::Error::PermissionDenied) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for BtleTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn peripheral_ref(adapter: &Adapter, id: &btleplug::platform::PeripheralId) -> Option<(PeripheralRef, Peripheral)> {
    let peripheral = match adapter.peripheral(id).await {
        Ok(v) => v,
        Err(err) => {
            warn!("Failed to query BLE adapter for peripheral: {}", err);
            return None;
        },
    };

    match peripheral.properties().await {
        Err(err) => {
            warn!("Could not query peripheral for properties: {:?}", err);
            None
        },
        Ok(None) => {
            debug!("Peripheral has no properties");
            None
        },
        Ok(Some(properties)) => {
            let peripheral_ref = PeripheralRef {
                id: PeripheralId(peripheral.id().to_string()),
                name: properties.local_name,
                rssi: properties.rssi,
            };
            Some((peripheral_ref, peripheral))
        },
    }
}

async fn forward_central_events(
    cancel: CancellationToken,
    adapter: Adapter,
    mut central_events: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
    peripherals: PeripheralMap,
    links: LinkSet,
    scan_sink: ScanSink,
) {
    let publish = |event: TransportEvent| {
        if let Some(sink) = scan_sink.lock().expect("Failed to lock scan sink").as_ref() {
            // an error only means that the scan just ended
            let _ = sink.send(event);
        }
    };

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            event = central_events.next() => match event {
                None => {
                    warn!("Adapter event stream ended");
                    publish(TransportEvent::ScanError("bluetooth adapter stopped reporting events".to_string()));
                    break 'mainloop;
                },
                Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                    if let Some((peripheral_ref, peripheral)) = peripheral_ref(&adapter, &id).await {
                        peripherals
                            .lock()
                            .expect("Failed to lock peripheral map")
                            .insert(peripheral_ref.id.clone(), peripheral);

                        publish(TransportEvent::Discovered(peripheral_ref));
                    }
                },
                Some(CentralEvent::DeviceDisconnected(id)) => {
                    info!("Peripheral {} disconnected", id);
                    links
                        .lock()
                        .expect("Failed to lock link set")
                        .remove(&PeripheralId(id.to_string()));
                },
                Some(_) => {},
            },
        }
    }
}

#[async_trait]
impl BleTransport for BtleTransport {
    async fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<TransportEvent>, TransportError> {
        info!("Scanning using adapter {}...", self.adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));

        let (sink, events) = mpsc::unbounded_channel();
        self.set_scan_sink(Some(sink));

        if let Err(err) = self.adapter.start_scan(ScanFilter::default()).await {
            self.set_scan_sink(None);
            return Err(err.into());
        }

        Ok(events)
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.set_scan_sink(None);
        self.adapter.stop_scan().await?;
        Ok(())
    }

    fn is_linked(&self, id: &PeripheralId) -> bool {
        self.links().contains(id)
    }

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        let peripheral = self.peripheral(id)?;
        peripheral.connect().await?;
        self.links().insert(id.clone());
        Ok(())
    }

    async fn discover(&self, id: &PeripheralId) -> Result<Vec<CharacteristicRef>, TransportError> {
        let peripheral = self.peripheral(id)?;
        peripheral.discover_services().await?;

        let mut characteristics = Vec::new();
        for service in peripheral.services() {
            for characteristic in &service.characteristics {
                debug!("Discovered characteristic {:?} {:?}", service.uuid, characteristic.uuid);
                characteristics.push(CharacteristicRef {
                    service: service.uuid,
                    characteristic: characteristic.uuid,
                });
            }
        }

        Ok(characteristics)
    }

    async fn read(&self, id: &PeripheralId, characteristic: &CharacteristicRef) -> Result<Vec<u8>, TransportError> {
        let peripheral = self.peripheral(id)?;
        let characteristic = BtleTransport::characteristic(&peripheral, characteristic)?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn write(&self, id: &PeripheralId, characteristic: &CharacteristicRef, value: &[u8]) -> Result<(), TransportError> {
        let peripheral = self.peripheral(id)?;
        let characteristic = BtleTransport::characteristic(&peripheral, characteristic)?;
        peripheral.write(&characteristic, value, WriteType::WithResponse).await?;
        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        self.links().remove(id);
        let peripheral = self.peripheral(id)?;
        peripheral.disconnect().await?;
        Ok(())
    }
}

// Desktop systems have a single bluetooth grant that covers scanning and connecting, and do not
// tie bluetooth to location access.
#[async_trait]
impl PermissionProvider for BtleTransport {
    fn model(&self) -> PermissionModel {
        PermissionModel::Modern
    }

    async fn check(&self, capability: Capability) -> Result<bool, TransportError> {
        match capability {
            Capability::Location => Ok(true),
            Capability::Scan | Capability::Connect => Ok(self.access_granted.load(Ordering::SeqCst)),
        }
    }

    async fn request(&self, capability: Capability) -> Result<bool, TransportError> {
        match capability {
            Capability::Location => Ok(true),
            Capability::Scan | Capability::Connect => {
                if self.access_granted.load(Ordering::SeqCst) {
                    return Ok(true);
                }
                self.probe_access().await
            },
        }
    }
}
