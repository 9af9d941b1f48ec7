//! In-memory bluetooth stack used by the test-suite.
//!
//! `FakeTransport` behaves like a radio with a fixed set of advertising peripherals. Lamps added
//! with `add_lamp` answer reads and writes on the LED characteristic the way the firmware does.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::device::codec::decode_command;
use crate::device::constants::{make_lamp_service_uuid, make_led_characteristic_uuid};
use crate::device::permissions::{Capability, PermissionModel, PermissionProvider};
use crate::device::transport::{BleTransport, CharacteristicRef};
use crate::device::types::{LedState, PeripheralId, PeripheralRef, TransportEvent};
use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    StartScan,
    StopScan,
    Connect(PeripheralId),
    Discover(PeripheralId),
    Read(PeripheralId, Uuid),
    Write(PeripheralId, Uuid, Vec<u8>),
    Disconnect(PeripheralId),
}

impl TransportCall {
    /// Calls that move data to or from a peripheral's characteristic.
    pub fn is_characteristic_io(&self) -> bool {
        matches!(self, TransportCall::Read(..) | TransportCall::Write(..))
    }
}

#[derive(Default)]
struct FakeState {
    advertisements: Vec<PeripheralRef>,
    characteristics: HashMap<PeripheralId, Vec<CharacteristicRef>>,
    values: HashMap<(PeripheralId, Uuid), Vec<u8>>,
    failing_discovery: HashSet<PeripheralId>,
    scan_error: Option<String>,
    start_scan_error: Option<String>,
    failing_writes: bool,
    connected: HashSet<PeripheralId>,
    scan_sink: Option<mpsc::UnboundedSender<TransportEvent>>,
    calls: Vec<TransportCall>,
}

pub struct FakeTransport {
    state: Mutex<FakeState>,
}

pub fn led_characteristic() -> CharacteristicRef {
    CharacteristicRef {
        service: make_lamp_service_uuid(),
        characteristic: make_led_characteristic_uuid(),
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport {
            state: Mutex::new(FakeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<FakeState> {
        self.state.lock().expect("Failed to lock FakeTransport state")
    }

    /// A peripheral that shows up in scans. It can not be connected to.
    pub fn advertise(&self, id: &str, name: Option<&str>, rssi: Option<i16>) {
        self.state().advertisements.push(PeripheralRef {
            id: id.into(),
            name: name.map(String::from),
            rssi,
        });
    }

    /// A lamp running the Swell firmware: advertised, connectable, LED initially off.
    pub fn add_lamp(&self, id: &str, name: &str, rssi: i16) {
        self.advertise(id, Some(name), Some(rssi));

        let led = led_characteristic();
        let mut state = self.state();
        state.characteristics.insert(id.into(), vec![led]);
        state.values.insert((id.into(), led.characteristic), br#"{"isOn":false}"#.to_vec());
    }

    /// A connectable peripheral that does not expose the LED characteristic.
    pub fn add_peripheral(&self, id: &str, name: &str, characteristics: Vec<CharacteristicRef>) {
        self.advertise(id, Some(name), None);
        self.state().characteristics.insert(id.into(), characteristics);
    }

    pub fn set_value(&self, id: &str, characteristic: Uuid, value: &[u8]) {
        self.state().values.insert((id.into(), characteristic), value.to_vec());
    }

    pub fn fail_discovery(&self, id: &str) {
        self.state().failing_discovery.insert(id.into());
    }

    /// Publish a scan error after the advertisements of the next scan.
    pub fn fail_scan(&self, message: &str) {
        self.state().scan_error = Some(message.to_string());
    }

    /// Make the next `start_scan` call fail.
    pub fn reject_scan(&self, message: &str) {
        self.state().start_scan_error = Some(message.to_string());
    }

    pub fn fail_writes(&self, failing: bool) {
        self.state().failing_writes = failing;
    }

    /// The peripheral went out of range.
    pub fn drop_link(&self, id: &str) {
        self.state().connected.remove(&PeripheralId::from(id));
    }

    pub fn has_link(&self, id: &str) -> bool {
        self.state().connected.contains(&PeripheralId::from(id))
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: TransportCall) -> MutexGuard<FakeState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }

    fn require_link(state: &FakeState, id: &PeripheralId) -> Result<(), TransportError> {
        if state.connected.contains(id) {
            Ok(())
        } else {
            Err(TransportError::Other(format!("peripheral {} is not connected", id)))
        }
    }
}

impl Default for FakeTransport {
    fn default() -> Self {
        FakeTransport::new()
    }
}

#[async_trait]
impl BleTransport for FakeTransport {
    async fn start_scan(&self) -> Result<mpsc::UnboundedReceiver<TransportEvent>, TransportError> {
        let mut state = self.record(TransportCall::StartScan);

        if let Some(message) = state.start_scan_error.take() {
            return Err(TransportError::Other(message));
        }

        let (sink, events) = mpsc::unbounded_channel();
        for peripheral in &state.advertisements {
            let _ = sink.send(TransportEvent::Discovered(peripheral.clone()));
        }

        if let Some(message) = state.scan_error.take() {
            let _ = sink.send(TransportEvent::ScanError(message));
        }

        state.scan_sink = Some(sink);
        Ok(events)
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.record(TransportCall::StopScan).scan_sink = None;
        Ok(())
    }

    fn is_linked(&self, id: &PeripheralId) -> bool {
        self.state().connected.contains(id)
    }

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        let mut state = self.record(TransportCall::Connect(id.clone()));

        if !state.characteristics.contains_key(id) {
            return Err(TransportError::Other(format!("peripheral {} is unreachable", id)));
        }

        state.connected.insert(id.clone());
        Ok(())
    }

    async fn discover(&self, id: &PeripheralId) -> Result<Vec<CharacteristicRef>, TransportError> {
        let state = self.record(TransportCall::Discover(id.clone()));
        FakeTransport::require_link(&state, id)?;

        if state.failing_discovery.contains(id) {
            return Err(TransportError::Other("service discovery failed".to_string()));
        }

        Ok(state.characteristics.get(id).cloned().unwrap_or_default())
    }

    async fn read(&self, id: &PeripheralId, characteristic: &CharacteristicRef) -> Result<Vec<u8>, TransportError> {
        let state = self.record(TransportCall::Read(id.clone(), characteristic.characteristic));
        FakeTransport::require_link(&state, id)?;

        state.values
            .get(&(id.clone(), characteristic.characteristic))
            .cloned()
            .ok_or(TransportError::MissingCharacteristic)
    }

    async fn write(&self, id: &PeripheralId, characteristic: &CharacteristicRef, value: &[u8]) -> Result<(), TransportError> {
        let mut state = self.record(TransportCall::Write(id.clone(), characteristic.characteristic, value.to_vec()));
        FakeTransport::require_link(&state, id)?;

        if state.failing_writes {
            return Err(TransportError::Other("write was not acknowledged".to_string()));
        }

        // the firmware answers subsequent reads with the new LED state
        if let Ok(command) = decode_command(value) {
            let status = json!({ "isOn": command.command == LedState::On });
            state.values.insert((id.clone(), characteristic.characteristic), status.to_string().into_bytes());
        }

        Ok(())
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        self.record(TransportCall::Disconnect(id.clone())).connected.remove(id);
        Ok(())
    }
}

/// Permission provider with a scripted outcome.
pub struct FakePermissions {
    model: PermissionModel,
    granted: Mutex<HashSet<Capability>>,
    grant_on_request: HashSet<Capability>,
    failing: bool,
    request_delay: Option<Duration>,
    requests: Mutex<Vec<Capability>>,
}

impl FakePermissions {
    pub fn new(model: PermissionModel) -> Self {
        FakePermissions {
            model,
            granted: Mutex::new(HashSet::new()),
            grant_on_request: HashSet::new(),
            failing: false,
            request_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Everything the model needs is already granted.
    pub fn granted(model: PermissionModel) -> Self {
        FakePermissions::new(model).with_granted(model.capabilities())
    }

    /// Nothing is granted and every request is denied.
    pub fn denied(model: PermissionModel) -> Self {
        FakePermissions::new(model)
    }

    pub fn with_granted(self, capabilities: &[Capability]) -> Self {
        self.granted.lock().expect("Failed to lock granted").extend(capabilities.iter().copied());
        self
    }

    pub fn with_grant_on_request(mut self, capabilities: &[Capability]) -> Self {
        self.grant_on_request.extend(capabilities.iter().copied());
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Requests take `delay` to be answered, like a system dialog waiting for the user.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<Capability> {
        self.requests.lock().expect("Failed to lock requests").clone()
    }
}

#[async_trait]
impl PermissionProvider for FakePermissions {
    fn model(&self) -> PermissionModel {
        self.model
    }

    async fn check(&self, capability: Capability) -> Result<bool, TransportError> {
        if self.failing {
            return Err(TransportError::Other("permission service unavailable".to_string()));
        }

        Ok(self.granted.lock().expect("Failed to lock granted").contains(&capability))
    }

    async fn request(&self, capability: Capability) -> Result<bool, TransportError> {
        self.requests.lock().expect("Failed to lock requests").push(capability);

        if let Some(delay) = self.request_delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing {
            return Err(TransportError::Other("permission service unavailable".to_string()));
        }

        let granted = self.grant_on_request.contains(&capability);
        if granted {
            self.granted.lock().expect("Failed to lock granted").insert(capability);
        }
        Ok(granted)
    }
}
