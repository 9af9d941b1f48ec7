use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use indexmap::IndexMap;
use indexmap::map::Entry;
use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::device::permissions::{ensure_permissions, PermissionProvider};
use crate::device::transport::BleTransport;
use crate::device::types::{DeviceEvent, PeripheralId, PeripheralRef, TransportEvent};

/// Clears the cancel token and the in-progress flag when a scan ends, however it ends.
struct ScanGuard<'a> {
    scanner: &'a Scanner,
}

impl<'a> ScanGuard<'a> {
    fn acquire(scanner: &'a Scanner) -> Option<Self> {
        scanner.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ScanGuard { scanner })
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.scanner.set_cancel_token(None);
        self.scanner.in_progress.store(false, Ordering::SeqCst);
    }
}

pub struct Scanner {
    transport: Arc<dyn BleTransport>,
    permissions: Arc<dyn PermissionProvider>,
    device_events: broadcast::Sender<DeviceEvent>,
    in_progress: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Scanner {
    pub fn new(
        transport: Arc<dyn BleTransport>,
        permissions: Arc<dyn PermissionProvider>,
        device_events: broadcast::Sender<DeviceEvent>,
    ) -> Self {
        Scanner {
            transport,
            permissions,
            device_events,
            in_progress: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Stop the scan that is in flight, if any. The scan returns what it found so far, which is
    /// nothing when it is still waiting for bluetooth access.
    pub fn cancel(&self) {
        if let Some(token) = self.cancel.lock().expect("Failed to lock scan cancel token").as_ref() {
            info!("Cancelling scan");
            token.cancel();
        }
    }

    fn publish(&self, event: DeviceEvent) {
        // an error only means that nobody is listening right now
        let _ = self.device_events.send(event);
    }

    fn set_cancel_token(&self, token: Option<CancellationToken>) {
        *self.cancel.lock().expect("Failed to lock scan cancel token") = token;
    }

    /// Scan for named peripherals for `timeout`. Peripherals are listed once, in the order they
    /// were first seen.
    ///
    /// Returns an empty list without scanning if another scan is in flight or if bluetooth access
    /// is not granted. A scan error ends the scan early with an empty list and a
    /// `DeviceEvent::ScanError`.
    pub async fn scan(&self, timeout: Duration) -> Vec<PeripheralRef> {
        let Some(_guard) = ScanGuard::acquire(self) else {
            debug!("A scan is already in progress");
            return Vec::new();
        };

        let cancel = CancellationToken::new();
        self.set_cancel_token(Some(cancel.clone()));

        let granted = tokio::select! {
            granted = ensure_permissions(self.permissions.as_ref()) => granted,
            _ = cancel.cancelled() => {
                info!("Scan cancelled while waiting for bluetooth access");
                return Vec::new();
            },
        };

        if !granted {
            warn!("Not allowed to access bluetooth, not scanning");
            self.publish(DeviceEvent::PermissionDenied);
            return Vec::new();
        }

        if cancel.is_cancelled() {
            info!("Scan cancelled before it started");
            return Vec::new();
        }

        info!("Starting BLE scan for {}", humantime::format_duration(timeout));
        let mut events = match self.transport.start_scan().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Scanning failed {:?}", err);
                if err.is_permission_denied() {
                    self.publish(DeviceEvent::PermissionDenied);
                } else {
                    self.publish(DeviceEvent::ScanError(err.to_string()));
                }
                return Vec::new();
            },
        };
        self.publish(DeviceEvent::ScanStarted);

        let mut found: IndexMap<PeripheralId, PeripheralRef> = IndexMap::new();
        let deadline = sleep(timeout);
        tokio::pin!(deadline);

        let outcome: Result<(), String> = loop {
            tokio::select! {
                _ = &mut deadline => {
                    break Ok(());
                },
                _ = cancel.cancelled() => {
                    break Ok(());
                },
                event = events.recv() => match event {
                    Some(TransportEvent::Discovered(peripheral)) => {
                        if !peripheral.has_name() {
                            continue;
                        }

                        match found.entry(peripheral.id.clone()) {
                            Entry::Occupied(mut entry) => {
                                let known = entry.get_mut();
                                known.name = peripheral.name;
                                known.rssi = peripheral.rssi;
                            },
                            Entry::Vacant(entry) => {
                                debug!("Found device {} {}", peripheral.display_name(), peripheral.id);
                                self.publish(DeviceEvent::Discovered(peripheral.clone()));
                                entry.insert(peripheral);
                            },
                        }
                    },
                    Some(TransportEvent::ScanError(message)) => {
                        break Err(message);
                    },
                    None => {
                        break Err("bluetooth event channel closed".to_string());
                    },
                },
            }
        };

        if let Err(err) = self.transport.stop_scan().await {
            warn!("Failed to stop scan: {:?}", err);
        }

        match outcome {
            Ok(()) => {
                info!("Scan finished, {} devices found", found.len());
                self.publish(DeviceEvent::ScanFinished(found.len()));
                found.into_values().collect()
            },
            Err(message) => {
                warn!("Scan error: {}", message);
                self.publish(DeviceEvent::ScanError(message));
                Vec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;
    use crate::device::constants::EVENT_CHANNEL_CAPACITY;
    use crate::device::fake::{FakePermissions, FakeTransport, TransportCall};
    use crate::device::permissions::PermissionModel;
    use super::*;

    fn scanner(transport: &Arc<FakeTransport>, permissions: FakePermissions) -> (Scanner, broadcast::Receiver<DeviceEvent>) {
        let (sender, receiver) = broadcast::channel(64);
        (Scanner::new(transport.clone(), Arc::new(permissions), sender), receiver)
    }

    #[tokio::test(start_paused = true)]
    async fn named_unique_in_discovery_order() {
        let transport = Arc::new(FakeTransport::new());
        transport.advertise("b", Some("Second"), Some(-70));
        transport.advertise("x", None, Some(-40));
        transport.advertise("e", Some(""), Some(-40));
        transport.advertise("a", Some("First"), Some(-60));
        transport.advertise("b", Some("Second (renamed)"), Some(-65));
        let (scanner, _events) = scanner(&transport, FakePermissions::granted(PermissionModel::Modern));

        let result = scanner.scan(Duration::from_millis(5000)).await;

        let names: Vec<_> = result.iter().map(|p| p.display_name()).collect();
        assert_eq!(names, vec!["Second (renamed)", "First"]);
        assert_eq!(result[0].rssi, Some(-65));
        assert!(!scanner.is_scanning());
        assert_eq!(transport.calls(), vec![TransportCall::StartScan, TransportCall::StopScan]);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_permission_does_not_scan() {
        let transport = Arc::new(FakeTransport::new());
        transport.add_lamp("lamp", "ESP32-LED", -55);
        let (scanner, mut events) = scanner(&transport, FakePermissions::denied(PermissionModel::Modern));

        assert!(scanner.scan(Duration::from_millis(5000)).await.is_empty());
        assert!(transport.calls().is_empty());
        assert_eq!(events.try_recv().unwrap(), DeviceEvent::PermissionDenied);
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_is_reported() {
        let transport = Arc::new(FakeTransport::new());
        transport.reject_scan("adapter is powered off");
        let (scanner, mut events) = scanner(&transport, FakePermissions::granted(PermissionModel::Legacy));

        assert!(scanner.scan(Duration::from_millis(5000)).await.is_empty());
        assert!(matches!(events.try_recv().unwrap(), DeviceEvent::ScanError(message) if message.contains("powered off")));
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_returns_partial_result() {
        let transport = Arc::new(FakeTransport::new());
        transport.add_lamp("lamp", "ESP32-LED", -55);
        let scanner = Arc::new(scanner(&transport, FakePermissions::granted(PermissionModel::Modern)).0);

        let background = scanner.clone();
        let handle = tokio::spawn(async move {
            background.scan(Duration::from_secs(3600)).await
        });

        while !scanner.is_scanning() || transport.count_calls(|c| *c == TransportCall::StartScan) == 0 {
            tokio::task::yield_now().await;
        }
        scanner.cancel();

        let result = handle.await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, PeripheralId::from("lamp"));
        assert_eq!(transport.count_calls(|c| *c == TransportCall::StopScan), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_larger_than_event_channel_is_kept() {
        let transport = Arc::new(FakeTransport::new());
        transport.add_lamp("lamp", "ESP32-LED", -55);
        for n in 0..EVENT_CHANNEL_CAPACITY * 2 {
            transport.advertise(&format!("peripheral-{}", n), Some(&format!("Peripheral {}", n)), Some(-80));
        }
        let (scanner, _events) = scanner(&transport, FakePermissions::granted(PermissionModel::Modern));

        let result = scanner.scan(Duration::from_millis(1000)).await;

        assert_eq!(result.len(), EVENT_CHANNEL_CAPACITY * 2 + 1);
        assert_eq!(result[0].id, PeripheralId::from("lamp"));
        assert_eq!(result.last().unwrap().id, PeripheralId::from(format!("peripheral-{}", EVENT_CHANNEL_CAPACITY * 2 - 1).as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_waiting_for_access() {
        let transport = Arc::new(FakeTransport::new());
        transport.add_lamp("lamp", "ESP32-LED", -55);
        let permissions = Arc::new(
            FakePermissions::denied(PermissionModel::Legacy)
                .with_grant_on_request(PermissionModel::Legacy.capabilities())
                .with_request_delay(Duration::from_secs(2)),
        );
        let (sender, mut events) = broadcast::channel(64);
        let scanner = Arc::new(Scanner::new(transport.clone(), permissions.clone(), sender));

        let started = Instant::now();
        let background = scanner.clone();
        let handle = tokio::spawn(async move {
            background.scan(Duration::from_secs(3600)).await
        });

        while permissions.requests().is_empty() {
            tokio::task::yield_now().await;
        }
        scanner.cancel();

        assert!(handle.await.unwrap().is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(transport.count_calls(|c| *c == TransportCall::StartScan), 0);
        assert!(events.try_recv().is_err());
        assert!(!scanner.is_scanning());

        // the next scan is not affected by the old cancellation
        assert_eq!(scanner.scan(Duration::from_millis(1000)).await.len(), 1);
    }
}
