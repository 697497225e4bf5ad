//! Simulated radio for tests and dry runs
//!
//! [`MockCentral`] stands in for a Bluetooth adapter: it returns a scripted
//! scan, hands out [`MockLink`] connections with a fixed service table, and
//! records every GATT call so tests can assert on teardown ordering.
//!
//! [`MockCentral::filmmate`] reproduces the tripod firmware: one primary
//! service with a single `read | write | notify` characteristic that answers
//! every 4-byte write with a notification carrying `value + 1`.
//!
//! # Example
//!
//! ```rust,ignore
//! use filmmate_link::test_utils::{MockCentral, FILMMATE_ADDRESS};
//!
//! let central = MockCentral::filmmate();
//! // ... run a controller against it ...
//! let link = central.link(FILMMATE_ADDRESS).expect("connected");
//! assert_eq!(link.unsubscribe_count(), 1);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::DEFAULT_TARGET_NAME;
use crate::error::{LinkError, Result};
use crate::transport::{
    Capabilities, Capability, Central, Characteristic, DiscoveredDevice, GattLink, GattService,
    NotificationStream,
};

/// Service UUID exposed by the tripod firmware
pub const FILMMATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef0);

/// Command characteristic UUID exposed by the tripod firmware
pub const FILMMATE_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdef1);

/// Address used for the simulated tripod
pub const FILMMATE_ADDRESS: &str = "24:0A:C4:00:F1:17";

/// Build a characteristic record
pub fn characteristic(service_uuid: Uuid, uuid: Uuid, capabilities: &[Capability]) -> Characteristic {
    Characteristic {
        uuid,
        service_uuid,
        capabilities: capabilities.iter().copied().collect::<Capabilities>(),
    }
}

/// Build a service from its characteristics
pub fn service(uuid: Uuid, characteristics: Vec<Characteristic>) -> GattService {
    GattService {
        uuid,
        characteristics,
    }
}

/// One GATT call observed by a [`MockLink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    /// Service table read
    Services,
    /// Payload written
    Write(Bytes),
    /// Notifications enabled
    Subscribe,
    /// Notifications disabled
    Unsubscribe,
    /// Connection closed
    Disconnect,
}

/// Scripted behaviour of a simulated peripheral
#[derive(Debug, Clone, Default)]
pub struct MockPeripheral {
    services: Vec<GattService>,
    echo: bool,
    fail_services: bool,
    fail_subscribe: bool,
    fail_write_on: Option<usize>,
    write_delay: Option<Duration>,
}

impl MockPeripheral {
    /// Peripheral exposing `services`
    pub fn new(services: Vec<GattService>) -> Self {
        Self {
            services,
            ..Self::default()
        }
    }

    /// The tripod firmware: echoes `value + 1` for every 4-byte write
    pub fn filmmate() -> Self {
        Self::new(vec![service(
            FILMMATE_SERVICE_UUID,
            vec![characteristic(
                FILMMATE_SERVICE_UUID,
                FILMMATE_CHAR_UUID,
                &[Capability::Read, Capability::Write, Capability::Notify],
            )],
        )])
        .with_echo(true)
    }

    /// Answer 4-byte writes with a `value + 1` notification
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Fail the service table read
    pub fn failing_services(mut self) -> Self {
        self.fail_services = true;
        self
    }

    /// Fail the notification subscription
    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    /// Fail the `n`th write (1-based)
    pub fn failing_write_on(mut self, n: usize) -> Self {
        self.fail_write_on = Some(n);
        self
    }

    /// Delay every write by `delay`
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }
}

/// Simulated Bluetooth adapter
pub struct MockCentral {
    advertisers: Vec<DiscoveredDevice>,
    peripherals: HashMap<String, MockPeripheral>,
    scan_delay: Duration,
    scans: Mutex<usize>,
    links: Mutex<HashMap<String, Arc<MockLink>>>,
}

impl Default for MockCentral {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCentral {
    /// Central that sees nothing
    pub fn new() -> Self {
        Self {
            advertisers: Vec::new(),
            peripherals: HashMap::new(),
            scan_delay: Duration::ZERO,
            scans: Mutex::new(0),
            links: Mutex::new(HashMap::new()),
        }
    }

    /// An unrelated advertiser next to the tripod firmware
    pub fn filmmate() -> Self {
        Self::new()
            .with_advertiser(DiscoveredDevice::new(Some("Other"), "11:22:33:44:55:66"))
            .with_device(
                DiscoveredDevice::new(Some(DEFAULT_TARGET_NAME), FILMMATE_ADDRESS),
                MockPeripheral::filmmate(),
            )
    }

    /// Add a connectable device, in scan order
    pub fn with_device(mut self, device: DiscoveredDevice, peripheral: MockPeripheral) -> Self {
        self.peripherals.insert(device.address.clone(), peripheral);
        self.advertisers.push(device);
        self
    }

    /// Add a device with an empty service table, in scan order
    pub fn with_advertiser(self, device: DiscoveredDevice) -> Self {
        self.with_device(device, MockPeripheral::default())
    }

    /// Make every scan take `delay`
    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = delay;
        self
    }

    /// Number of scans performed
    pub fn scan_count(&self) -> usize {
        *self.scans.lock()
    }

    /// Number of connections opened
    pub fn connect_count(&self) -> usize {
        self.links.lock().len()
    }

    /// The link opened to `address`, if any
    pub fn link(&self, address: &str) -> Option<Arc<MockLink>> {
        self.links.lock().get(address).cloned()
    }
}

#[async_trait]
impl Central for MockCentral {
    async fn scan(&self, window: Option<Duration>) -> Result<Vec<DiscoveredDevice>> {
        *self.scans.lock() += 1;
        debug!(window = ?window, devices = self.advertisers.len(), "Mock scan");
        if !self.scan_delay.is_zero() {
            tokio::time::sleep(self.scan_delay).await;
        }
        Ok(self.advertisers.clone())
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<Arc<dyn GattLink>> {
        let peripheral = self.peripherals.get(&device.address).cloned().ok_or_else(|| {
            LinkError::Transport(format!("{} was not seen in the last scan", device.address))
        })?;

        let link = Arc::new(MockLink::new(peripheral));
        self.links
            .lock()
            .insert(device.address.clone(), Arc::clone(&link));
        Ok(link)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Simulated GATT connection
pub struct MockLink {
    peripheral: MockPeripheral,
    journal: Mutex<Vec<LinkCall>>,
    notify_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    writes: Mutex<usize>,
    connected: Mutex<bool>,
}

impl MockLink {
    fn new(peripheral: MockPeripheral) -> Self {
        Self {
            peripheral,
            journal: Mutex::new(Vec::new()),
            notify_tx: Mutex::new(None),
            writes: Mutex::new(0),
            connected: Mutex::new(true),
        }
    }

    /// Every call seen so far, in order
    pub fn journal(&self) -> Vec<LinkCall> {
        self.journal.lock().clone()
    }

    /// Payloads written so far
    pub fn written(&self) -> Vec<Bytes> {
        self.journal
            .lock()
            .iter()
            .filter_map(|call| match call {
                LinkCall::Write(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of subscribe calls
    pub fn subscribe_count(&self) -> usize {
        self.count(&LinkCall::Subscribe)
    }

    /// Number of unsubscribe calls
    pub fn unsubscribe_count(&self) -> usize {
        self.count(&LinkCall::Unsubscribe)
    }

    /// Number of disconnect calls
    pub fn disconnect_count(&self) -> usize {
        self.count(&LinkCall::Disconnect)
    }

    /// Is the simulated connection still open
    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    /// Simulate the peripheral going out of range
    ///
    /// Later writes fail with [`LinkError::Disconnected`] and the
    /// notification stream ends.
    pub fn drop_connection(&self) {
        debug!("Mock peripheral dropped the connection");
        self.notify_tx.lock().take();
        *self.connected.lock() = false;
    }

    /// Push a notification payload to the current subscriber
    ///
    /// Returns false when nobody is subscribed.
    pub fn push_notification(&self, payload: impl Into<Bytes>) -> bool {
        match self.notify_tx.lock().as_ref() {
            Some(tx) => tx.unbounded_send(payload.into()).is_ok(),
            None => false,
        }
    }

    fn count(&self, wanted: &LinkCall) -> usize {
        self.journal.lock().iter().filter(|c| *c == wanted).count()
    }

    fn record(&self, call: LinkCall) {
        trace!(call = ?call, "Mock GATT call");
        self.journal.lock().push(call);
    }
}

#[async_trait]
impl GattLink for MockLink {
    async fn services(&self) -> Result<Vec<GattService>> {
        self.record(LinkCall::Services);
        if self.peripheral.fail_services {
            return Err(LinkError::Transport("service discovery failed".to_string()));
        }
        Ok(self.peripheral.services.clone())
    }

    async fn write(&self, _characteristic: &Characteristic, payload: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(LinkError::Disconnected);
        }
        if let Some(delay) = self.peripheral.write_delay {
            tokio::time::sleep(delay).await;
        }

        let attempt = {
            let mut writes = self.writes.lock();
            *writes += 1;
            *writes
        };
        if self.peripheral.fail_write_on == Some(attempt) {
            return Err(LinkError::WriteFailed(format!("write {} rejected", attempt)));
        }

        self.record(LinkCall::Write(Bytes::copy_from_slice(payload)));

        // Firmware behaviour: only exact 4-byte writes are answered.
        if self.peripheral.echo {
            if let Ok(raw) = <[u8; 4]>::try_from(payload) {
                let reply = i32::from_le_bytes(raw).wrapping_add(1);
                self.push_notification(Bytes::copy_from_slice(&reply.to_le_bytes()));
            }
        }
        Ok(())
    }

    async fn subscribe(&self, _characteristic: &Characteristic) -> Result<NotificationStream> {
        self.record(LinkCall::Subscribe);
        if self.peripheral.fail_subscribe {
            return Err(LinkError::Transport("CCCD write rejected".to_string()));
        }
        let (tx, rx) = mpsc::unbounded();
        *self.notify_tx.lock() = Some(tx);
        Ok(rx.boxed())
    }

    async fn unsubscribe(&self, _characteristic: &Characteristic) -> Result<()> {
        self.record(LinkCall::Unsubscribe);
        self.notify_tx.lock().take();
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(LinkCall::Disconnect);
        self.notify_tx.lock().take();
        *self.connected.lock() = false;
        Ok(())
    }
}
