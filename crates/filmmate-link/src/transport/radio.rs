//! Bluetooth Low Energy transport backed by btleplug
//!
//! # Requirements
//!
//! Enable the `ble` feature in Cargo.toml to use this transport.
//!
//! On Linux, you'll also need:
//! ```bash
//! apt install libdbus-1-dev
//! ```

use async_trait::async_trait;
use btleplug::api::{
    Central as _, CharPropFlags, Characteristic as NativeCharacteristic, Manager as _,
    Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::{
    Capabilities, Capability, Central, Characteristic, DiscoveredDevice, GattLink, GattService,
    NotificationStream,
};
use crate::error::{LinkError, Result};

/// Scan window used when the caller does not configure one
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(5);

/// Central backed by the first Bluetooth adapter on this host
pub struct BtleplugCentral {
    adapter: Adapter,
    /// Peripherals from the last scan, keyed by address
    seen: Mutex<HashMap<String, Peripheral>>,
    name: String,
}

impl BtleplugCentral {
    /// Open the first available adapter
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(LinkError::NoAdapter)?;
        let info = adapter.adapter_info().await?;
        info!(adapter = %info, "Using Bluetooth adapter");

        Ok(Self {
            adapter,
            seen: Mutex::new(HashMap::new()),
            name: format!("btleplug:{}", info),
        })
    }
}

#[async_trait]
impl Central for BtleplugCentral {
    async fn scan(&self, window: Option<Duration>) -> Result<Vec<DiscoveredDevice>> {
        let window = window.unwrap_or(DEFAULT_SCAN_WINDOW);
        debug!(window = ?window, "Starting BLE scan");

        self.adapter.start_scan(ScanFilter::default()).await?;
        // If this future is dropped mid-window the adapter must still stop.
        let adapter = self.adapter.clone();
        let guard = StopOnDrop::new(move || spawn_stop_scan(adapter));
        tokio::time::sleep(window).await;
        let peripherals = self.adapter.peripherals().await;
        guard.disarm();
        self.adapter.stop_scan().await?;

        let mut devices = Vec::new();
        let mut seen = HashMap::new();
        for peripheral in peripherals? {
            let name = match peripheral.properties().await? {
                Some(props) => props.local_name,
                None => None,
            };
            let address = peripheral.address().to_string();
            trace!(address = %address, name = ?name, "Scan result");

            devices.push(DiscoveredDevice {
                name,
                address: address.clone(),
            });
            seen.insert(address, peripheral);
        }

        *self.seen.lock() = seen;
        Ok(devices)
    }

    async fn connect(&self, device: &DiscoveredDevice) -> Result<Arc<dyn GattLink>> {
        let peripheral = self.seen.lock().get(&device.address).cloned().ok_or_else(|| {
            LinkError::Transport(format!("{} was not seen in the last scan", device.address))
        })?;

        peripheral.connect().await?;
        Ok(Arc::new(BtleplugLink { peripheral }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Runs its action on drop unless disarmed
struct StopOnDrop<F: FnOnce()> {
    action: Option<F>,
}

impl<F: FnOnce()> StopOnDrop<F> {
    fn new(action: F) -> Self {
        Self {
            action: Some(action),
        }
    }

    fn disarm(mut self) {
        self.action.take();
    }
}

impl<F: FnOnce()> Drop for StopOnDrop<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

fn spawn_stop_scan(adapter: Adapter) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            debug!("Scan abandoned, stopping it in the background");
            handle.spawn(async move {
                if let Err(e) = adapter.stop_scan().await {
                    warn!(error = %e, "Error stopping abandoned scan");
                }
            });
        }
        Err(_) => warn!("Scan abandoned outside a runtime, adapter left scanning"),
    }
}

/// GATT connection to one btleplug peripheral
struct BtleplugLink {
    peripheral: Peripheral,
}

impl BtleplugLink {
    /// Map our characteristic back onto the peripheral's own handle
    fn native(&self, characteristic: &Characteristic) -> Result<NativeCharacteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                c.uuid == characteristic.uuid && c.service_uuid == characteristic.service_uuid
            })
            .ok_or_else(|| {
                LinkError::Transport(format!(
                    "characteristic {} is not on this peripheral",
                    characteristic.uuid
                ))
            })
    }
}

fn capabilities(flags: CharPropFlags) -> Capabilities {
    [
        (CharPropFlags::BROADCAST, Capability::Broadcast),
        (CharPropFlags::READ, Capability::Read),
        (CharPropFlags::WRITE_WITHOUT_RESPONSE, Capability::WriteWithoutResponse),
        (CharPropFlags::WRITE, Capability::Write),
        (CharPropFlags::NOTIFY, Capability::Notify),
        (CharPropFlags::INDICATE, Capability::Indicate),
        (CharPropFlags::AUTHENTICATED_SIGNED_WRITES, Capability::AuthenticatedSignedWrites),
        (CharPropFlags::EXTENDED_PROPERTIES, Capability::ExtendedProperties),
    ]
    .into_iter()
    .filter(|(flag, _)| flags.contains(*flag))
    .map(|(_, capability)| capability)
    .collect()
}

#[async_trait]
impl GattLink for BtleplugLink {
    async fn services(&self) -> Result<Vec<GattService>> {
        self.peripheral.discover_services().await?;

        Ok(self
            .peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| Characteristic {
                        uuid: c.uuid,
                        service_uuid: c.service_uuid,
                        capabilities: capabilities(c.properties),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn write(&self, characteristic: &Characteristic, payload: &[u8]) -> Result<()> {
        let native = self.native(characteristic)?;
        self.peripheral
            .write(&native, payload, WriteType::WithResponse)
            .await
            .map_err(|e| LinkError::WriteFailed(e.to_string()))
    }

    async fn subscribe(&self, characteristic: &Characteristic) -> Result<NotificationStream> {
        let native = self.native(characteristic)?;
        let uuid = native.uuid;

        // Take the stream before enabling notifications so the first push
        // cannot slip past.
        let notifications = self.peripheral.notifications().await?;
        self.peripheral.subscribe(&native).await?;

        Ok(notifications
            .filter_map(move |n| async move { (n.uuid == uuid).then(|| Bytes::from(n.value)) })
            .boxed())
    }

    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()> {
        let native = self.native(characteristic)?;
        self.peripheral.unsubscribe(&native).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
