//! Radio transport seam
//!
//! The controller never talks to a Bluetooth stack directly. It consumes a
//! [`Central`] (scan + connect) and the [`GattLink`] it hands back (enumerate,
//! write, subscribe). Implementations:
//!
//! - [`radio::BtleplugCentral`] - real radio via btleplug (requires `ble` feature)
//! - [`crate::test_utils::MockCentral`] - scripted in-process peripheral
//!
//! # Feature Requirements
//!
//! - `ble`: Requires BlueZ development files on Linux
//!   ```bash
//!   apt install libdbus-1-dev
//!   ```

#[cfg(feature = "ble")]
pub mod radio;

#[cfg(feature = "ble")]
pub use radio::BtleplugCentral;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Stream of raw notification payloads for one characteristic
pub type NotificationStream = BoxStream<'static, Bytes>;

/// A peripheral seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Advertised local name, if any
    pub name: Option<String>,
    /// Transport-specific address
    pub address: String,
}

impl DiscoveredDevice {
    /// Create a device record
    pub fn new(name: Option<&str>, address: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.into(),
        }
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "<unnamed> ({})", self.address),
        }
    }
}

/// A single GATT characteristic property
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Broadcast
    Broadcast,
    /// Read
    Read,
    /// Write without response
    WriteWithoutResponse,
    /// Write with response
    Write,
    /// Notify
    Notify,
    /// Indicate
    Indicate,
    /// Authenticated signed writes
    AuthenticatedSignedWrites,
    /// Extended properties
    ExtendedProperties,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Broadcast => "broadcast",
            Capability::Read => "read",
            Capability::WriteWithoutResponse => "write-without-response",
            Capability::Write => "write",
            Capability::Notify => "notify",
            Capability::Indicate => "indicate",
            Capability::AuthenticatedSignedWrites => "authenticated-signed-writes",
            Capability::ExtendedProperties => "extended-properties",
        };
        f.write_str(s)
    }
}

/// Set of properties a characteristic supports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<Capability>);

impl Capabilities {
    /// Does the set contain `capability`
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Does the set contain every capability in `required`
    pub fn supports_all(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.contains(*c))
    }

    /// Iterate in a stable order
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// An addressable data point on the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    /// Characteristic UUID
    pub uuid: Uuid,
    /// UUID of the owning service
    pub service_uuid: Uuid,
    /// Supported properties
    pub capabilities: Capabilities,
}

/// A service and its characteristics, in enumeration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID
    pub uuid: Uuid,
    /// Characteristics in the order the transport reported them
    pub characteristics: Vec<Characteristic>,
}

/// Scanner / connector half of a radio stack
#[async_trait]
pub trait Central: Send + Sync {
    /// Scan for advertising peripherals
    ///
    /// `window` bounds the scan; `None` uses the transport's default window.
    /// Devices are returned in discovery order.
    async fn scan(&self, window: Option<Duration>) -> Result<Vec<DiscoveredDevice>>;

    /// Open a connection to a previously discovered device
    async fn connect(&self, device: &DiscoveredDevice) -> Result<Arc<dyn GattLink>>;

    /// Get the central name (for logging)
    fn name(&self) -> &str;
}

/// An open GATT connection to one peripheral
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Enumerate services and characteristics in transport order
    async fn services(&self) -> Result<Vec<GattService>>;

    /// Write a payload to a characteristic
    async fn write(&self, characteristic: &Characteristic, payload: &[u8]) -> Result<()>;

    /// Enable notifications and return the stream of inbound payloads
    async fn subscribe(&self, characteristic: &Characteristic) -> Result<NotificationStream>;

    /// Disable notifications
    async fn unsubscribe(&self, characteristic: &Characteristic) -> Result<()>;

    /// Close the connection
    async fn disconnect(&self) -> Result<()>;
}

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Successfully connected
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}
