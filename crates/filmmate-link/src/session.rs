//! The single active connection to a peripheral

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{LinkError, Result};
use crate::transport::{Characteristic, ConnectionState, DiscoveredDevice, GattLink};

/// One open GATT connection with its negotiated characteristic
///
/// Only the negotiator builds a session, and only around a characteristic
/// that supports both write and notify. The command loop consumes it and
/// closes it on exit.
pub struct Session {
    device: DiscoveredDevice,
    characteristic: Characteristic,
    link: Arc<dyn GattLink>,
    state: Mutex<ConnectionState>,
}

impl Session {
    pub(crate) fn new(
        device: DiscoveredDevice,
        characteristic: Characteristic,
        link: Arc<dyn GattLink>,
    ) -> Self {
        Self {
            device,
            characteristic,
            link,
            state: Mutex::new(ConnectionState::Connected),
        }
    }

    /// The peripheral this session talks to
    pub fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    /// The negotiated write + notify characteristic
    pub fn characteristic(&self) -> &Characteristic {
        &self.characteristic
    }

    /// Current connection state
    ///
    /// Drops to [`ConnectionState::Disconnected`] once a send reports that
    /// the peripheral went away.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub(crate) fn link(&self) -> Arc<dyn GattLink> {
        Arc::clone(&self.link)
    }

    /// Write a payload to the negotiated characteristic
    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        let result = self.link.write(&self.characteristic, payload).await;
        if matches!(result, Err(LinkError::Disconnected)) {
            warn!(device = %self.device, "Peripheral dropped the connection");
            *self.state.lock() = ConnectionState::Disconnected;
        }
        result
    }

    /// Disconnect from the peripheral
    pub async fn close(self) -> Result<()> {
        let result = self.link.disconnect().await;
        match &result {
            Ok(()) => info!(device = %self.device, "Disconnected"),
            Err(e) => warn!(device = %self.device, error = %e, "Error disconnecting"),
        }
        result
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("characteristic", &self.characteristic.uuid)
            .field("state", &self.state())
            .finish()
    }
}
