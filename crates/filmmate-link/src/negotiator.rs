//! Channel negotiation
//!
//! Connects to the located device, lets its GATT table settle, then walks
//! services and characteristics in transport order and keeps the first
//! characteristic that supports both write and notify.
//!
//! ```text
//! connect ──► settle (cancellable) ──► enumerate ──► first {write, notify}
//!                  │                        │                 │
//!                  ▼                        ▼                 ▼
//!          disconnect, Cancelled    disconnect, error   Session / NoSuitableChannel
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{LinkError, Result};
use crate::session::Session;
use crate::transport::{Capability, Central, Characteristic, DiscoveredDevice, GattLink, GattService};

/// Capabilities a characteristic needs to carry commands and telemetry
pub const REQUIRED_CAPABILITIES: [Capability; 2] = [Capability::Write, Capability::Notify];

/// Opens a session on a located device
pub struct ChannelNegotiator<'a> {
    central: &'a dyn Central,
    settle_delay: Duration,
}

impl<'a> ChannelNegotiator<'a> {
    /// Create a negotiator that waits `settle_delay` after connecting
    pub fn new(central: &'a dyn Central, settle_delay: Duration) -> Self {
        Self {
            central,
            settle_delay,
        }
    }

    /// Connect to `device` and select its command characteristic
    ///
    /// Every failure after the connection is open disconnects before
    /// returning. Cancellation is honoured during the settle delay.
    pub async fn negotiate(
        &self,
        device: &DiscoveredDevice,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        info!(device = %device, "Connecting");
        let link = self.central.connect(device).await?;
        info!(device = %device, "Connected");

        debug!(delay = ?self.settle_delay, "Waiting for the service table to settle");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Cancelled while waiting for the service table");
                disconnect_quietly(&link).await;
                return Err(LinkError::Cancelled);
            }
            _ = tokio::time::sleep(self.settle_delay) => {}
        }

        let services = match link.services().await {
            Ok(services) => services,
            Err(e) => {
                warn!(error = %e, "Service enumeration failed");
                disconnect_quietly(&link).await;
                return Err(e);
            }
        };

        match select_characteristic(&services) {
            Some(characteristic) => {
                info!(characteristic = %characteristic.uuid, "Using characteristic");
                Ok(Session::new(device.clone(), characteristic, link))
            }
            None => {
                warn!(device = %device, "No suitable characteristic found");
                disconnect_quietly(&link).await;
                Err(LinkError::NoSuitableChannel {
                    device: device.address.clone(),
                })
            }
        }
    }
}

/// First characteristic, in enumeration order, that supports write and notify
///
/// Every service and characteristic visited is logged, up to the match.
pub fn select_characteristic(services: &[GattService]) -> Option<Characteristic> {
    for service in services {
        info!(service = %service.uuid, "Service");
        for characteristic in &service.characteristics {
            info!(
                characteristic = %characteristic.uuid,
                properties = %characteristic.capabilities,
                "  Characteristic"
            );
            if characteristic
                .capabilities
                .supports_all(&REQUIRED_CAPABILITIES)
            {
                return Some(characteristic.clone());
            }
        }
    }
    None
}

async fn disconnect_quietly(link: &Arc<dyn GattLink>) {
    if let Err(e) = link.disconnect().await {
        warn!(error = %e, "Error disconnecting");
    }
}
