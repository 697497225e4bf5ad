//! BLE command/telemetry link for the FilmMate Tripod
//!
//! This crate finds a peripheral by advertised name, negotiates a GATT
//! characteristic that supports both write and notify, and then runs a
//! command loop: a random value goes out every interval while inbound
//! notifications are decoded and handed to a consumer, until the session is
//! cancelled.
//!
//! # Architecture
//!
//! ```text
//! DeviceLocator ──► ChannelNegotiator ──► Session ──► CommandLoop
//!      │                   │                            │      ▲
//!      ▼                   ▼                            ▼      │
//!   Central::scan    Central::connect          GattLink::write │
//!                    GattLink::services        NotificationSink
//! ```
//!
//! The radio stack sits behind the [`Central`] / [`GattLink`] traits:
//!
//! - `ble` feature - [`transport::BtleplugCentral`] drives a real adapter
//! - always - [`test_utils::MockCentral`] simulates the tripod firmware
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use filmmate_link::{LinkConfigBuilder, NotificationSink, TripodController};
//! use filmmate_link::transport::BtleplugCentral;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LinkConfigBuilder::new()
//!         .target_name("FilmMate Tripod")
//!         .build()?;
//!
//!     let central = BtleplugCentral::new().await?;
//!     let cancel = CancellationToken::new();
//!
//!     let ctrl_c = cancel.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         ctrl_c.cancel();
//!     });
//!
//!     let report = TripodController::new(config)
//!         .run(&central, NotificationSink::logging(), cancel)
//!         .await?;
//!     println!("sent {} commands", report.commands_sent);
//!     Ok(())
//! }
//! ```
//!
//! # Wire Format
//!
//! - Outbound: 4 bytes, little-endian two's-complement, values in `[0, 100]`
//! - Inbound: little-endian two's-complement of whatever width the peripheral sends

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod codec;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod locator;
pub mod negotiator;
pub mod session;
pub mod sink;
pub mod test_utils;
pub mod transport;

pub use command::{CommandLoop, LoopReport, LoopState, StopReason};
pub use config::{CommandConfig, LinkConfig, LinkConfigBuilder, ScanConfig};
pub use controller::TripodController;
pub use error::{LinkError, Result};
pub use locator::DeviceLocator;
pub use negotiator::ChannelNegotiator;
pub use session::Session;
pub use sink::{NotificationSink, Subscription};
pub use transport::{
    Capabilities, Capability, Central, Characteristic, ConnectionState, DiscoveredDevice,
    GattLink, GattService,
};

#[cfg(feature = "ble")]
pub use transport::BtleplugCentral;

// Protocol constants re-exports
pub use config::{
    COMMAND_MAX, COMMAND_MIN, COMMAND_WIDTH, DEFAULT_COMMAND_INTERVAL, DEFAULT_SETTLE_DELAY,
    DEFAULT_TARGET_NAME,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_TARGET_NAME, "FilmMate Tripod");
        assert_eq!(COMMAND_WIDTH, 4);
        assert_eq!((COMMAND_MIN, COMMAND_MAX), (0, 100));
        assert_eq!(DEFAULT_SETTLE_DELAY, Duration::from_secs(5));
        assert_eq!(DEFAULT_COMMAND_INTERVAL, Duration::from_secs(5));
    }
}
