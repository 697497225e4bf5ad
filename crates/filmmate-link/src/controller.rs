//! TripodController - one complete controller session
//!
//! Wires the stages together under a single cancellation token:
//!
//! 1. [`DeviceLocator`] scans for the configured name
//! 2. [`ChannelNegotiator`] connects and picks the write + notify characteristic
//! 3. [`CommandLoop`] subscribes the [`NotificationSink`] and drives the session
//!
//! Any failure ends the session; nothing is retried.
//!
//! # Example
//!
//! ```rust,ignore
//! use filmmate_link::{LinkConfig, NotificationSink, TripodController};
//! use filmmate_link::test_utils::MockCentral;
//! use tokio_util::sync::CancellationToken;
//!
//! let central = MockCentral::filmmate();
//! let controller = TripodController::new(LinkConfig::default());
//! let cancel = CancellationToken::new();
//!
//! let report = controller
//!     .run(&central, NotificationSink::logging(), cancel)
//!     .await?;
//! ```

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::command::{CommandLoop, LoopReport, StopReason};
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::locator::DeviceLocator;
use crate::negotiator::ChannelNegotiator;
use crate::sink::NotificationSink;
use crate::transport::Central;

/// Runs locate → negotiate → command loop for one device
#[derive(Debug, Clone)]
pub struct TripodController {
    config: LinkConfig,
}

impl TripodController {
    /// Create a controller
    ///
    /// The configuration is validated when a session starts, before any
    /// scan.
    pub fn new(config: LinkConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Run one session against `central` until cancelled or failed
    ///
    /// Cancellation before the loop starts yields a report with
    /// [`StopReason::Cancelled`] and no commands sent. An invalid
    /// configuration fails with [`LinkError::InvalidConfig`] before the radio
    /// is touched.
    ///
    /// Always stop a session through `cancel`. Dropping the returned future
    /// skips teardown, so the peripheral stays subscribed and connected.
    pub async fn run(
        &self,
        central: &dyn Central,
        sink: NotificationSink,
        cancel: CancellationToken,
    ) -> Result<LoopReport> {
        self.run_with(central, CommandLoop::new(self.config.command.clone()), sink, cancel)
            .await
    }

    /// Run one session with a caller-supplied command loop
    pub async fn run_with(
        &self,
        central: &dyn Central,
        mut command_loop: CommandLoop,
        sink: NotificationSink,
        cancel: CancellationToken,
    ) -> Result<LoopReport> {
        self.config.validate()?;

        let locator = DeviceLocator::new(central);
        let device = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled_early()),
            found = locator.discover(&self.config.target_name, self.config.scan.timeout) => found?,
        };

        let negotiator = ChannelNegotiator::new(central, self.config.settle_delay);
        let session = match negotiator.negotiate(&device, &cancel).await {
            Ok(session) => session,
            Err(LinkError::Cancelled) => return Ok(cancelled_early()),
            Err(e) => return Err(e),
        };

        let report = command_loop.run(session, &sink, &cancel).await?;
        info!(
            sent = report.commands_sent,
            received = report.notifications_received,
            dropped = report.notifications_dropped,
            "Session finished"
        );
        Ok(report)
    }
}

fn cancelled_early() -> LoopReport {
    info!("Cancelled before the command loop started");
    LoopReport {
        reason: StopReason::Cancelled,
        commands_sent: 0,
        notifications_received: 0,
        notifications_dropped: 0,
    }
}
