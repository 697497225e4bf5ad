//! Steady-state command loop
//!
//! ```text
//!   subscribe
//!       │
//!       ▼
//!  ┌─────────┐  tick: generate → encode → send → wait
//!  │ Running │◄──────────────────────────────────────┐
//!  └────┬────┘───────────────────────────────────────┘
//!       │ cancel / send failure / max_commands reached
//!       ▼
//!  ┌──────────┐   unsubscribe, close session   ┌─────────┐
//!  │ Stopping │ ─────────────────────────────► │ Stopped │
//!  └──────────┘                                └─────────┘
//! ```
//!
//! Cancellation is checked before each send, right after each send, and
//! raced against every wait. Teardown runs on every exit path once the
//! subscription is established.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::CommandConfig;
use crate::error::Result;
use crate::session::Session;
use crate::sink::{NotificationSink, SinkCounters};

/// Lifecycle of the command loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Sending commands
    Running,
    /// Tearing down the subscription and session
    Stopping,
    /// Fully torn down
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Running => write!(f, "running"),
            LoopState::Stopping => write!(f, "stopping"),
            LoopState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why the loop left the Running state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation token fired
    Cancelled,
    /// `max_commands` commands were sent
    Completed,
}

/// Summary of a finished loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    /// Why the loop stopped
    pub reason: StopReason,
    /// Commands written to the peripheral
    pub commands_sent: u64,
    /// Notification values delivered to the consumer
    pub notifications_received: u64,
    /// Notifications dropped as malformed
    pub notifications_dropped: u64,
}

/// Produces the next command value
pub type CommandSource = Box<dyn FnMut() -> i64 + Send>;

/// Drives a session: periodic commands out, notifications in
pub struct CommandLoop {
    config: CommandConfig,
    source: CommandSource,
    state: LoopState,
    commands_sent: u64,
}

impl CommandLoop {
    /// Create a loop drawing values uniformly from `[config.min, config.max]`
    pub fn new(config: CommandConfig) -> Self {
        let mut rng = StdRng::from_entropy();
        let (min, max) = (config.min, config.max);
        Self::with_source(config, move || rng.gen_range(min..=max))
    }

    /// Create a loop with a custom value source
    pub fn with_source(config: CommandConfig, source: impl FnMut() -> i64 + Send + 'static) -> Self {
        Self {
            config,
            source: Box::new(source),
            state: LoopState::Stopped,
            commands_sent: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until cancelled, completed, or a send fails
    ///
    /// Consumes the session. Once the subscription exists, it is released
    /// exactly once and the session is closed on every exit path. A send
    /// failure is returned after teardown; teardown failures are returned
    /// only when the loop itself stopped cleanly. An invalid command
    /// configuration closes the session before anything is subscribed or sent.
    ///
    /// Teardown only happens when the returned future runs to completion.
    /// Stop the loop through `cancel`; dropping or aborting the future leaves
    /// the peripheral subscribed and the connection open.
    pub async fn run(
        &mut self,
        session: Session,
        sink: &NotificationSink,
        cancel: &CancellationToken,
    ) -> Result<LoopReport> {
        if let Err(e) = self.config.validate() {
            warn!(error = %e, "Refusing to start command loop");
            let _ = session.close().await;
            return Err(e);
        }

        let subscription = match sink.subscribe(&session).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(error = %e, "Could not subscribe to notifications");
                let _ = session.close().await;
                return Err(e);
            }
        };

        self.state = LoopState::Running;
        self.commands_sent = 0;
        info!(interval = ?self.config.interval, "Command loop running");

        let outcome = self.drive(&session, cancel).await;

        self.state = LoopState::Stopping;
        match &outcome {
            Ok(reason) => info!(reason = ?reason, "Exiting"),
            Err(e) => warn!(error = %e, "Command loop failed, exiting"),
        }

        let unsubscribed = subscription.unsubscribe().await;
        let closed = session.close().await;
        self.state = LoopState::Stopped;

        let reason = outcome?;
        unsubscribed?;
        closed?;

        Ok(self.report(reason, &sink.counters()))
    }

    async fn drive(&mut self, session: &Session, cancel: &CancellationToken) -> Result<StopReason> {
        loop {
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }

            let value = (self.source)();
            let payload = codec::encode(value, self.config.width)?;
            info!(value, "Sending");
            session.send(&payload).await?;
            self.commands_sent += 1;

            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            if self
                .config
                .max_commands
                .is_some_and(|max| self.commands_sent >= max)
            {
                return Ok(StopReason::Completed);
            }

            debug!(interval = ?self.config.interval, "Waiting for next tick");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StopReason::Cancelled),
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    fn report(&self, reason: StopReason, counters: &Arc<SinkCounters>) -> LoopReport {
        LoopReport {
            reason,
            commands_sent: self.commands_sent,
            notifications_received: counters.delivered(),
            notifications_dropped: counters.dropped(),
        }
    }
}

impl fmt::Debug for CommandLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandLoop")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("commands_sent", &self.commands_sent)
            .finish()
    }
}
