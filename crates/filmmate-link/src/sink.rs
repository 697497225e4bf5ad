//! Inbound notification delivery
//!
//! A subscription owns one forwarding task that drains the characteristic's
//! notification stream, decodes each payload, and hands the value to the
//! consumer callback. Delivery is sequential, so values arrive in the order
//! the peripheral pushed them. Malformed payloads are logged and dropped.

use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::Result;
use crate::session::Session;
use crate::transport::{Characteristic, GattLink};

/// Callback receiving each decoded notification value
pub type ValueCallback = Arc<dyn Fn(i64) + Send + Sync>;

/// Notification counters shared with the forwarding task
#[derive(Debug, Default)]
pub struct SinkCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl SinkCounters {
    /// Values handed to the callback
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Payloads dropped because they could not be decoded
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Forwards decoded notification values to a consumer
pub struct NotificationSink {
    on_value: ValueCallback,
    counters: Arc<SinkCounters>,
}

impl NotificationSink {
    /// Create a sink delivering to `on_value`
    pub fn new(on_value: impl Fn(i64) + Send + Sync + 'static) -> Self {
        Self {
            on_value: Arc::new(on_value),
            counters: Arc::new(SinkCounters::default()),
        }
    }

    /// Sink that only logs received values
    pub fn logging() -> Self {
        Self::new(|value| info!(value, "Received notification"))
    }

    /// Shared counters for this sink
    pub fn counters(&self) -> Arc<SinkCounters> {
        Arc::clone(&self.counters)
    }

    /// Enable notifications on the session's characteristic
    ///
    /// The returned guard must be given back through
    /// [`Subscription::unsubscribe`] during teardown.
    pub async fn subscribe(&self, session: &Session) -> Result<Subscription> {
        let link = session.link();
        let characteristic = session.characteristic().clone();
        let mut stream = link.subscribe(&characteristic).await?;
        info!(characteristic = %characteristic.uuid, "Subscribed to notifications");

        let on_value = Arc::clone(&self.on_value);
        let counters = Arc::clone(&self.counters);
        let forwarder = tokio::spawn(async move {
            while let Some(payload) = stream.next().await {
                match codec::decode(&payload) {
                    Ok(value) => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                        on_value(value);
                    }
                    Err(e) => {
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(len = payload.len(), error = %e, "Dropping malformed notification");
                    }
                }
            }
            debug!("Notification stream ended");
        });

        Ok(Subscription {
            link,
            characteristic,
            forwarder: Some(forwarder),
        })
    }
}

/// An active notification subscription
///
/// `unsubscribe` consumes the guard, so it can run at most once. Dropping
/// the guard without unsubscribing stops delivery but leaves the
/// peripheral-side subscription in place: `Drop` cannot await the GATT
/// round trip. This is what happens when a running [`CommandLoop`] future
/// is dropped or its task aborted, so stop the loop through its
/// cancellation token instead.
///
/// [`CommandLoop`]: crate::command::CommandLoop
pub struct Subscription {
    link: Arc<dyn GattLink>,
    characteristic: Characteristic,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Characteristic this subscription listens on
    pub fn characteristic(&self) -> &Characteristic {
        &self.characteristic
    }

    /// Disable notifications and stop delivery
    pub async fn unsubscribe(mut self) -> Result<()> {
        let result = self.link.unsubscribe(&self.characteristic).await;
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        match &result {
            Ok(()) => info!(characteristic = %self.characteristic.uuid, "Unsubscribed"),
            Err(e) => warn!(error = %e, "Error unsubscribing"),
        }
        result
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            warn!(
                characteristic = %self.characteristic.uuid,
                "Subscription dropped without unsubscribing"
            );
            forwarder.abort();
        }
    }
}
