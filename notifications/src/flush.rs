use crate::debounce::DebounceStore;
use crate::error::Result;
use crate::keys::DebounceKey;
use crate::topic::Notification;
use broker::Broker;
use log::*;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending; nothing was published.
    Empty,
    /// One notification was published to this many live subscribers.
    Published { receivers: usize },
}

/// Drains a pending aggregate into one delivered notification.
#[derive(Clone)]
pub struct FlushEngine {
    broker: Arc<dyn Broker>,
    store: DebounceStore,
}

impl FlushEngine {
    pub fn new(broker: Arc<dyn Broker>, store: DebounceStore) -> Self {
        Self { broker, store }
    }

    /// Reads and clears the pending aggregate for `key` in one atomic step,
    /// then publishes the formatted notification on the user's delivery
    /// channel. Events merged after the drain start a new cycle.
    ///
    /// Publishing is fire-and-forget: with no subscriber listening the
    /// notification is lost.
    pub async fn flush(&self, key: &DebounceKey) -> Result<FlushOutcome> {
        let pending = self.store.take(key).await?;

        let Some(notification) = Notification::from_aggregate(key.topic(), pending) else {
            debug!("Nothing pending for {key}, skipping flush");
            return Ok(FlushOutcome::Empty);
        };

        let payload = serde_json::to_string(&notification)?;
        let receivers = self
            .broker
            .publish(&key.delivery_channel(), &payload)
            .await?;

        if receivers == 0 {
            debug!("Flushed {key} with no live subscribers, notification dropped");
        } else {
            debug!("Flushed {key} to {receivers} subscriber(s)");
        }

        Ok(FlushOutcome::Published { receivers })
    }
}
