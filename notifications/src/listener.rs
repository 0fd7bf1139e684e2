//! Process-wide task that turns debounce timer expiries into flushes.
//!
//! Every backend instance runs one listener. Each instance receives every
//! expiry notification through its own subscription, so whichever instance
//! drains the pending aggregate first publishes it and the others find it
//! empty.

use crate::backoff::Backoff;
use crate::flush::{FlushEngine, FlushOutcome};
use crate::keys::DebounceKey;
use broker::{Broker, Subscription};
use futures::StreamExt;
use log::*;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct ExpiryListener {
    broker: Arc<dyn Broker>,
    flush: FlushEngine,
    backoff: Backoff,
}

/// Owns the running listener task. Dropping the handle stops the listener.
pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stops the listener and waits for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Expiry listener task failed: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

enum SubscriptionEnd {
    Closed,
    Shutdown,
}

impl ExpiryListener {
    pub fn new(broker: Arc<dyn Broker>, flush: FlushEngine, backoff: Backoff) -> Self {
        Self {
            broker,
            flush,
            backoff,
        }
    }

    pub fn spawn(self) -> ListenerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        ListenerHandle { shutdown, task }
    }

    /// Subscribes to key expiry notifications and keeps the subscription
    /// alive for the life of the process. A dropped or failed subscription
    /// is re-established after an exponential backoff.
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.broker.subscribe_expired().await {
                Ok(subscription) => {
                    if attempt > 0 {
                        info!("Key expiry subscription re-established after {attempt} failed attempt(s)");
                    } else {
                        info!("Listening for debounce timer expiries");
                    }
                    attempt = 0;

                    match self.consume(subscription, &mut shutdown).await {
                        SubscriptionEnd::Shutdown => break,
                        SubscriptionEnd::Closed => {
                            warn!("Key expiry subscription closed, reconnecting")
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to subscribe to key expiry notifications: {e}");
                }
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!("Retrying key expiry subscription in {}ms", delay.as_millis());

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Expiry listener stopped");
    }

    async fn consume(
        &self,
        mut subscription: Subscription,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SubscriptionEnd {
        loop {
            tokio::select! {
                _ = shutdown.changed() => return SubscriptionEnd::Shutdown,
                item = subscription.next() => match item {
                    Some(Ok(key)) => self.on_expired(&key),
                    Some(Err(e)) => warn!("Key expiry subscription error: {e}"),
                    None => return SubscriptionEnd::Closed,
                },
            }
        }
    }

    fn on_expired(&self, key: &str) {
        let Some(debounce_key) = DebounceKey::from_timer_key(key) else {
            trace!("Ignoring expiry of non-timer key {key}");
            return;
        };

        // Flushes run on their own task so a slow broker round trip never
        // holds up the subscription.
        let flush = self.flush.clone();
        tokio::spawn(async move {
            match flush.flush(&debounce_key).await {
                Ok(FlushOutcome::Published { receivers }) => {
                    trace!("Timer flush for {debounce_key} reached {receivers} subscriber(s)")
                }
                Ok(FlushOutcome::Empty) => {}
                Err(e) => error!("Dropping notification flush for {debounce_key}: {e}"),
            }
        });
    }
}
