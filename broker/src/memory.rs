use crate::{Broker, Error, Result, Subscription};
use async_stream::stream;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use log::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

/// Name reported by subscriptions to the expired-key channel.
pub const EXPIRED_CHANNEL: &str = "__keyevent__:expired";

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug)]
enum Value {
    String(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    /// Bumped on every write that (re)sets the TTL so stale expiry timers
    /// cannot remove a newer value.
    generation: u64,
}

struct Inner {
    keys: DashMap<String, Entry>,
    channels: DashMap<String, broadcast::Sender<String>>,
    expired: RwLock<broadcast::Sender<String>>,
    generation: AtomicU64,
    available: AtomicBool,
    capacity: usize,
}

impl Inner {
    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn expired_sender(&self) -> broadcast::Sender<String> {
        self.expired
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn expire(&self, key: &str, generation: u64) {
        if self
            .keys
            .remove_if(key, |_, entry| entry.generation == generation)
            .is_some()
        {
            trace!("Key {key} expired");
            // No listeners is fine, the notification is simply lost.
            let _ = self.expired_sender().send(key.to_string());
        }
    }
}

/// In-process broker with TTLs, expiry notifications and pub/sub channels.
///
/// Cloning is cheap and every clone shares the same state, so one
/// `MemoryBroker` can stand in for the shared store of several simulated
/// backend instances.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_channel_capacity(capacity: usize) -> Self {
        let (expired, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                keys: DashMap::new(),
                channels: DashMap::new(),
                expired: RwLock::new(expired),
                generation: AtomicU64::new(0),
                available: AtomicBool::new(true),
                capacity,
            }),
        }
    }

    /// Closes every live subscription, as if the connection to the broker
    /// dropped. Stored keys survive and new subscriptions work immediately.
    pub fn disconnect(&self) {
        warn!(
            "Dropping all broker subscriptions on {} channel(s)",
            self.channel_count()
        );
        self.inner.channels.clear();
        let (fresh, _) = broadcast::channel(self.inner.capacity);
        *self
            .inner
            .expired
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh;
    }

    /// Number of pub/sub channels that currently have a subscriber.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    /// While `false`, every operation fails with `BrokerErrorKind::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unavailable())
        }
    }

    fn schedule_expiry(&self, key: &str, generation: u64, ttl: Duration) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(&key, generation);
            }
        });
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a pub/sub channel. When the last receiver of a channel
/// goes away its sender is removed, so channels of users who disconnected
/// do not pile up.
struct ChannelReceiver {
    rx: Option<broadcast::Receiver<String>>,
    channel: String,
    inner: Option<Weak<Inner>>,
}

impl Drop for ChannelReceiver {
    fn drop(&mut self) {
        // The receiver must be gone before the count is checked.
        drop(self.rx.take());
        if let Some(inner) = self.inner.as_ref().and_then(Weak::upgrade) {
            if inner
                .channels
                .remove_if(&self.channel, |_, sender| sender.receiver_count() == 0)
                .is_some()
            {
                trace!("Removed channel {} with no subscribers", self.channel);
            }
        }
    }
}

fn receiver_stream(
    mut receiver: ChannelReceiver,
) -> impl futures::Stream<Item = Result<String>> + Send + 'static {
    stream! {
        loop {
            let Some(rx) = receiver.rx.as_mut() else {
                break;
            };
            match rx.recv().await {
                Ok(message) => yield Ok(message),
                Err(RecvError::Lagged(skipped)) => yield Err(Error::lagged(skipped)),
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        match self.inner.keys.get(key) {
            Some(entry) => match &entry.value {
                Value::String(value) => Ok(Some(value.clone())),
                Value::Hash(_) => Err(Error::wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.check_available()?;
        let generation = self.inner.next_generation();
        self.inner.keys.insert(
            key.to_string(),
            Entry {
                value: Value::String(value.to_string()),
                generation,
            },
        );
        if let Some(ttl) = ttl {
            self.schedule_expiry(key, generation, ttl);
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let generation = match self.inner.keys.entry(key.to_string()) {
            MapEntry::Occupied(_) => return Ok(false),
            MapEntry::Vacant(vacant) => {
                let generation = self.inner.next_generation();
                vacant.insert(Entry {
                    value: Value::String(value.to_string()),
                    generation,
                });
                generation
            }
        };
        self.schedule_expiry(key, generation, ttl);
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.inner.keys.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.inner.keys.remove(key).is_some())
    }

    async fn hash_incr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.check_available()?;
        let generation = self.inner.next_generation();
        let mut entry = self
            .inner
            .keys
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                generation,
            });
        let Value::Hash(fields) = &mut entry.value else {
            return Err(Error::wrong_type(key));
        };
        let current = match fields.get(field) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| Error::invalid_value(key, field))?,
            None => 0,
        };
        let updated = current.saturating_add(delta);
        fields.insert(field.to_string(), updated.to_string());
        Ok(updated)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.check_available()?;
        let generation = self.inner.next_generation();
        let mut entry = self
            .inner
            .keys
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                value: Value::Hash(HashMap::new()),
                generation,
            });
        let Value::Hash(fields) = &mut entry.value else {
            return Err(Error::wrong_type(key));
        };
        fields.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_take(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check_available()?;
        match self
            .inner
            .keys
            .remove_if(key, |_, entry| matches!(entry.value, Value::Hash(_)))
        {
            Some((_, Entry {
                value: Value::Hash(fields),
                ..
            })) => Ok(fields),
            Some(_) => Err(Error::wrong_type(key)),
            None if self.inner.keys.contains_key(key) => Err(Error::wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        self.check_available()?;
        let receivers = match self.inner.channels.get(channel) {
            Some(sender) => sender.send(payload.to_string()).unwrap_or(0),
            None => 0,
        };
        trace!("Published to {channel}, {receivers} receiver(s)");
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        self.check_available()?;
        let rx = self
            .inner
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe();
        let receiver = ChannelReceiver {
            rx: Some(rx),
            channel: channel.to_string(),
            inner: Some(Arc::downgrade(&self.inner)),
        };
        Ok(Subscription::new(channel, receiver_stream(receiver)))
    }

    async fn subscribe_expired(&self) -> Result<Subscription> {
        self.check_available()?;
        let receiver = ChannelReceiver {
            rx: Some(self.inner.expired_sender().subscribe()),
            channel: EXPIRED_CHANNEL.to_string(),
            inner: None,
        };
        Ok(Subscription::new(EXPIRED_CHANNEL, receiver_stream(receiver)))
    }

    async fn subscriber_count(&self, channel: &str) -> Result<usize> {
        self.check_available()?;
        if channel == EXPIRED_CHANNEL {
            return Ok(self.inner.expired_sender().receiver_count());
        }
        Ok(self
            .inner
            .channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BrokerErrorKind;
    use futures::StreamExt;

    #[tokio::test]
    async fn set_nx_only_writes_absent_keys() {
        let broker = MemoryBroker::new();

        assert!(broker.set_nx("k", "1", Duration::from_secs(5)).await.unwrap());
        assert!(!broker.set_nx("k", "2", Duration::from_secs(5)).await.unwrap());
        assert_eq!(broker.get("k").await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_are_removed_and_announced() {
        let broker = MemoryBroker::new();
        let mut expired = broker.subscribe_expired().await.unwrap();

        broker.set_nx("timer", "1", Duration::from_secs(2)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(broker.exists("timer").await.unwrap());

        assert_eq!(expired.next().await.unwrap().unwrap(), "timer");
        assert!(!broker.exists("timer").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn overwritten_key_does_not_fire_stale_expiry() {
        let broker = MemoryBroker::new();

        broker.set("k", "old", Some(Duration::from_secs(1))).await.unwrap();
        broker.set("k", "new", None).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(broker.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn hash_take_reads_and_clears() {
        let broker = MemoryBroker::new();

        assert_eq!(broker.hash_incr_by("h", "f1", 1).await.unwrap(), 1);
        assert_eq!(broker.hash_incr_by("h", "f1", 2).await.unwrap(), 3);
        broker.hash_set("h", "f2", "x").await.unwrap();

        let fields = broker.hash_take("h").await.unwrap();
        assert_eq!(fields.get("f1").map(String::as_str), Some("3"));
        assert_eq!(fields.get("f2").map(String::as_str), Some("x"));
        assert!(broker.hash_take("h").await.unwrap().is_empty());
        assert!(!broker.exists("h").await.unwrap());
    }

    #[tokio::test]
    async fn hash_ops_reject_string_keys() {
        let broker = MemoryBroker::new();
        broker.set("s", "v", None).await.unwrap();

        let err = broker.hash_incr_by("s", "f", 1).await.unwrap_err();
        assert_eq!(err.error_kind, BrokerErrorKind::WrongType);
        let err = broker.hash_take("s").await.unwrap_err();
        assert_eq!(err.error_kind, BrokerErrorKind::WrongType);
        assert!(broker.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_lost() {
        let broker = MemoryBroker::new();

        assert_eq!(broker.publish("ch", "early").await.unwrap(), 0);

        let mut sub = broker.subscribe("ch").await.unwrap();
        assert_eq!(broker.publish("ch", "late").await.unwrap(), 1);
        assert_eq!(sub.next().await.unwrap().unwrap(), "late");
    }

    #[tokio::test]
    async fn dropping_subscription_releases_it() {
        let broker = MemoryBroker::new();

        let first = broker.subscribe("ch").await.unwrap();
        let second = broker.subscribe("ch").await.unwrap();
        assert_eq!(broker.subscriber_count("ch").await.unwrap(), 2);

        drop(first);
        assert_eq!(broker.subscriber_count("ch").await.unwrap(), 1);
        drop(second);
        assert_eq!(broker.subscriber_count("ch").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn channels_are_removed_with_their_last_subscriber() {
        let broker = MemoryBroker::new();

        for n in 0..100 {
            let sub = broker.subscribe(&format!("notify:user:u{n}")).await.unwrap();
            drop(sub);
        }
        assert_eq!(broker.channel_count(), 0);

        let first = broker.subscribe("ch").await.unwrap();
        let second = broker.subscribe("ch").await.unwrap();
        drop(first);
        assert_eq!(broker.channel_count(), 1);
        assert_eq!(broker.publish("ch", "still here").await.unwrap(), 1);
        drop(second);
        assert_eq!(broker.channel_count(), 0);
    }

    #[tokio::test]
    async fn publishing_does_not_create_channels() {
        let broker = MemoryBroker::new();

        assert_eq!(broker.publish("ch", "lost").await.unwrap(), 0);
        assert_eq!(broker.channel_count(), 0);
    }

    #[tokio::test]
    async fn expired_channel_subscribers_are_counted() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.subscriber_count(EXPIRED_CHANNEL).await.unwrap(), 0);

        let sub = broker.subscribe_expired().await.unwrap();
        assert_eq!(sub.channel(), EXPIRED_CHANNEL);
        assert_eq!(broker.subscriber_count(EXPIRED_CHANNEL).await.unwrap(), 1);

        broker.disconnect();
        assert_eq!(broker.subscriber_count(EXPIRED_CHANNEL).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disconnect_ends_subscriptions() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("ch").await.unwrap();
        let mut expired = broker.subscribe_expired().await.unwrap();

        broker.disconnect();

        assert!(sub.next().await.is_none());
        assert!(expired.next().await.is_none());
        assert!(broker.subscribe("ch").await.is_ok());
    }

    #[tokio::test]
    async fn unavailable_broker_rejects_operations() {
        let broker = MemoryBroker::new();
        broker.set_available(false);

        let err = broker.get("k").await.unwrap_err();
        assert_eq!(err.error_kind, BrokerErrorKind::Unavailable);
        assert!(err.is_transient());
        assert!(broker.subscribe_expired().await.is_err());

        broker.set_available(true);
        assert!(broker.get("k").await.unwrap().is_none());
    }
}
