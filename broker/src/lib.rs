//! Shared key-value and pub/sub broker used to coordinate backend instances.
//!
//! Every backend process talks to the same broker. Correctness of the
//! notification pipeline depends only on the atomic primitives exposed
//! here (conditional set, atomic hash read-and-delete), never on
//! process-local locks.
//!
//! # Modules
//!
//! - `error`: Broker error type and kinds
//! - `memory`: `MemoryBroker`, an in-process implementation backed by DashMap
//!   and tokio broadcast channels

use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

pub mod error;
pub mod memory;

pub use error::{BrokerErrorKind, Error};
pub use memory::MemoryBroker;

pub type Result<T> = core::result::Result<T, Error>;

/// Narrow interface to the shared broker.
///
/// Hash operations mirror the semantics of a Redis hash: mutating a field
/// keeps the key's existing TTL, and a missing key behaves like an empty hash.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditionally stores `value`. `ttl` replaces any previous expiry;
    /// `None` makes the key persistent.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Stores `value` with `ttl` only if `key` does not exist.
    /// Returns `true` when this call created the key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically adds `delta` to an integer hash field, returning the new value.
    async fn hash_incr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Atomically overwrites a single hash field.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Atomically reads every field of a hash and deletes the key.
    async fn hash_take(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Publishes to every current subscriber of `channel` and returns how many
    /// received the message. Nothing is retained for later subscribers.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize>;

    /// Subscribes to `channel`. Only messages published after this returns are
    /// delivered.
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;

    /// Subscribes to the names of keys that expire after this returns.
    async fn subscribe_expired(&self) -> Result<Subscription>;

    async fn subscriber_count(&self, channel: &str) -> Result<usize>;
}

type MessageStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A live subscription. The stream ends when the broker connection closes;
/// dropping it releases the subscription.
pub struct Subscription {
    channel: String,
    messages: MessageStream,
}

impl Subscription {
    pub fn new<S>(channel: impl Into<String>, messages: S) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            channel: channel.into(),
            messages: Box::pin(messages),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Stream for Subscription {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().messages.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
