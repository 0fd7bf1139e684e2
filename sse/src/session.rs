use crate::message::Event;
use async_stream::stream;
use broker::{Broker, BrokerErrorKind, Subscription};
use futures::{Stream, StreamExt};
use log::*;
use notifications::keys::delivery_channel;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Heartbeat intervals shorter than this are raised to it.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Closed,
}

/// Unique identifier for a stream session (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// One open client connection relaying a user's delivery channel.
///
/// Not shared between connections: a user with two open tabs has two
/// sessions, each with its own subscription.
pub struct StreamSession {
    id: SessionId,
    user_id: String,
    broker: Arc<dyn Broker>,
    heartbeat_interval: Duration,
    shutdown: Option<watch::Receiver<bool>>,
    state: watch::Sender<SessionState>,
}

/// Owns everything that must be released when the session ends, however it
/// ends: normal close, error, or the stream being dropped mid-await because
/// the client went away.
struct SessionGuard {
    id: SessionId,
    user_id: String,
    subscription: Option<Subscription>,
    state: watch::Sender<SessionState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Release the subscription before announcing the close.
        drop(self.subscription.take());
        self.state.send_replace(SessionState::Closed);
        debug!(
            "Stream session {} for user {} closed, subscription released",
            self.id.as_str(),
            self.user_id
        );
    }
}

enum Step {
    Shutdown,
    Heartbeat,
    Received(Option<broker::Result<String>>),
}

impl StreamSession {
    pub fn new(
        user_id: impl Into<String>,
        broker: Arc<dyn Broker>,
        heartbeat_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id: SessionId::new(),
            user_id: user_id.into(),
            broker,
            heartbeat_interval: heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            shutdown: None,
            state,
        }
    }

    /// Ends the session once `shutdown` turns `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Observes state transitions of this session.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Runs the session as a stream of events.
    ///
    /// Subscribes to the user's delivery channel on first poll, then relays
    /// every message and a heartbeat on a fixed interval until the
    /// subscription closes or shutdown is signalled. Dropping the stream
    /// cancels the session immediately, even while it waits for a message.
    pub fn into_stream(self) -> impl Stream<Item = Event> + Send + 'static {
        let StreamSession {
            id,
            user_id,
            broker,
            heartbeat_interval,
            mut shutdown,
            state,
        } = self;

        let mut guard = SessionGuard {
            id,
            user_id,
            subscription: None,
            state,
        };

        stream! {
            let channel = delivery_channel(&guard.user_id);
            match broker.subscribe(&channel).await {
                Ok(subscription) => guard.subscription = Some(subscription),
                Err(e) => {
                    error!(
                        "Stream session {} failed to subscribe to {channel}: {e}",
                        guard.id.as_str()
                    );
                    yield Event::error("Notifications are temporarily unavailable");
                    return;
                }
            }

            guard.state.send_replace(SessionState::Streaming);
            debug!(
                "Stream session {} streaming {channel}",
                guard.id.as_str()
            );

            let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let Some(subscription) = guard.subscription.as_mut() else {
                    break;
                };

                let step = tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => Step::Shutdown,
                    _ = heartbeat.tick() => Step::Heartbeat,
                    item = subscription.next() => Step::Received(item),
                };

                match step {
                    Step::Shutdown => {
                        debug!("Stream session {} ending for shutdown", guard.id.as_str());
                        break;
                    }
                    Step::Heartbeat => yield Event::Heartbeat,
                    Step::Received(Some(Ok(payload))) => {
                        match serde_json::from_str::<Value>(&payload) {
                            Ok(value) => yield Event::Message(value.to_string()),
                            Err(e) => {
                                warn!(
                                    "Stream session {} received a malformed payload: {e}",
                                    guard.id.as_str()
                                );
                                yield Event::error("Received a malformed notification");
                            }
                        }
                    }
                    Step::Received(Some(Err(e))) => {
                        if let BrokerErrorKind::Lagged(skipped) = &e.error_kind {
                            warn!(
                                "Stream session {} lagged, {skipped} notification(s) skipped",
                                guard.id.as_str()
                            );
                        } else {
                            error!("Stream session {} subscription failed: {e}", guard.id.as_str());
                            break;
                        }
                    }
                    Step::Received(None) => {
                        debug!("Delivery channel {channel} closed");
                        break;
                    }
                }
            }

            drop(guard);
        }
    }
}

/// Event stream for a connection that failed authentication: one error event,
/// then the end of the stream. Never touches the broker.
pub fn rejected(message: &str) -> impl Stream<Item = Event> + Send + 'static {
    futures::stream::once(futures::future::ready(Event::error(message)))
}

async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            let sender_dropped = rx.wait_for(|stop| *stop).await.is_err();
            if sender_dropped {
                // Sender gone without signalling: nothing will ever stop us.
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::MemoryBroker;
    use futures::StreamExt;
    use serde_json::json;
    use tokio::time::timeout;

    const HEARTBEAT: Duration = Duration::from_secs(15);
    const CHANNEL: &str = "notify:user:u1";

    fn session(broker: &Arc<MemoryBroker>) -> StreamSession {
        StreamSession::new("u1", broker.clone(), HEARTBEAT)
    }

    /// Polls the stream once so the session subscribes, without consuming an event.
    async fn connect<S: Stream<Item = Event> + Unpin>(stream: &mut S) {
        assert!(timeout(Duration::from_millis(1), stream.next()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_then_disconnect_releases_subscription() {
        let broker = Arc::new(MemoryBroker::new());
        let session = session(&broker);
        let state = session.state();
        assert_eq!(*state.borrow(), SessionState::Connecting);

        let mut stream = Box::pin(session.into_stream());
        connect(&mut stream).await;
        assert_eq!(*state.borrow(), SessionState::Streaming);
        assert_eq!(broker.subscriber_count(CHANNEL).await.unwrap(), 1);

        drop(stream);
        assert_eq!(*state.borrow(), SessionState::Closed);
        assert_eq!(broker.subscriber_count(CHANNEL).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn relays_only_messages_published_after_subscribing() {
        let broker = Arc::new(MemoryBroker::new());
        let mut stream = Box::pin(session(&broker).into_stream());

        broker.publish(CHANNEL, r#"{"n":0}"#).await.unwrap();
        connect(&mut stream).await;
        for n in 1..=3 {
            broker
                .publish(CHANNEL, &json!({ "n": n }).to_string())
                .await
                .unwrap();
        }

        for n in 1..=3 {
            assert_eq!(
                stream.next().await,
                Some(Event::Message(json!({ "n": n }).to_string()))
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_heartbeats_while_idle() {
        let broker = Arc::new(MemoryBroker::new());
        let mut stream = Box::pin(session(&broker).into_stream());
        connect(&mut stream).await;

        assert_eq!(
            timeout(HEARTBEAT * 2, stream.next()).await.unwrap(),
            Some(Event::Heartbeat)
        );
        assert_eq!(
            timeout(HEARTBEAT * 2, stream.next()).await.unwrap(),
            Some(Event::Heartbeat)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_heartbeat_interval_is_raised_to_the_minimum() {
        let broker = Arc::new(MemoryBroker::new());
        let stream = StreamSession::new("u1", broker.clone(), Duration::ZERO).into_stream();

        let session = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            stream.next().await
        });

        assert_eq!(session.await.unwrap(), Some(Event::Heartbeat));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_yields_error_and_keeps_streaming() {
        let broker = Arc::new(MemoryBroker::new());
        let mut stream = Box::pin(session(&broker).into_stream());
        connect(&mut stream).await;

        broker.publish(CHANNEL, "not json").await.unwrap();
        broker.publish(CHANNEL, r#"{"ok":true}"#).await.unwrap();

        assert_eq!(
            stream.next().await,
            Some(Event::error("Received a malformed notification"))
        );
        assert_eq!(
            stream.next().await,
            Some(Event::Message(r#"{"ok":true}"#.to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_the_stream() {
        let broker = Arc::new(MemoryBroker::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let session = session(&broker).with_shutdown(shutdown_rx);
        let state = session.state();
        let mut stream = Box::pin(session.into_stream());
        connect(&mut stream).await;

        shutdown.send(true).unwrap();

        assert_eq!(stream.next().await, None);
        assert_eq!(*state.borrow(), SessionState::Closed);
        assert_eq!(broker.subscriber_count(CHANNEL).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn broker_disconnect_closes_the_session() {
        let broker = Arc::new(MemoryBroker::new());
        let session = session(&broker);
        let state = session.state();
        let mut stream = Box::pin(session.into_stream());
        connect(&mut stream).await;

        broker.disconnect();

        assert_eq!(stream.next().await, None);
        assert_eq!(*state.borrow(), SessionState::Closed);
    }

    #[tokio::test]
    async fn subscribe_failure_yields_single_error() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_available(false);
        let session = session(&broker);
        let state = session.state();

        let events: Vec<Event> = session.into_stream().collect().await;

        assert_eq!(
            events,
            vec![Event::error("Notifications are temporarily unavailable")]
        );
        assert_eq!(*state.borrow(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn every_open_session_of_a_user_receives_messages() {
        let broker = Arc::new(MemoryBroker::new());
        let mut first = Box::pin(session(&broker).into_stream());
        let mut second = Box::pin(session(&broker).into_stream());
        connect(&mut first).await;
        connect(&mut second).await;
        assert_eq!(broker.subscriber_count(CHANNEL).await.unwrap(), 2);

        broker.publish(CHANNEL, r#"{"hello":1}"#).await.unwrap();

        let expected = Some(Event::Message(r#"{"hello":1}"#.to_string()));
        assert_eq!(first.next().await, expected);
        assert_eq!(second.next().await, expected);

        drop(first);
        assert_eq!(broker.subscriber_count(CHANNEL).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejected_stream_is_a_single_error() {
        let events: Vec<Event> = rejected("Unauthorized").collect().await;

        assert_eq!(events, vec![Event::error("Unauthorized")]);
    }
}
