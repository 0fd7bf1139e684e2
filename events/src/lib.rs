//! Event system infrastructure for the feed backend.
//!
//! This crate provides the event system that decouples the components that
//! produce changes (feed-fetch workers, job tracking) from the infrastructure
//! that reacts to them (real-time notifications).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing all business events in the system
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates, avoiding circular
//! dependencies. Identifiers are carried as plain strings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifier of a user as it appears in the authenticated session.
pub type UserId = String;

/// Domain events that represent business-level changes in the system.
///
/// Events include user IDs for notification routing. The producer is
/// responsible for determining which users should be notified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    /// Emitted by the feed-fetch worker after a fetch stored new articles.
    NewArticlesFetched {
        feed_id: String,
        /// Number of articles that were not previously known for this feed.
        new_article_count: u64,
        /// Subscribers of the feed that should see the new articles.
        notify_user_ids: Vec<UserId>,
    },
    /// Emitted whenever a tracked background job changes status.
    JobStatusChanged {
        job_id: String,
        /// Wire name of the new status (`pending`, `running`, `completed`, `failed`).
        status: String,
        /// Usually just the user that started the job.
        notify_user_ids: Vec<UserId>,
    },
}

/// Trait for handling domain events.
/// Implementations can perform side effects like queueing notifications,
/// updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    /// Handlers are expected to log their own failures; one handler's failure
    /// never prevents the remaining handlers from running.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) {
            let name = match event {
                DomainEvent::NewArticlesFetched { feed_id, .. } => feed_id.clone(),
                DomainEvent::JobStatusChanged { job_id, .. } => job_id.clone(),
            };
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, name));
        }
    }

    #[tokio::test]
    async fn publish_calls_handlers_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let publisher = EventPublisher::new()
            .with_handler(Arc::new(Recorder {
                label: "first",
                seen: seen.clone(),
            }))
            .with_handler(Arc::new(Recorder {
                label: "second",
                seen: seen.clone(),
            }));

        publisher
            .publish(DomainEvent::NewArticlesFetched {
                feed_id: "f1".to_string(),
                new_article_count: 3,
                notify_user_ids: vec!["u1".to_string()],
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["first:f1", "second:f1"]);
    }

    #[tokio::test]
    async fn publish_without_handlers_is_a_no_op() {
        EventPublisher::default()
            .publish(DomainEvent::JobStatusChanged {
                job_id: "job-1".to_string(),
                status: "completed".to_string(),
                notify_user_ids: vec![],
            })
            .await;
    }
}
