use crate::notifier::Notifier;
use crate::topic::EventDelta;
use async_trait::async_trait;
use events::{DomainEvent, EventHandler, UserId};
use log::*;

/// Turns domain events into queued notifications for every listed user.
///
/// Queueing failures are logged and dropped: a lost event only means a
/// delayed or missed live update.
pub struct NotificationEventHandler {
    notifier: Notifier,
}

impl NotificationEventHandler {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }

    async fn queue_for_users(&self, delta: EventDelta, user_ids: &[UserId]) {
        for user_id in user_ids {
            if let Err(e) = self.notifier.queue_event(user_id, delta.clone()).await {
                warn!(
                    "Dropping {} notification for user {user_id}: {e}",
                    delta.topic()
                );
            }
        }
    }
}

#[async_trait]
impl EventHandler for NotificationEventHandler {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::NewArticlesFetched {
                feed_id,
                new_article_count,
                notify_user_ids,
            } => {
                debug!(
                    "Handling NewArticlesFetched for feed {feed_id} ({new_article_count} new)"
                );
                let delta = EventDelta::NewArticles {
                    feed_id: feed_id.clone(),
                    count: *new_article_count,
                };
                self.queue_for_users(delta, notify_user_ids).await;
            }

            DomainEvent::JobStatusChanged {
                job_id,
                status,
                notify_user_ids,
            } => {
                debug!("Handling JobStatusChanged for job {job_id} ({status})");
                let delta = EventDelta::JobUpdate {
                    job_id: job_id.clone(),
                    status: status.clone(),
                };
                self.queue_for_users(delta, notify_user_ids).await;
            }
        }
    }
}
