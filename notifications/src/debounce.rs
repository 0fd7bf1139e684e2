//! Per (user, topic) pending aggregates and their debounce timers.
//!
//! Both live in the broker. The pending aggregate is a hash under the
//! pending key; the timer is a plain key with a TTL of one debounce window
//! whose only job is to produce an expiry notification.

use crate::error::Result;
use crate::keys::DebounceKey;
use crate::topic::EventDelta;
use broker::Broker;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const TIMER_VALUE: &str = "1";

#[derive(Clone)]
pub struct DebounceStore {
    broker: Arc<dyn Broker>,
    window: Duration,
}

impl DebounceStore {
    pub fn new(broker: Arc<dyn Broker>, window: Duration) -> Self {
        Self { broker, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Merges `delta` into the pending aggregate for `key` using the merge
    /// function of the delta's topic.
    pub async fn merge(&self, key: &DebounceKey, delta: &EventDelta) -> Result<()> {
        match delta {
            EventDelta::NewArticles { feed_id, count } => {
                self.merge_new_articles(key, feed_id, *count).await
            }
            EventDelta::JobUpdate { job_id, status } => {
                self.merge_job_update(key, job_id, status).await
            }
        }
    }

    /// `new_articles`: one counter per feed id, added up across deltas.
    /// Associative and commutative, so arrival order never matters. A zero
    /// count still records the feed.
    async fn merge_new_articles(&self, key: &DebounceKey, feed_id: &str, count: u64) -> Result<()> {
        let delta = i64::try_from(count).unwrap_or(i64::MAX);
        self.broker
            .hash_incr_by(&key.pending_key(), feed_id, delta)
            .await?;
        Ok(())
    }

    /// `job_updates`: one status per job id, last write wins. Replaying a
    /// delta leaves the aggregate unchanged.
    async fn merge_job_update(&self, key: &DebounceKey, job_id: &str, status: &str) -> Result<()> {
        self.broker
            .hash_set(&key.pending_key(), job_id, status)
            .await?;
        Ok(())
    }

    /// Arms the debounce timer unless one is already running.
    /// Returns `true` when this call started a new debounce cycle.
    pub async fn arm_timer(&self, key: &DebounceKey) -> Result<bool> {
        Ok(self
            .broker
            .set_nx(&key.timer_key(), TIMER_VALUE, self.window)
            .await?)
    }

    pub async fn timer_armed(&self, key: &DebounceKey) -> Result<bool> {
        Ok(self.broker.exists(&key.timer_key()).await?)
    }

    /// Atomically drains the pending aggregate for `key`.
    pub async fn take(&self, key: &DebounceKey) -> Result<HashMap<String, String>> {
        Ok(self.broker.hash_take(&key.pending_key()).await?)
    }
}
