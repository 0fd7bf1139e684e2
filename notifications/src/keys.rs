//! Broker key naming for the notification pipeline.
//!
//! Every key is a fixed category prefix followed by `<topic>:<user_id>` so
//! an expiry notification can be mapped back to its debounce key. Topic
//! names never contain `:`; user ids may.

use crate::error::{Error, Result};
use crate::topic::Topic;
use std::fmt;

pub const TIMER_PREFIX: &str = "notify:timer:";
pub const PENDING_PREFIX: &str = "notify:pending:";
pub const CHANNEL_PREFIX: &str = "notify:user:";
pub const JOB_PREFIX: &str = "job:";

/// Identifies one debounce cycle target: a user and a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    user_id: String,
    topic: Topic,
}

impl DebounceKey {
    pub fn new(user_id: impl Into<String>, topic: Topic) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(Error::invalid_key("user id must not be empty"));
        }
        Ok(Self { user_id, topic })
    }

    /// Recovers the debounce key from an expired timer key. Returns `None`
    /// for keys of any other category or with an unknown topic.
    pub fn from_timer_key(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(TIMER_PREFIX)?;
        let (topic, user_id) = rest.split_once(':')?;
        let topic = topic.parse().ok()?;
        Self::new(user_id, topic).ok()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn timer_key(&self) -> String {
        format!("{TIMER_PREFIX}{}:{}", self.topic, self.user_id)
    }

    pub fn pending_key(&self) -> String {
        format!("{PENDING_PREFIX}{}:{}", self.topic, self.user_id)
    }

    pub fn delivery_channel(&self) -> String {
        delivery_channel(&self.user_id)
    }
}

impl fmt::Display for DebounceKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.topic)
    }
}

/// The pub/sub channel carrying flushed notifications for one user.
pub fn delivery_channel(user_id: &str) -> String {
    format!("{CHANNEL_PREFIX}{user_id}")
}

pub fn job_key(job_id: &str) -> String {
    format!("{JOB_PREFIX}{job_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_keys_round_trip() {
        let key = DebounceKey::new("u1", Topic::NewArticles).unwrap();

        assert_eq!(key.timer_key(), "notify:timer:new_articles:u1");
        assert_eq!(key.pending_key(), "notify:pending:new_articles:u1");
        assert_eq!(DebounceKey::from_timer_key(&key.timer_key()), Some(key));
    }

    #[test]
    fn user_ids_may_contain_colons() {
        let key = DebounceKey::new("tenant:42", Topic::JobUpdates).unwrap();

        let parsed = DebounceKey::from_timer_key(&key.timer_key()).unwrap();
        assert_eq!(parsed.user_id(), "tenant:42");
        assert_eq!(parsed.topic(), Topic::JobUpdates);
    }

    #[test]
    fn foreign_keys_are_not_timer_keys() {
        assert_eq!(DebounceKey::from_timer_key("job:job-x"), None);
        assert_eq!(
            DebounceKey::from_timer_key("notify:pending:new_articles:u1"),
            None
        );
        assert_eq!(DebounceKey::from_timer_key("notify:timer:bogus:u1"), None);
        assert_eq!(DebounceKey::from_timer_key("notify:timer:new_articles:"), None);
        assert_eq!(DebounceKey::from_timer_key("notify:timer:new_articles"), None);
    }

    #[test]
    fn empty_user_id_is_rejected() {
        assert!(DebounceKey::new("", Topic::NewArticles).is_err());
    }

    #[test]
    fn channel_and_job_keys() {
        assert_eq!(delivery_channel("u1"), "notify:user:u1");
        assert_eq!(job_key("job-x"), "job:job-x");
    }
}
