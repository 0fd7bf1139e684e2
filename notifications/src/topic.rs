//! Notification topics, the deltas queued under them and the payloads
//! delivered when a topic is flushed.

use crate::error::Error;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// A logical notification category. Together with a user id it forms the
/// debounce key. Wire names never contain `:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    NewArticles,
    JobUpdates,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::NewArticles, Topic::JobUpdates];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::NewArticles => "new_articles",
            Topic::JobUpdates => "job_updates",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == value)
            .ok_or_else(|| Error::unknown_topic(value))
    }
}

/// A single change queued for a user. The topic is implied by the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDelta {
    /// `count` new articles arrived for `feed_id`.
    NewArticles { feed_id: String, count: u64 },
    /// The tracked job `job_id` moved to `status`.
    JobUpdate { job_id: String, status: String },
}

impl EventDelta {
    pub fn topic(&self) -> Topic {
        match self {
            EventDelta::NewArticles { .. } => Topic::NewArticles,
            EventDelta::JobUpdate { .. } => Topic::JobUpdates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub job_id: String,
    pub status: String,
}

/// The single event delivered to a user when a topic is flushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    NewArticles { feeds: Vec<String>, count: u64 },
    JobUpdates { jobs: Vec<JobUpdate> },
}

impl Notification {
    /// Builds the outbound payload from drained pending-aggregate fields.
    /// Returns `None` when nothing usable was pending.
    pub fn from_aggregate(topic: Topic, fields: HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }

        match topic {
            Topic::NewArticles => {
                let mut feeds = BTreeMap::new();
                for (feed_id, raw) in fields {
                    match raw.parse::<u64>() {
                        Ok(count) => {
                            feeds.insert(feed_id, count);
                        }
                        Err(_) => warn!("Dropping pending count {raw:?} for feed {feed_id}"),
                    }
                }
                if feeds.is_empty() {
                    return None;
                }
                let count = feeds.values().fold(0u64, |sum, n| sum.saturating_add(*n));
                Some(Notification::NewArticles {
                    feeds: feeds.into_keys().collect(),
                    count,
                })
            }
            Topic::JobUpdates => {
                let jobs = fields
                    .into_iter()
                    .collect::<BTreeMap<_, _>>()
                    .into_iter()
                    .map(|(job_id, status)| JobUpdate { job_id, status })
                    .collect();
                Some(Notification::JobUpdates { jobs })
            }
        }
    }

    pub fn topic(&self) -> Topic {
        match self {
            Notification::NewArticles { .. } => Topic::NewArticles,
            Notification::JobUpdates { .. } => Topic::JobUpdates,
        }
    }
}
