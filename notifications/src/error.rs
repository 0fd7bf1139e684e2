//! Error types for the `notifications` crate.
//!
//! Broker errors are translated into notification error kinds so callers
//! never need to depend on the `broker` crate to decide what to do.

use broker::{BrokerErrorKind, Error as BrokerError};
use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: NotificationErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum NotificationErrorKind {
    /// The broker could not be reached; the operation may succeed later.
    BrokerUnavailable,
    /// The broker rejected the operation.
    Broker,
    /// A user id or topic that cannot form a debounce key.
    InvalidKey,
    UnknownTopic,
    Serialization,
}

impl Error {
    pub fn invalid_key(message: &str) -> Self {
        Error {
            source: Some(message.to_string().into()),
            error_kind: NotificationErrorKind::InvalidKey,
        }
    }

    pub fn unknown_topic(topic: &str) -> Self {
        Error {
            source: Some(format!("unknown topic {topic}").into()),
            error_kind: NotificationErrorKind::UnknownTopic,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Notification error: {:?}: {source}", self.error_kind),
            None => write!(f, "Notification error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<BrokerError> for Error {
    fn from(err: BrokerError) -> Self {
        let error_kind = match err.error_kind {
            BrokerErrorKind::Unavailable => NotificationErrorKind::BrokerUnavailable,
            _ => NotificationErrorKind::Broker,
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: NotificationErrorKind::Serialization,
        }
    }
}
