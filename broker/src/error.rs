//! Error types for the `broker` crate.
//!
//! Follows the layered pattern used across the workspace: a root `Error`
//! struct holding an `error_kind` plus an optional boxed `source`.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: BrokerErrorKind,
}

/// The kinds of failures a broker operation can report.
#[derive(Debug, PartialEq)]
pub enum BrokerErrorKind {
    /// The broker cannot be reached (connection refused, dropped, timed out).
    Unavailable,
    /// The operation targeted a key holding a different kind of value.
    WrongType,
    /// A stored value could not be interpreted (e.g. a non-integer counter).
    InvalidValue,
    /// A subscriber fell behind and the broker discarded this many messages.
    Lagged(u64),
    Other(String),
}

impl Error {
    pub fn unavailable() -> Self {
        Error {
            source: None,
            error_kind: BrokerErrorKind::Unavailable,
        }
    }

    pub fn wrong_type(key: &str) -> Self {
        Error {
            source: Some(format!("key {key} holds the wrong kind of value").into()),
            error_kind: BrokerErrorKind::WrongType,
        }
    }

    pub fn invalid_value(key: &str, field: &str) -> Self {
        Error {
            source: Some(format!("field {field} of key {key} is not an integer").into()),
            error_kind: BrokerErrorKind::InvalidValue,
        }
    }

    pub fn lagged(skipped: u64) -> Self {
        Error {
            source: None,
            error_kind: BrokerErrorKind::Lagged(skipped),
        }
    }

    /// True for failures that are expected to clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.error_kind,
            BrokerErrorKind::Unavailable | BrokerErrorKind::Lagged(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            BrokerErrorKind::Unavailable => write!(f, "Broker error: unavailable"),
            BrokerErrorKind::Lagged(n) => {
                write!(f, "Broker error: subscriber lagged, {n} messages skipped")
            }
            kind => match &self.source {
                Some(source) => write!(f, "Broker error: {kind:?}: {source}"),
                None => write!(f, "Broker error: {kind:?}"),
            },
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
