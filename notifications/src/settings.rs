use crate::backoff::Backoff;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(5);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(60 * 60);

/// Tunables for the notification pipeline.
///
/// Built from the service configuration at startup; library code only ever
/// sees this plain struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// How long events for one (user, topic) pair are merged before a flush.
    pub debounce_window: Duration,
    /// Interval between keep-alive events on an open stream.
    pub heartbeat_interval: Duration,
    /// Lifetime of a job record after its last update.
    pub job_ttl: Duration,
    /// Reconnect policy of the key expiry listener.
    pub listener_backoff: Backoff,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            job_ttl: DEFAULT_JOB_TTL,
            listener_backoff: Backoff::default(),
        }
    }
}
