//! Real-time notification pipeline.
//!
//! Collapses bursts of backend events into a small number of user-visible
//! pushes and delivers them across every backend instance sharing one broker.
//!
//! # Message Flow
//!
//! 1. A backend component publishes a `DomainEvent` (or calls
//!    `Notifier::queue_event` directly)
//! 2. The event is merged into the pending aggregate for its (user, topic)
//!    pair and, if none is running, a debounce timer key with a TTL of one
//!    debounce window is created with a conditional set
//! 3. Further events inside the window only touch the aggregate
//! 4. When the timer key expires, the broker announces it; every instance's
//!    `ExpiryListener` maps the key back to its (user, topic) pair
//! 5. `FlushEngine` atomically drains the aggregate and publishes one
//!    notification on the user's delivery channel
//! 6. Stream sessions subscribed to that channel relay it to the client
//!
//! # Guarantees
//!
//! - One flush per burst; a rare double-armed timer causes at most one
//!   extra, empty-or-partial flush and never double counting
//! - Best effort: notifications published while no client is connected
//!   are lost, failures are logged and dropped
//!
//! # Modules
//!
//! - `keys`: broker key naming
//! - `topic`: topics, deltas and outbound payloads
//! - `debounce`: pending aggregates, merge functions and timers
//! - `notifier`: `queue_event`, the write entry point
//! - `flush`: drain and publish
//! - `listener`: timer expiry listener with reconnect backoff
//! - `jobs`: job records stored in the broker
//! - `domain_event_handler`: bridge from domain events to `queue_event`
//! - `pipeline`: wires all of the above for one backend instance

pub mod backoff;
pub mod debounce;
pub mod domain_event_handler;
pub mod error;
pub mod flush;
pub mod jobs;
pub mod keys;
pub mod listener;
pub mod notifier;
pub mod pipeline;
pub mod settings;
pub mod topic;

pub use error::{Error, NotificationErrorKind, Result};
pub use flush::{FlushEngine, FlushOutcome};
pub use jobs::{Job, JobStatus, JobStore};
pub use listener::{ExpiryListener, ListenerHandle};
pub use notifier::{Notifier, Queued};
pub use pipeline::Pipeline;
pub use settings::Settings;
pub use topic::{EventDelta, Notification, Topic};
