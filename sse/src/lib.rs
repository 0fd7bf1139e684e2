//! Server-Sent Events (SSE) delivery of real-time notifications.
//!
//! This crate turns a user's broker delivery channel into a long-lived
//! event stream for one client connection.
//!
//! # Architecture
//!
//! - **One session per connection**: every open connection gets its own
//!   `StreamSession` with its own broker subscription. Two tabs, two
//!   sessions; the broker fans out to both.
//! - **No local registry**: routing is done by the broker's per-user
//!   channels, so the instance holding the connection does not need to be
//!   the one that flushed the notification.
//! - **Ephemeral messages**: anything published while a user has no open
//!   session is lost; clients refetch state when they reconnect.
//!
//! # Session lifecycle
//!
//! 1. `CONNECTING`: subscribe to `notify:user:<user_id>`
//! 2. `STREAMING`: relay messages, emit a heartbeat on a fixed interval
//! 3. `CLOSED`: client went away, subscription ended or shutdown was
//!    signalled; the subscription is released on every path
//!
//! Unauthenticated connections never reach `CONNECTING`: they get a single
//! `error` event from `session::rejected` and the stream ends.
//!
//! # Modules
//!
//! - `message`: Event names and JSON payloads emitted to clients
//! - `session`: The `StreamSession` state machine

pub mod message;
pub mod session;

pub use message::{Event, EventType};
pub use session::{rejected, SessionId, SessionState, StreamSession};
