//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the notification stream.
//! The session state machine and event types live in the `sse` crate.

pub mod handler;
