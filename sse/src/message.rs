use axum::response::sse::Event as SseEvent;
use serde_json::json;

/// Trait for getting the SSE event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// A single unit emitted on a notification stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A flushed notification, as compact JSON.
    Message(String),
    /// Keep-alive so intermediaries do not tear down an idle stream.
    Heartbeat,
    /// A human readable problem report for this client only.
    Error { message: String },
}

impl EventType for Event {
    fn event_type(&self) -> &'static str {
        match self {
            Event::Message(_) => "message",
            Event::Heartbeat => "heartbeat",
            Event::Error { .. } => "error",
        }
    }
}

impl Event {
    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }

    /// JSON encoded payload carried in the `data` field.
    pub fn data(&self) -> String {
        match self {
            Event::Message(payload) => payload.clone(),
            Event::Heartbeat => json!({"type": "heartbeat"}).to_string(),
            Event::Error { message } => json!({"message": message}).to_string(),
        }
    }

    pub fn into_sse(self) -> SseEvent {
        SseEvent::default()
            .event(self.event_type())
            .data(self.data())
    }
}
