use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope every published event is wrapped in, regardless of which stream
/// it lands on. Consumers deserialize `payload` based on `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Strips the trailing `.vN` version suffix off an event type to get the
/// outbox topic name, e.g. `"order.created.v1"` -> `"order.created"`.
pub fn topic_of(event_type: &str) -> &str {
    match event_type.rfind(".v") {
        Some(idx) if event_type[idx + 2..].chars().all(|c| c.is_ascii_digit()) && idx + 2 < event_type.len() => {
            &event_type[..idx]
        }
        _ => event_type,
    }
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            source: source.into(),
            trace_id: None,
            request_id: None,
            payload,
            meta: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topic_of_strips_version_suffix() {
        assert_eq!(topic_of("order.created.v1"), "order.created");
        assert_eq!(topic_of("inventory.expired.v12"), "inventory.expired");
        assert_eq!(topic_of("no.version"), "no.version");
    }

    #[test]
    fn builder_sets_optional_fields() {
        let envelope = EventEnvelope::new("order.paid", "order-engine", json!({}))
            .with_trace_id("trace-1")
            .with_request_id("req-1");

        assert_eq!(envelope.trace_id.as_deref(), Some("trace-1"));
        assert_eq!(envelope.request_id.as_deref(), Some("req-1"));
    }
}
