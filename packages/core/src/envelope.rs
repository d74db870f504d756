use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::event::Event;

/// Transport-facing wrapper around an event.
///
/// Serialization of the payload is the transport's concern; the envelope
/// carries the shared event plus the metadata every transport needs.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Unique id of this transport message (distinct from the event id).
    pub message_id: Uuid,
    pub event_id: Uuid,
    /// Stable event type name, used by consumers to pick a deserializer.
    pub event_type: &'static str,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Free-form transport headers (correlation ids, tenant, etc.).
    pub headers: BTreeMap<String, String>,
    pub event: Arc<dyn Event>,
}

impl Envelope {
    /// Wrap `event` with a fresh message id and no headers.
    #[must_use]
    pub fn new(event: Arc<dyn Event>, created_at_ms: u64) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            event_id: event.event_id(),
            event_type: event.type_name(),
            created_at_ms,
            headers: BTreeMap::new(),
            event,
        }
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping(Uuid);

    impl Event for Ping {
        fn event_id(&self) -> Uuid {
            self.0
        }
    }

    #[test]
    fn new_copies_event_identity() {
        let id = Uuid::new_v4();
        let envelope = Envelope::new(Arc::new(Ping(id)), 1_700_000_000_000)
            .with_header("correlation-id", "abc");

        assert_eq!(envelope.event_id, id);
        assert_ne!(envelope.message_id, id);
        assert!(envelope.event_type.ends_with("Ping"));
        assert_eq!(envelope.created_at_ms, 1_700_000_000_000);
        assert_eq!(envelope.headers.get("correlation-id").map(String::as_str), Some("abc"));
    }
}
