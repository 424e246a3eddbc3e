//! Processor event records for webhook idempotency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local dedupe record for one inbound webhook delivery.
///
/// Keyed by the processor-assigned event id. Each event is handled at most
/// once to completion; replays after `processed` is set are no-ops that
/// still acknowledge success to the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorEvent {
    /// Processor-assigned event id (primary idempotency key).
    pub event_id: String,

    /// Event type string (e.g. "payment_intent.succeeded").
    pub event_type: String,

    /// Whether dispatch for this event has completed.
    pub processed: bool,

    /// Raw event payload, retained for audit and manual replay.
    pub payload: serde_json::Value,

    /// When the event was first received.
    pub received_at: DateTime<Utc>,

    /// When the event was marked processed.
    pub processed_at: Option<DateTime<Utc>>,
}

impl ProcessorEvent {
    /// Create a new unprocessed event record.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed: false,
            payload,
            received_at: Utc::now(),
            processed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_is_unprocessed() {
        let event = ProcessorEvent::new(
            "evt_1",
            "payment_intent.succeeded",
            serde_json::json!({"id": "pi_1"}),
        );
        assert!(!event.processed);
        assert!(event.processed_at.is_none());
        assert_eq!(event.event_id, "evt_1");
    }
}
