use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

// ============================================================================
// Event Envelope
// ============================================================================
//
// Wraps domain events with the metadata stored next to them in the event log.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,

    pub event_type: String,
    pub event_version: i32,

    pub event_data: E,

    /// Groups every event emitted by one command invocation
    pub correlation_id: Uuid,

    pub timestamp: DateTime<Utc>,

    pub metadata: HashMap<String, String>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_version: E::event_version(),
            event_data,
            correlation_id,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Wrap a batch of freshly emitted events, numbering them after `current_version`.
pub fn envelope_all<E: DomainEvent>(
    aggregate_id: Uuid,
    current_version: i64,
    events: Vec<E>,
    correlation_id: Uuid,
) -> Vec<EventEnvelope<E>> {
    events
        .into_iter()
        .zip(current_version + 1..)
        .map(|(event, seq)| EventEnvelope::new(aggregate_id, seq, event, correlation_id))
        .collect()
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// All domain events must implement this trait to be stored in the event log.
pub trait DomainEvent: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    /// Name of the concrete event, e.g. `OrderFinalized`
    fn event_type(&self) -> &'static str;

    fn event_version() -> i32 where Self: Sized { 1 }
}
