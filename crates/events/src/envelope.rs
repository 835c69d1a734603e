use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use careledger_core::{AggregateId, OrganizationId};

use crate::event::Event;

/// Envelope for an event, containing organization + stream metadata.
///
/// Notes:
/// - **Ownership** is carried here via `organization_id`; consumers must filter on it.
/// - `sequence_number` is the aggregate version reached by applying this event.
/// - `payload` is the typed event (or its JSON form once it leaves the process).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    organization_id: OrganizationId,

    aggregate_id: AggregateId,
    aggregate_type: String,
    sequence_number: u64,

    event_type: String,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: Uuid,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            organization_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, taking its type name and business time from the event itself.
    pub fn wrap(
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event: E,
    ) -> Self {
        Self::new(
            Uuid::now_v7(),
            organization_id,
            aggregate_id,
            aggregate_type,
            sequence_number,
            event.event_type(),
            event.occurred_at(),
            event,
        )
    }
}

impl<E: Serialize> EventEnvelope<E> {
    /// Convert into a JSON-payload envelope for transports outside the process.
    pub fn to_json(&self) -> Result<EventEnvelope<serde_json::Value>, serde_json::Error> {
        Ok(EventEnvelope {
            event_id: self.event_id,
            organization_id: self.organization_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type.clone(),
            sequence_number: self.sequence_number,
            event_type: self.event_type.clone(),
            occurred_at: self.occurred_at,
            payload: serde_json::to_value(&self.payload)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Pinged {
        at: DateTime<Utc>,
    }

    impl Event for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn wrap_copies_event_metadata() {
        let at = Utc::now();
        let org = OrganizationId::new();
        let env = EventEnvelope::wrap(org, AggregateId::new(), "test.thing", 3, Pinged { at });

        assert_eq!(env.organization_id(), org);
        assert_eq!(env.event_type(), "test.pinged");
        assert_eq!(env.occurred_at(), at);
        assert_eq!(env.sequence_number(), 3);

        let json = env.to_json().unwrap();
        assert!(json.payload().get("at").is_some());
    }
}
