//! Wire schema for every event the commerce transactional core publishes.
//!
//! Every event leaves the system wrapped in the same [`EventEnvelope`]; the
//! catalog in [`events`] defines what can ride inside `payload`. Consumers
//! match on `event_type` and deserialize `payload` into the matching struct.

pub mod envelope;
pub mod events;

pub use envelope::{topic_of, EventEnvelope};
pub use events::*;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = EventEnvelope::new(
            "order.created",
            "order-engine",
            json!({"order_id": "11111111-1111-1111-1111-111111111111"}),
        );

        let encoded = serde_json::to_string(&envelope).unwrap();
        let decoded: EventEnvelope = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.event_type, "order.created");
        assert_eq!(decoded.source, "order-engine");
    }
}
