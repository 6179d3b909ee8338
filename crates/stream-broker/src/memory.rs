use async_trait::async_trait;
use event_schema::EventEnvelope;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{stream_key, BrokerMessage, ConsumerGroupOffsets, StreamBroker};

struct Entry {
    id: String,
    event: EventEnvelope,
}

/// In-process fake broker for tests. Each topic is an append-only `Vec`;
/// each `(group, topic)` pair tracks its own read offset so independent
/// consumer groups see every message, matching Redis Streams semantics.
#[derive(Default)]
pub struct InMemoryStreamBroker {
    streams: Mutex<HashMap<String, Vec<Entry>>>,
    offsets: Mutex<ConsumerGroupOffsets>,
    next_id: Mutex<u64>,
}

impl InMemoryStreamBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamBroker for InMemoryStreamBroker {
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> anyhow::Result<String> {
        let key = stream_key(topic);
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = format!("{}-0", *next_id);

        self.streams
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push(Entry {
                id: id.clone(),
                event: event.clone(),
            });

        Ok(id)
    }

    async fn consume(
        &self,
        topic: &str,
        group: &str,
        _consumer: &str,
        max_messages: usize,
    ) -> anyhow::Result<Vec<BrokerMessage>> {
        let key = stream_key(topic);
        let streams = self.streams.lock().unwrap();
        let entries = match streams.get(&key) {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };

        let mut offsets = self.offsets.lock().unwrap();
        let offset = offsets.entry((key.clone(), group.to_string())).or_insert(0);

        let messages = entries[*offset..]
            .iter()
            .take(max_messages)
            .map(|e| BrokerMessage {
                message_id: e.id.clone(),
                event: e.event.clone(),
            })
            .collect::<Vec<_>>();

        *offset += messages.len();
        Ok(messages)
    }

    async fn ack(&self, _topic: &str, _group: &str, _message_ids: &[String]) -> anyhow::Result<()> {
        // Offset already advanced on consume; acknowledgment is a no-op for
        // the in-memory fake since there is no separate pending-entries list.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn independent_consumer_groups_each_see_every_message() {
        let broker = InMemoryStreamBroker::new();
        let event = EventEnvelope::new("order.created.v1", "order-engine", json!({}));
        broker.publish("order.created", &event).await.unwrap();

        let a = broker
            .consume("order.created", "group-a", "c1", 10)
            .await
            .unwrap();
        let b = broker
            .consume("order.created", "group-b", "c1", 10)
            .await
            .unwrap();

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);

        let again = broker
            .consume("order.created", "group-a", "c1", 10)
            .await
            .unwrap();
        assert!(again.is_empty(), "group-a already consumed this message");
    }
}
