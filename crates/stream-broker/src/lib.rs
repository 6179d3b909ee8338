//! Stream Broker: a per-topic ordered, append-only log with consumer-group
//! fan-out. Backed by Redis Streams, since that is the transport this
//! workspace already carries for the task queue and rate limiting.
//!
//! No ordering guarantee crosses topics, and delivery is at-least-once —
//! callers on the read side dedupe using `event_id`
//! (see `idempotent-consumer`).

use async_trait::async_trait;
use event_schema::EventEnvelope;
use redis_utils::streams::{self, StreamEntry};
use redis_utils::SharedConnectionManager;
use resilience::{presets, CircuitBreaker, CircuitBreakerError};
use std::collections::HashMap;
use tracing::{debug, warn};
use transactional_outbox::{OutboxError, OutboxPublisher, OutboxResult};

mod memory;
pub use memory::InMemoryStreamBroker;

/// A message read off the broker, not yet acknowledged.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub message_id: String,
    pub event: EventEnvelope,
}

/// The Stream Broker collaborator contract (§4.2): write returns a
/// broker-assigned monotonic id, read happens through a consumer group,
/// and acknowledgment is a separate step so a crash between the two
/// redelivers the message rather than losing it.
#[async_trait]
pub trait StreamBroker: Send + Sync {
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> anyhow::Result<String>;

    async fn consume(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        max_messages: usize,
    ) -> anyhow::Result<Vec<BrokerMessage>>;

    async fn ack(&self, topic: &str, group: &str, message_ids: &[String]) -> anyhow::Result<()>;
}

pub(crate) fn stream_key(topic: &str) -> String {
    format!("events:{topic}")
}

fn map_breaker_err(e: CircuitBreakerError) -> anyhow::Error {
    match e {
        CircuitBreakerError::Open => anyhow::anyhow!("stream broker circuit open"),
        CircuitBreakerError::CallFailed(message) => anyhow::anyhow!(message),
    }
}

/// Redis Streams implementation. One stream per topic, named `events:{topic}`.
pub struct RedisStreamBroker {
    manager: SharedConnectionManager,
    max_stream_len: usize,
    breaker: CircuitBreaker,
}

impl RedisStreamBroker {
    pub fn new(manager: SharedConnectionManager) -> Self {
        Self {
            manager,
            max_stream_len: 100_000,
            breaker: CircuitBreaker::new(presets::stream_broker_config().circuit_breaker),
        }
    }

    pub fn with_max_stream_len(mut self, max_stream_len: usize) -> Self {
        self.max_stream_len = max_stream_len;
        self
    }

    fn decode(entry: &StreamEntry) -> anyhow::Result<EventEnvelope> {
        let payload = entry
            .fields
            .get("payload")
            .ok_or_else(|| anyhow::anyhow!("stream entry {} missing payload field", entry.id))?;
        Ok(serde_json::from_str(payload)?)
    }
}

#[async_trait]
impl StreamBroker for RedisStreamBroker {
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> anyhow::Result<String> {
        let key = stream_key(topic);
        let payload = serde_json::to_string(event)?;

        let id = self
            .breaker
            .call(|| async {
                let mut conn = self.manager.lock().await;
                let id = streams::append_fields(
                    &mut conn,
                    &key,
                    &[
                        ("event_id", event.event_id.to_string().as_str()),
                        ("event_type", event.event_type.as_str()),
                        ("payload", payload.as_str()),
                    ],
                )
                .await?;
                streams::trim_approx(&mut conn, &key, self.max_stream_len).await?;
                Ok::<_, anyhow::Error>(id)
            })
            .await
            .map_err(map_breaker_err)?;

        debug!(%topic, message_id = %id, event_id = %event.event_id, "published to stream broker");
        Ok(id)
    }

    async fn consume(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        max_messages: usize,
    ) -> anyhow::Result<Vec<BrokerMessage>> {
        let key = stream_key(topic);

        let entries = self
            .breaker
            .call(|| async {
                let mut conn = self.manager.lock().await;
                streams::ensure_group(&mut conn, &key, group).await?;
                streams::read_group(&mut conn, &key, group, consumer, max_messages, 5_000).await
            })
            .await
            .map_err(map_breaker_err)?;

        let mut messages = Vec::with_capacity(entries.len());
        for entry in &entries {
            match Self::decode(entry) {
                Ok(event) => messages.push(BrokerMessage {
                    message_id: entry.id.clone(),
                    event,
                }),
                Err(e) => warn!(message_id = %entry.id, error = %e, "dropping undecodable stream entry"),
            }
        }
        Ok(messages)
    }

    async fn ack(&self, topic: &str, group: &str, message_ids: &[String]) -> anyhow::Result<()> {
        let key = stream_key(topic);
        self.breaker
            .call(|| async {
                let mut conn = self.manager.lock().await;
                streams::ack(&mut conn, &key, group, message_ids).await
            })
            .await
            .map_err(map_breaker_err)
    }
}

/// Lets the outbox publisher push directly to the stream broker without the
/// outbox crate knowing anything about Redis.
#[async_trait]
impl OutboxPublisher for RedisStreamBroker {
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> OutboxResult<()> {
        StreamBroker::publish(self, topic, event)
            .await
            .map(|_| ())
            .map_err(|e| OutboxError::PublishFailed(e.to_string()))
    }
}

#[async_trait]
impl OutboxPublisher for InMemoryStreamBroker {
    async fn publish(&self, topic: &str, event: &EventEnvelope) -> OutboxResult<()> {
        StreamBroker::publish(self, topic, event)
            .await
            .map(|_| ())
            .map_err(|e| OutboxError::PublishFailed(e.to_string()))
    }
}

pub(crate) type ConsumerGroupOffsets = HashMap<(String, String), usize>;
