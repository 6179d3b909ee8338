//! Consumes `order.updated.v1` and releases any reservation an order still
//! holds once that order lands in `CANCELLED`. The inventory engine's
//! release contract is already generic over `reserved_by`, so this is just
//! the broker-to-engine plumbing spec.md's inventory module doesn't itself
//! need to know about.

use std::sync::Arc;
use std::time::Duration;

use event_schema::OrderUpdatedPayload;
use idempotent_consumer::IdempotencyGuard;
use inventory_engine::{ExperimentAssigner, InventoryEngine};
use store::InventoryRepository;
use stream_broker::StreamBroker;
use tokio_util::sync::CancellationToken;
use transactional_outbox::OutboxRepository;

pub const TOPIC: &str = "order.updated";
pub const GROUP: &str = "inventory-cancellation-release";

pub struct OrderCancellationReleaseConsumer<B, A, R>
where
    B: StreamBroker,
    A: ExperimentAssigner,
    R: OutboxRepository,
{
    broker: Arc<B>,
    guard: IdempotencyGuard,
    inventory: Arc<InventoryEngine<A, R>>,
    reservations: InventoryRepository,
    consumer_name: String,
}

impl<B, A, R> OrderCancellationReleaseConsumer<B, A, R>
where
    B: StreamBroker,
    A: ExperimentAssigner,
    R: OutboxRepository,
{
    pub fn new(
        broker: Arc<B>,
        guard: IdempotencyGuard,
        inventory: Arc<InventoryEngine<A, R>>,
        reservations: InventoryRepository,
        consumer_name: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            guard,
            inventory,
            reservations,
            consumer_name: consumer_name.into(),
        }
    }

    /// One read-process-ack pass. Returns the number of messages read.
    pub async fn run_batch(&self, max_messages: usize) -> anyhow::Result<usize> {
        let messages = self
            .broker
            .consume(TOPIC, GROUP, &self.consumer_name, max_messages)
            .await?;
        let count = messages.len();

        for message in &messages {
            let event_id = message.event.event_id.to_string();
            let outcome = self
                .guard
                .process_if_new(&event_id, || self.apply(message.event.payload.clone()))
                .await?;

            if !outcome.is_failed() {
                self.broker.ack(TOPIC, GROUP, &[message.message_id.clone()]).await?;
            } else {
                tracing::error!(message_id = %message.message_id, "order cancellation release failed, leaving unacked for redelivery");
            }
        }

        Ok(count)
    }

    async fn apply(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        let payload: OrderUpdatedPayload = serde_json::from_value(payload)?;
        if payload.new_status != "CANCELLED" {
            return Ok(());
        }

        let reserved_by = payload.order_id.to_string();
        let held = self.reservations.find_held_by_reserved_by(&reserved_by).await?;

        for reservation in held {
            self.inventory.release(reservation.id, "order cancelled").await?;
        }

        Ok(())
    }

    pub async fn run_forever(self, max_messages: usize, poll_interval: Duration, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() {
            match self.run_batch(max_messages).await {
                Ok(0) => {
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "order cancellation release batch failed");
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }
    }
}
