//! Order lifecycle: creation from a cart and status transitions, both
//! writing their outbox event in the same transaction as the row mutation.
//!
//! Stock checks here are advisory only — the authoritative check happens in
//! `inventory-engine` when a reservation is actually placed. Rejecting an
//! order at creation time for stock that moves again before reservation is
//! a deliberately accepted race; the alternative is holding stock locks
//! across an HTTP request.

use std::sync::Arc;

use chrono::Utc;
use domain::{Order, OrderItem, OrderStatus};
use error_types::{ServiceError, ServiceResult};
use event_schema::{OrderCreatedPayload, OrderItemSnapshot, OrderPaidPayload, OrderUpdatedPayload};
use rust_decimal::Decimal;
use sqlx::PgPool;
use store::{OrderRepository, VariantRepository};
use transactional_outbox::{publish_event, OutboxRepository};
use uuid::Uuid;

pub struct CreateOrderItem {
    pub sku: String,
    pub quantity: i32,
    pub discount_amount: Decimal,
}

pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub items: Vec<CreateOrderItem>,
    pub promotion_code: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Orchestrates order creation and lifecycle transitions against `store`,
/// emitting the matching outbox event inside the same transaction.
pub struct OrderEngine<R: OutboxRepository> {
    orders: OrderRepository,
    variants: VariantRepository,
    pool: PgPool,
    outbox: Arc<R>,
}

impl<R: OutboxRepository> OrderEngine<R> {
    pub fn new(pool: PgPool, outbox: Arc<R>) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            variants: VariantRepository::new(pool.clone()),
            pool,
            outbox,
        }
    }

    /// Create an order from a cart. Replaying the same `idempotency_key`
    /// returns the existing order without writing a second outbox event.
    pub async fn create(&self, req: CreateOrderRequest) -> ServiceResult<Order> {
        if req.items.is_empty() {
            return Err(ServiceError::InvalidInput {
                message: "order must contain at least one item".to_string(),
            });
        }

        if let Some(key) = &req.idempotency_key {
            if let Some(existing) = self
                .orders
                .find_by_idempotency_key(key)
                .await
                .map_err(to_service_error)?
            {
                return Ok(existing);
            }
        }

        let skus: Vec<String> = req.items.iter().map(|i| i.sku.clone()).collect();
        let variants = self
            .variants
            .find_by_skus(&skus)
            .await
            .map_err(to_service_error)?;
        if variants.len() != skus.iter().collect::<std::collections::HashSet<_>>().len() {
            return Err(ServiceError::InvalidInput {
                message: "one or more SKUs do not exist".to_string(),
            });
        }
        let by_sku: std::collections::HashMap<&str, &domain::ProductVariant> =
            variants.iter().map(|v| (v.sku.as_str(), v)).collect();

        let currency = variants[0].currency.clone();
        if variants.iter().any(|v| v.currency != currency) {
            return Err(ServiceError::InvalidInput {
                message: "order items span more than one currency".to_string(),
            });
        }

        let order_id = Uuid::new_v4();
        let mut order_items = Vec::with_capacity(req.items.len());
        let mut subtotal = Decimal::ZERO;
        let mut discount = Decimal::ZERO;

        for item in &req.items {
            if item.quantity <= 0 {
                return Err(ServiceError::InvalidInput {
                    message: format!("quantity for {} must be positive", item.sku),
                });
            }
            let variant = by_sku.get(item.sku.as_str()).expect("checked above");
            if variant.stock < item.quantity {
                return Err(ServiceError::InsufficientStock {
                    variant_id: variant.id,
                    requested: item.quantity,
                    available: variant.stock,
                });
            }

            let line_total = variant.price * Decimal::from(item.quantity);
            subtotal += line_total;
            discount += item.discount_amount;

            order_items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id,
                variant_id: variant.id,
                sku: item.sku.clone(),
                quantity: item.quantity,
                unit_price: variant.price,
                total_price: line_total - item.discount_amount,
                discount_amount: item.discount_amount,
                attributes: variant.attributes.clone(),
            });
        }

        let tax = Decimal::ZERO;
        let shipping = Decimal::ZERO;
        let total = subtotal - discount + tax + shipping;
        let now = Utc::now();

        let order = Order {
            id: order_id,
            user_id: req.user_id,
            status: OrderStatus::Created,
            subtotal,
            discount,
            tax,
            shipping,
            total,
            currency: currency.clone(),
            idempotency_key: req.idempotency_key.clone(),
            promotion_code: req.promotion_code.clone(),
            cancelled_reason: None,
            created_at: now,
            updated_at: now,
        };

        let payload = OrderCreatedPayload {
            order_id,
            user_id: req.user_id,
            total_amount: total,
            currency,
            items: order_items
                .iter()
                .map(|i| OrderItemSnapshot {
                    variant_id: i.variant_id,
                    sku: i.sku.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                    total_price: i.total_price,
                    discount_amount: i.discount_amount,
                })
                .collect(),
            idempotency_key: order.idempotency_key.clone(),
        };

        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;
        OrderRepository::create(&mut tx, &order, &order_items)
            .await
            .map_err(to_service_error)?;
        publish_event!(
            &mut tx,
            self.outbox,
            "order-engine",
            OrderCreatedPayload::TYPE,
            serde_json::to_value(&payload).map_err(|e| ServiceError::fatal(e.to_string()))?
        )
        .map_err(|e| ServiceError::fatal(e.to_string()))?;
        tx.commit().await.map_err(ServiceError::from)?;

        Ok(order)
    }

    /// Move an order to `new_status`, rejecting transitions the lifecycle
    /// table doesn't allow. `payment_id` is required (and only used) when
    /// transitioning to `PAID`, to emit `order.paid.v1` alongside
    /// `order.updated.v1`.
    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
        reason: Option<String>,
        payment_id: Option<Uuid>,
    ) -> ServiceResult<Order> {
        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;

        let current = OrderRepository::lock_for_update(&mut tx, id)
            .await
            .map_err(to_service_error)?;

        if !current.status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition {
                from: current.status.to_string(),
                to: new_status.to_string(),
            });
        }

        let cancelled_reason = if new_status == OrderStatus::Cancelled {
            reason.as_deref()
        } else {
            None
        };
        OrderRepository::update_status(&mut tx, id, new_status, cancelled_reason)
            .await
            .map_err(to_service_error)?;

        let updated_payload = OrderUpdatedPayload {
            order_id: id,
            user_id: current.user_id,
            old_status: current.status.as_str().to_string(),
            new_status: new_status.as_str().to_string(),
            reason: reason.clone(),
        };
        publish_event!(
            &mut tx,
            self.outbox,
            "order-engine",
            OrderUpdatedPayload::TYPE,
            serde_json::to_value(&updated_payload).map_err(|e| ServiceError::fatal(e.to_string()))?
        )
        .map_err(|e| ServiceError::fatal(e.to_string()))?;

        if new_status == OrderStatus::Paid {
            if let Some(payment_id) = payment_id {
                let paid_payload = OrderPaidPayload {
                    order_id: id,
                    payment_id,
                    reconciled: None,
                };
                publish_event!(
                    &mut tx,
                    self.outbox,
                    "order-engine",
                    OrderPaidPayload::TYPE,
                    serde_json::to_value(&paid_payload).map_err(|e| ServiceError::fatal(e.to_string()))?
                )
                .map_err(|e| ServiceError::fatal(e.to_string()))?;
            }
        }

        tx.commit().await.map_err(ServiceError::from)?;

        Ok(Order {
            status: new_status,
            cancelled_reason: cancelled_reason.map(str::to_string).or(current.cancelled_reason),
            updated_at: Utc::now(),
            ..current
        })
    }
}

fn to_service_error(err: store::StoreError) -> ServiceError {
    match err {
        store::StoreError::NotFound(id) => ServiceError::NotFound {
            resource: "order",
            id: id.to_string(),
        },
        store::StoreError::NotFoundByIntentId(intent_id) => ServiceError::NotFound {
            resource: "order",
            id: intent_id,
        },
        store::StoreError::Conflict(id) => ServiceError::Conflict {
            message: format!("conflicting write on {id}"),
        },
        store::StoreError::DatabaseError(e) => ServiceError::from(e),
        store::StoreError::SerializationError(e) => ServiceError::fatal(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_empty_order() {
        struct NullOutbox;

        #[async_trait::async_trait]
        impl OutboxRepository for NullOutbox {
            async fn write_event(
                &self,
                _tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
                _topic: &str,
                _event: &event_schema::EventEnvelope,
            ) -> transactional_outbox::OutboxResult<Uuid> {
                unreachable!("create() must reject before touching the database")
            }

            async fn claim_batch(
                &self,
                _limit: i32,
            ) -> transactional_outbox::OutboxResult<Vec<transactional_outbox::OutboxRecord>> {
                unreachable!()
            }

            async fn mark_sent(&self, _id: Uuid) -> transactional_outbox::OutboxResult<()> {
                unreachable!()
            }

            async fn mark_failed(&self, _id: Uuid) -> transactional_outbox::OutboxResult<()> {
                unreachable!()
            }

            async fn dlq_rows(
                &self,
                _max_attempts: i32,
                _limit: i32,
            ) -> transactional_outbox::OutboxResult<Vec<transactional_outbox::OutboxRecord>> {
                unreachable!()
            }

            async fn pending_stats(&self) -> transactional_outbox::OutboxResult<(i64, i64)> {
                unreachable!()
            }
        }

        let req = CreateOrderRequest {
            user_id: Uuid::new_v4(),
            items: vec![],
            promotion_code: None,
            idempotency_key: None,
        };

        // No live pool is needed: an empty item list is rejected before any
        // query runs, so a pool that would panic on use never gets touched.
        let pool = sqlx::PgPool::connect_lazy("postgres://localhost/nonexistent").unwrap();
        let engine = OrderEngine::new(pool, Arc::new(NullOutbox));

        let err = engine.create(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { .. }));
    }
}
