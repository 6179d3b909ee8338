//! Payload catalog. Each event type in the catalog has exactly one struct
//! here; the `event_type` string used when constructing an [`EventEnvelope`]
//! is listed alongside its `TYPE` constant. `order.created.v1`,
//! `order.updated.v1`, and `order.paid.v1` carry the exact field set the
//! event catalog names; the remaining payloads are this workspace's own
//! schema since the catalog leaves them unspecified beyond the event name.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemSnapshot {
    pub variant_id: Uuid,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedPayload {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub currency: String,
    pub items: Vec<OrderItemSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl OrderCreatedPayload {
    pub const TYPE: &'static str = "order.created.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdatedPayload {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub old_status: String,
    pub new_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OrderUpdatedPayload {
    pub const TYPE: &'static str = "order.updated.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaidPayload {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciled: Option<bool>,
}

impl OrderPaidPayload {
    pub const TYPE: &'static str = "order.paid.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCreatedPayload {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    pub payment_intent_id: String,
}

impl PaymentCreatedPayload {
    pub const TYPE: &'static str = "payment.created.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSucceededPayload {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub payment_intent_id: String,
}

impl PaymentSucceededPayload {
    pub const TYPE: &'static str = "payment.succeeded.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedPayload {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub payment_intent_id: String,
    pub reason: String,
}

impl PaymentFailedPayload {
    pub const TYPE: &'static str = "payment.failed.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefundedPayload {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
}

impl PaymentRefundedPayload {
    pub const TYPE: &'static str = "payment.refunded.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReconciledPayload {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub provider_status: String,
    pub local_status: String,
    pub corrected: bool,
}

impl PaymentReconciledPayload {
    pub const TYPE: &'static str = "payment.reconciled.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservedPayload {
    pub reservation_id: Uuid,
    pub variant_id: Uuid,
    pub reserved_by: String,
    pub quantity: i32,
    pub expires_at: DateTime<Utc>,
}

impl InventoryReservedPayload {
    pub const TYPE: &'static str = "inventory.reserved.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryCommittedPayload {
    pub reservation_id: Uuid,
    pub variant_id: Uuid,
    pub order_id: Uuid,
    pub quantity: i32,
}

impl InventoryCommittedPayload {
    pub const TYPE: &'static str = "inventory.committed.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReleasedPayload {
    pub reservation_id: Uuid,
    pub variant_id: Uuid,
    pub reserved_by: String,
    pub quantity: i32,
    pub reason: String,
}

impl InventoryReleasedPayload {
    pub const TYPE: &'static str = "inventory.released.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryExpiredPayload {
    pub reservation_id: Uuid,
    pub variant_id: Uuid,
    pub reserved_by: String,
    pub quantity: i32,
}

impl InventoryExpiredPayload {
    pub const TYPE: &'static str = "inventory.expired.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexedPayload {
    pub product_id: Uuid,
    pub indexed_at: DateTime<Utc>,
}

impl SearchIndexedPayload {
    pub const TYPE: &'static str = "search.indexed.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDeletedPayload {
    pub product_id: Uuid,
}

impl SearchDeletedPayload {
    pub const TYPE: &'static str = "search.deleted.v1";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_constants_are_namespaced() {
        assert_eq!(OrderCreatedPayload::TYPE, "order.created.v1");
        assert_eq!(PaymentReconciledPayload::TYPE, "payment.reconciled.v1");
        assert_eq!(InventoryExpiredPayload::TYPE, "inventory.expired.v1");
    }
}
