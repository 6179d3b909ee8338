use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order lifecycle status. Transition legality is enforced by `order-engine`,
/// not by this type: `DELIVERED`, `CANCELLED` and `REFUNDED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Created,
    Paid,
    Fulfilled,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Order lifecycle transition table. `DELIVERED`/`CANCELLED`/`REFUNDED`
    /// accept nothing further; everything else allows exactly the edges
    /// named here.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Created, Paid)
                | (Created, Cancelled)
                | (Paid, Fulfilled)
                | (Paid, Cancelled)
                | (Paid, Refunded)
                | (Fulfilled, Shipped)
                | (Fulfilled, Refunded)
                | (Shipped, Delivered)
                | (Shipped, Refunded)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub idempotency_key: Option<String>,
    pub promotion_code: Option<String>,
    pub cancelled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// `total == subtotal - discount + tax + shipping`, per the data model invariant.
    pub fn total_is_consistent(&self) -> bool {
        self.total == self.subtotal - self.discount + self.tax + self.shipping
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub variant_id: Uuid,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub discount_amount: Decimal,
    pub attributes: serde_json::Value,
}

impl OrderItem {
    pub fn total_price_is_consistent(&self) -> bool {
        self.total_price == self.unit_price * Decimal::from(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order(total: Decimal) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: OrderStatus::Created,
            subtotal: Decimal::new(2000, 2),
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            shipping: Decimal::ZERO,
            total,
            currency: "USD".to_string(),
            idempotency_key: None,
            promotion_code: None,
            cancelled_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn total_consistency_checks_the_invariant() {
        assert!(sample_order(Decimal::new(2000, 2)).total_is_consistent());
        assert!(!sample_order(Decimal::new(1999, 2)).total_is_consistent());
    }

    #[test]
    fn transition_table_matches_the_documented_edges() {
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Fulfilled));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Created));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Paid));
    }

    #[test]
    fn terminal_statuses_are_delivered_cancelled_refunded() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::Created.is_terminal());
    }
}
