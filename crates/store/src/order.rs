use domain::{Order, OrderItem, OrderStatus};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<Order> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Order>> {
        Ok(
            sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE idempotency_key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Row-lock an order for the lifetime of `tx`, serializing concurrent
    /// status transitions on the same order.
    pub async fn lock_for_update(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> StoreResult<Order> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    pub async fn items_for_order(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        Ok(sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Insert the order and its line items in one transaction. Caller
    /// commits (typically after also writing an outbox row in the same
    /// `tx`).
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
        items: &[OrderItem],
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, user_id, status, subtotal, discount, tax, shipping, total,
                 currency, idempotency_key, promotion_code, cancelled_reason,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status)
        .bind(order.subtotal)
        .bind(order.discount)
        .bind(order.tax)
        .bind(order.shipping)
        .bind(order.total)
        .bind(&order.currency)
        .bind(&order.idempotency_key)
        .bind(&order.promotion_code)
        .bind(&order.cancelled_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (id, order_id, variant_id, sku, quantity, unit_price,
                     total_price, discount_amount, attributes)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.variant_id)
            .bind(&item.sku)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total_price)
            .bind(item.discount_amount)
            .bind(&item.attributes)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Move an order to `new_status`. `cancelled_reason` is only persisted
    /// when `new_status` is `CANCELLED`; callers pass `None` otherwise.
    pub async fn update_status(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        new_status: OrderStatus,
        cancelled_reason: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, cancelled_reason = COALESCE($3, cancelled_reason), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(new_status)
        .bind(cancelled_reason)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
