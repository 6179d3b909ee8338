use domain::{Payment, PaymentStatus};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<Payment> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    pub async fn find_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> StoreResult<Option<Payment>> {
        Ok(sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE payment_intent_id = $1",
        )
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Payment>> {
        Ok(
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE idempotency_key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Looks up the payment a webhook event was already applied to, so a
    /// redelivered webhook can return the prior result instead of
    /// reprocessing it.
    pub async fn find_by_webhook_event_id(&self, webhook_event_id: &str) -> StoreResult<Option<Payment>> {
        Ok(sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE webhook_event_id = $1",
        )
        .bind(webhook_event_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Row-lock a payment for the lifetime of `tx`, serializing concurrent
    /// confirmations/webhooks for the same payment.
    pub async fn lock_for_update(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> StoreResult<Payment> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Row-lock by `payment_intent_id`, used by `ConfirmPayment`/webhook
    /// dispatch which key off the provider's intent id rather than our id.
    pub async fn lock_by_payment_intent_id(
        tx: &mut Transaction<'_, Postgres>,
        payment_intent_id: &str,
    ) -> StoreResult<Payment> {
        sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE payment_intent_id = $1 FOR UPDATE",
        )
        .bind(payment_intent_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::NotFoundByIntentId(payment_intent_id.to_string()))
    }

    pub async fn create(tx: &mut Transaction<'_, Postgres>, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, order_id, payment_intent_id, provider, amount, currency,
                 status, idempotency_key, webhook_event_id, failure_reason,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.payment_intent_id)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(&payment.idempotency_key)
        .bind(&payment.webhook_event_id)
        .bind(&payment.failure_reason)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn update_status(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        new_status: PaymentStatus,
        failure_reason: Option<&str>,
        webhook_event_id: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                failure_reason = COALESCE($3, failure_reason),
                webhook_event_id = COALESCE($4, webhook_event_id),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(new_status)
        .bind(failure_reason)
        .bind(webhook_event_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
