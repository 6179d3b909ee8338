//! Payment creation, confirmation, webhook dispatch and reconciliation
//! against a [`PaymentProvider`], every state change landing in the same
//! transaction as its outbox event.

mod error;
pub mod provider;
pub mod webhook;

pub use provider::{MockProvider, PaymentProvider, ProviderIntent, ProviderStatus};
pub use webhook::WebhookPayload;

use std::sync::Arc;

use chrono::Utc;
use domain::{OrderStatus, Payment, PaymentStatus};
use error_types::{ServiceError, ServiceResult};
use event_schema::{
    PaymentCreatedPayload, PaymentFailedPayload, PaymentReconciledPayload, PaymentRefundedPayload,
    PaymentSucceededPayload,
};
use resilience::{presets, CircuitBreaker, CircuitBreakerError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use store::{OrderRepository, PaymentRepository};
use transactional_outbox::{publish_event, OutboxRepository};
use uuid::Uuid;

use crate::error::to_service_error;

/// A circuit-open call fails fast with the same error the caller would see
/// on a real provider timeout; a tripped call surfaces the provider's own
/// message. Either way this is a transient condition — the queue consumers
/// that call through `PaymentCoordinator` already reschedule on it.
fn map_breaker_err(e: CircuitBreakerError) -> ServiceError {
    match e {
        CircuitBreakerError::Open => ServiceError::transient("payment provider circuit open"),
        CircuitBreakerError::CallFailed(message) => ServiceError::transient(message),
    }
}

pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub email: String,
    pub method_id: Option<String>,
}

pub struct PaymentCoordinator<P: PaymentProvider, R: OutboxRepository> {
    pool: PgPool,
    orders: OrderRepository,
    payments: PaymentRepository,
    provider: Arc<P>,
    outbox: Arc<R>,
    breaker: CircuitBreaker,
}

impl<P: PaymentProvider, R: OutboxRepository> PaymentCoordinator<P, R> {
    pub fn new(pool: PgPool, provider: Arc<P>, outbox: Arc<R>) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            payments: PaymentRepository::new(pool.clone()),
            pool,
            provider,
            outbox,
            breaker: CircuitBreaker::new(presets::payment_provider_config().circuit_breaker),
        }
    }

    /// Repeat calls for the same order return the first call's payment
    /// unchanged: the idempotency key is derived from `order_id`, not
    /// supplied by the caller, so there's exactly one payment per order to
    /// create.
    pub async fn create_payment(&self, req: CreatePaymentRequest) -> ServiceResult<Payment> {
        let idempotency_key = format!("order:{}:create-payment", req.order_id);
        if let Some(existing) = self
            .payments
            .find_by_idempotency_key(&idempotency_key)
            .await
            .map_err(to_service_error)?
        {
            return Ok(existing);
        }

        let order = self.orders.find_by_id(req.order_id).await.map_err(to_service_error)?;
        if order.status != OrderStatus::Created {
            return Err(ServiceError::Conflict {
                message: format!("order {} is not in CREATED state", req.order_id),
            });
        }
        if req.amount != order.total {
            return Err(ServiceError::InvalidInput {
                message: "payment amount does not match order total".to_string(),
            });
        }
        if req.currency != order.currency {
            return Err(ServiceError::InvalidInput {
                message: "payment currency does not match order currency".to_string(),
            });
        }

        let intent = self
            .breaker
            .call(|| {
                self.provider.create_intent(
                    req.amount,
                    &req.currency,
                    &req.method,
                    &req.email,
                    req.method_id.as_deref(),
                )
            })
            .await
            .map_err(map_breaker_err)?;

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            order_id: req.order_id,
            payment_intent_id: intent.intent_id,
            provider: "mock".to_string(),
            amount: req.amount,
            currency: req.currency.clone(),
            status: intent.status.to_payment_status(),
            idempotency_key,
            webhook_event_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        let payload = PaymentCreatedPayload {
            payment_id: payment.id,
            order_id: payment.order_id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            provider: payment.provider.clone(),
            payment_intent_id: payment.payment_intent_id.clone(),
        };

        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;
        PaymentRepository::create(&mut tx, &payment).await.map_err(to_service_error)?;
        publish_event!(
            &mut tx,
            self.outbox,
            "payment-coordinator",
            PaymentCreatedPayload::TYPE,
            serde_json::to_value(&payload).map_err(|e| ServiceError::fatal(e.to_string()))?
        )
        .map_err(|e| ServiceError::fatal(e.to_string()))?;
        tx.commit().await.map_err(ServiceError::from)?;

        Ok(payment)
    }

    /// Re-checks the provider's status for `intent_id` and, if it resolved
    /// to `SUCCEEDED`, moves the order to `PAID` in the same transaction.
    /// Already-terminal payments return unchanged (idempotent against
    /// repeated confirm calls).
    pub async fn confirm_payment(&self, intent_id: &str, _method_id: Option<&str>) -> ServiceResult<Payment> {
        let status = self
            .breaker
            .call(|| self.provider.get_status(intent_id))
            .await
            .map_err(map_breaker_err)?;

        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;
        let payment = PaymentRepository::lock_by_payment_intent_id(&mut tx, intent_id)
            .await
            .map_err(to_service_error)?;

        if payment.status.is_terminal() {
            tx.commit().await.map_err(ServiceError::from)?;
            return Ok(payment);
        }

        let new_status = status.to_payment_status();
        let failure_reason = matches!(new_status, PaymentStatus::Failed).then(|| "provider reported failure".to_string());
        PaymentRepository::update_status(&mut tx, payment.id, new_status, failure_reason.as_deref(), None)
            .await
            .map_err(to_service_error)?;

        match new_status {
            PaymentStatus::Succeeded => {
                let order = OrderRepository::lock_for_update(&mut tx, payment.order_id)
                    .await
                    .map_err(to_service_error)?;
                if order.status.can_transition_to(OrderStatus::Paid) {
                    OrderRepository::update_status(&mut tx, payment.order_id, OrderStatus::Paid, None)
                        .await
                        .map_err(to_service_error)?;
                }

                let succeeded = PaymentSucceededPayload {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    payment_intent_id: intent_id.to_string(),
                };
                publish_event!(
                    &mut tx,
                    self.outbox,
                    "payment-coordinator",
                    PaymentSucceededPayload::TYPE,
                    serde_json::to_value(&succeeded).map_err(|e| ServiceError::fatal(e.to_string()))?
                )
                .map_err(|e| ServiceError::fatal(e.to_string()))?;
            }
            PaymentStatus::Failed => {
                let failed = PaymentFailedPayload {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    payment_intent_id: intent_id.to_string(),
                    reason: failure_reason.unwrap_or_default(),
                };
                publish_event!(
                    &mut tx,
                    self.outbox,
                    "payment-coordinator",
                    PaymentFailedPayload::TYPE,
                    serde_json::to_value(&failed).map_err(|e| ServiceError::fatal(e.to_string()))?
                )
                .map_err(|e| ServiceError::fatal(e.to_string()))?;
            }
            _ => {}
        }

        tx.commit().await.map_err(ServiceError::from)?;

        Ok(Payment {
            status: new_status,
            updated_at: Utc::now(),
            ..payment
        })
    }

    /// Verifies the signature, then dedupes on `webhook_event_id` before
    /// dispatching — a redelivered webhook returns the prior result rather
    /// than reprocessing it.
    pub async fn process_webhook(&self, payload: &[u8], signature: &str) -> ServiceResult<Payment> {
        if !self.provider.verify_signature(payload, signature) {
            return Err(ServiceError::InvalidSignature);
        }

        let parsed: WebhookPayload = serde_json::from_slice(payload).map_err(|e| ServiceError::InvalidInput {
            message: format!("malformed webhook payload: {e}"),
        })?;

        if let Some(existing) = self
            .payments
            .find_by_webhook_event_id(&parsed.webhook_event_id)
            .await
            .map_err(to_service_error)?
        {
            return Ok(existing);
        }

        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;
        let payment = PaymentRepository::lock_by_payment_intent_id(&mut tx, &parsed.intent_id)
            .await
            .map_err(to_service_error)?;

        // The pre-lock dedup check above is only an optimization: two
        // concurrent deliveries of the same webhook_event_id can both pass
        // it before either commits. This is the authoritative check, taken
        // under the row lock, so only the first of two racing deliveries
        // ever reaches `update_status` below.
        if payment.webhook_event_id.as_deref() == Some(parsed.webhook_event_id.as_str()) {
            tx.commit().await.map_err(ServiceError::from)?;
            return Ok(payment);
        }

        let new_status = match parsed.event_type.as_str() {
            webhook::EVENT_INTENT_SUCCEEDED => PaymentStatus::Succeeded,
            webhook::EVENT_INTENT_FAILED => PaymentStatus::Failed,
            webhook::EVENT_CHARGE_REFUNDED => PaymentStatus::Refunded,
            other => {
                return Err(ServiceError::InvalidInput {
                    message: format!("unknown webhook event type: {other}"),
                })
            }
        };

        PaymentRepository::update_status(
            &mut tx,
            payment.id,
            new_status,
            None,
            Some(&parsed.webhook_event_id),
        )
        .await
        .map_err(to_service_error)?;

        match new_status {
            PaymentStatus::Succeeded => {
                let order = OrderRepository::lock_for_update(&mut tx, payment.order_id)
                    .await
                    .map_err(to_service_error)?;
                if order.status.can_transition_to(OrderStatus::Paid) {
                    OrderRepository::update_status(&mut tx, payment.order_id, OrderStatus::Paid, None)
                        .await
                        .map_err(to_service_error)?;
                }

                let succeeded = PaymentSucceededPayload {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    payment_intent_id: parsed.intent_id.clone(),
                };
                publish_event!(
                    &mut tx,
                    self.outbox,
                    "payment-coordinator",
                    PaymentSucceededPayload::TYPE,
                    serde_json::to_value(&succeeded).map_err(|e| ServiceError::fatal(e.to_string()))?
                )
                .map_err(|e| ServiceError::fatal(e.to_string()))?;
            }
            PaymentStatus::Failed => {
                let failed = PaymentFailedPayload {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    payment_intent_id: parsed.intent_id.clone(),
                    reason: "provider reported failure".to_string(),
                };
                publish_event!(
                    &mut tx,
                    self.outbox,
                    "payment-coordinator",
                    PaymentFailedPayload::TYPE,
                    serde_json::to_value(&failed).map_err(|e| ServiceError::fatal(e.to_string()))?
                )
                .map_err(|e| ServiceError::fatal(e.to_string()))?;
            }
            PaymentStatus::Refunded => {
                let refunded = PaymentRefundedPayload {
                    payment_id: payment.id,
                    order_id: payment.order_id,
                    amount: payment.amount,
                };
                publish_event!(
                    &mut tx,
                    self.outbox,
                    "payment-coordinator",
                    PaymentRefundedPayload::TYPE,
                    serde_json::to_value(&refunded).map_err(|e| ServiceError::fatal(e.to_string()))?
                )
                .map_err(|e| ServiceError::fatal(e.to_string()))?;
            }
            _ => unreachable!("dispatch above only ever assigns a terminal status"),
        }

        tx.commit().await.map_err(ServiceError::from)?;

        Ok(Payment {
            status: new_status,
            webhook_event_id: Some(parsed.webhook_event_id),
            updated_at: Utc::now(),
            ..payment
        })
    }

    /// Reconciles one payment against the provider's view of its intent.
    /// Never panics on a provider error — it surfaces as a retryable
    /// [`ServiceError::TransientUpstream`] so the caller (the
    /// `payment-reconciliation` queue consumer) reschedules the job instead
    /// of losing it.
    pub async fn reconcile(&self, payment_id: Uuid, intent_id: &str) -> ServiceResult<()> {
        let payment = self.payments.find_by_id(payment_id).await.map_err(to_service_error)?;
        if payment.status.is_terminal() {
            return Ok(());
        }

        let provider_status = self
            .breaker
            .call(|| self.provider.get_status(intent_id))
            .await
            .map_err(map_breaker_err)?;
        let mapped = provider_status.to_payment_status();

        if mapped == payment.status {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;
        PaymentRepository::update_status(&mut tx, payment_id, mapped, None, None)
            .await
            .map_err(to_service_error)?;

        let payload = PaymentReconciledPayload {
            payment_id,
            order_id: payment.order_id,
            provider_status: format!("{mapped:?}"),
            local_status: format!("{:?}", payment.status),
            corrected: true,
        };
        publish_event!(
            &mut tx,
            self.outbox,
            "payment-coordinator",
            PaymentReconciledPayload::TYPE,
            serde_json::to_value(&payload).map_err(|e| ServiceError::fatal(e.to_string()))?
        )
        .map_err(|e| ServiceError::fatal(e.to_string()))?;

        tx.commit().await.map_err(ServiceError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_maps_onto_the_expected_payment_status() {
        assert_eq!(ProviderStatus::Succeeded.to_payment_status(), PaymentStatus::Succeeded);
        assert_eq!(ProviderStatus::Cancelled.to_payment_status(), PaymentStatus::Cancelled);
    }
}
