//! Reservation create/commit/release behind one contract, backed by either
//! of two interchangeable strategies.
//!
//! `reserve` is the only strategy-polymorphic operation: it's the one place
//! stock actually gets debited, and optimistic (CAS) vs. pessimistic
//! (row-lock) differ in how they serialize that debit. `commit`, `release`
//! and `sweep_expired` only ever touch the reservation row (plus, for
//! `release`/`sweep_expired`, a CAS-based stock restore), so they live here
//! once instead of being duplicated per strategy.

mod assigner;
mod error;
mod strategy;

pub use assigner::{ExperimentAssigner, FixedAssigner, HashSplitAssigner, StrategyKind};
pub use strategy::{InventoryStrategy, OptimisticStrategy, PessimisticStrategy, ReserveOutcome};

use std::sync::Arc;

use chrono::Utc;
use domain::ReservationState;
use error_types::{ServiceError, ServiceResult};
use event_schema::{InventoryCommittedPayload, InventoryExpiredPayload, InventoryReleasedPayload};
use rand::Rng;
use sqlx::{PgPool, Postgres, Transaction};
use store::{InventoryRepository, VariantRepository};
use transactional_outbox::{publish_event, OutboxRepository};
use uuid::Uuid;

use crate::error::to_service_error;

pub struct InventoryEngine<A: ExperimentAssigner, R: OutboxRepository> {
    pool: PgPool,
    variants: VariantRepository,
    reservations: InventoryRepository,
    outbox: Arc<R>,
    optimistic: OptimisticStrategy<R>,
    pessimistic: PessimisticStrategy<R>,
    assigner: A,
    cas_retries: u32,
}

impl<A: ExperimentAssigner, R: OutboxRepository> InventoryEngine<A, R> {
    pub fn new(pool: PgPool, outbox: Arc<R>, assigner: A, optimistic_cas_retries: u32) -> Self {
        Self {
            variants: VariantRepository::new(pool.clone()),
            reservations: InventoryRepository::new(pool.clone()),
            optimistic: OptimisticStrategy::new(pool.clone(), outbox.clone(), optimistic_cas_retries),
            pessimistic: PessimisticStrategy::new(pool.clone(), outbox.clone()),
            pool,
            outbox,
            assigner,
            cas_retries: optimistic_cas_retries,
        }
    }

    /// Restores `quantity` units to `variant_id` via the same version-CAS
    /// loop `OptimisticStrategy::reserve` uses, but inside the caller's
    /// already-open `tx` so the restore commits atomically with the
    /// reservation's terminal-state write. A lost CAS retries with a fresh
    /// read; nothing here holds a row lock, so it can't deadlock against a
    /// concurrent `reserve` on the same variant.
    async fn cas_restore_stock(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        variant_id: Uuid,
        quantity: i32,
    ) -> ServiceResult<()> {
        for attempt in 0..=self.cas_retries {
            let variant = self.variants.find_by_id(variant_id).await.map_err(to_service_error)?;
            let new_stock = variant.stock + quantity;
            let won = VariantRepository::cas_update_stock(tx, variant_id, variant.version, new_stock)
                .await
                .map_err(to_service_error)?;
            if won {
                return Ok(());
            }
            if attempt < self.cas_retries {
                let jitter_ms = rand::thread_rng().gen_range(5..=25);
                tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
            }
        }

        Err(ServiceError::Conflict {
            message: format!(
                "could not restore stock for variant {variant_id} after {} CAS retries",
                self.cas_retries
            ),
        })
    }

    pub async fn reserve(
        &self,
        variant_id: Uuid,
        quantity: i32,
        reserved_by: &str,
        ttl_seconds: i64,
    ) -> ServiceResult<ReserveOutcome> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput {
                message: "quantity must be positive".to_string(),
            });
        }

        match self.assigner.strategy_for(reserved_by) {
            StrategyKind::Optimistic => {
                self.optimistic
                    .reserve(variant_id, quantity, reserved_by, ttl_seconds)
                    .await
            }
            StrategyKind::Pessimistic => {
                self.pessimistic
                    .reserve(variant_id, quantity, reserved_by, ttl_seconds)
                    .await
            }
        }
    }

    /// `order_id` is only used for the `inventory.committed.v1` payload;
    /// committing never touches stock since it was already debited at
    /// reserve time.
    pub async fn commit(&self, reservation_id: Uuid, order_id: Uuid) -> ServiceResult<()> {
        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;

        let reservation = InventoryRepository::lock_for_update(&mut tx, reservation_id)
            .await
            .map_err(to_service_error)?;
        if reservation.state != ReservationState::Held {
            return Err(ServiceError::Conflict {
                message: format!("reservation {reservation_id} is not held"),
            });
        }

        InventoryRepository::mark_terminal(&mut tx, reservation_id, ReservationState::Committed)
            .await
            .map_err(to_service_error)?;

        let payload = InventoryCommittedPayload {
            reservation_id,
            variant_id: reservation.variant_id,
            order_id,
            quantity: reservation.quantity,
        };
        publish_event!(
            &mut tx,
            self.outbox,
            "inventory-engine",
            InventoryCommittedPayload::TYPE,
            serde_json::to_value(&payload).map_err(|e| ServiceError::fatal(e.to_string()))?
        )
        .map_err(|e| ServiceError::fatal(e.to_string()))?;

        tx.commit().await.map_err(ServiceError::from)?;
        Ok(())
    }

    /// Releases a held reservation and restores its stock via the same CAS
    /// pattern `reserve` uses, regardless of which strategy created it.
    pub async fn release(&self, reservation_id: Uuid, reason: &str) -> ServiceResult<()> {
        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;

        let reservation = InventoryRepository::lock_for_update(&mut tx, reservation_id)
            .await
            .map_err(to_service_error)?;
        if reservation.state != ReservationState::Held {
            return Err(ServiceError::Conflict {
                message: format!("reservation {reservation_id} is not held"),
            });
        }

        self.cas_restore_stock(&mut tx, reservation.variant_id, reservation.quantity)
            .await?;

        InventoryRepository::mark_terminal(&mut tx, reservation_id, ReservationState::Released)
            .await
            .map_err(to_service_error)?;

        let payload = InventoryReleasedPayload {
            reservation_id,
            variant_id: reservation.variant_id,
            reserved_by: reservation.reserved_by.clone(),
            quantity: reservation.quantity,
            reason: reason.to_string(),
        };
        publish_event!(
            &mut tx,
            self.outbox,
            "inventory-engine",
            InventoryReleasedPayload::TYPE,
            serde_json::to_value(&payload).map_err(|e| ServiceError::fatal(e.to_string()))?
        )
        .map_err(|e| ServiceError::fatal(e.to_string()))?;

        tx.commit().await.map_err(ServiceError::from)?;
        Ok(())
    }

    /// One pass of the TTL sweep: every `HELD` reservation past `expires_at`
    /// is expired and its stock restored, one transaction per reservation so
    /// a single bad row can't stall the rest of the batch. Returns the
    /// number of reservations it processed.
    pub async fn sweep_expired(&self, batch_size: i64) -> ServiceResult<usize> {
        let expired = self
            .reservations
            .find_expired(Utc::now(), batch_size)
            .await
            .map_err(to_service_error)?;

        let mut processed = 0;
        for reservation in expired {
            let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;

            let locked = InventoryRepository::lock_for_update(&mut tx, reservation.id)
                .await
                .map_err(to_service_error)?;
            if locked.state != ReservationState::Held {
                // Another sweeper, or a concurrent commit/release, beat us to it.
                continue;
            }

            self.cas_restore_stock(&mut tx, locked.variant_id, locked.quantity).await?;

            InventoryRepository::mark_terminal(&mut tx, locked.id, ReservationState::Expired)
                .await
                .map_err(to_service_error)?;

            let payload = InventoryExpiredPayload {
                reservation_id: locked.id,
                variant_id: locked.variant_id,
                reserved_by: locked.reserved_by.clone(),
                quantity: locked.quantity,
            };
            publish_event!(
                &mut tx,
                self.outbox,
                "inventory-engine",
                InventoryExpiredPayload::TYPE,
                serde_json::to_value(&payload).map_err(|e| ServiceError::fatal(e.to_string()))?
            )
            .map_err(|e| ServiceError::fatal(e.to_string()))?;

            tx.commit().await.map_err(ServiceError::from)?;
            processed += 1;
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_assigner_feeds_strategy_kind_to_the_engine() {
        let assigner = FixedAssigner(StrategyKind::Pessimistic);
        assert_eq!(assigner.strategy_for("order-9"), StrategyKind::Pessimistic);
    }
}
