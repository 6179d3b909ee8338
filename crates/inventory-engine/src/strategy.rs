use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use domain::{InventoryReservation, ReservationState};
use error_types::{ServiceError, ServiceResult};
use event_schema::InventoryReservedPayload;
use rand::Rng;
use sqlx::PgPool;
use store::{InventoryRepository, VariantRepository};
use transactional_outbox::{publish_event, OutboxRepository};
use uuid::Uuid;

use crate::error::to_service_error;

#[derive(Debug)]
pub struct ReserveOutcome {
    pub reservation_id: Uuid,
    pub available_after: i32,
}

/// Strategy seam for the reserve half of the inventory contract — commit,
/// release and sweep are identical regardless of which strategy created the
/// reservation, so only `reserve` is polymorphic.
#[async_trait]
pub trait InventoryStrategy: Send + Sync {
    async fn reserve(
        &self,
        variant_id: Uuid,
        quantity: i32,
        reserved_by: &str,
        ttl_seconds: i64,
    ) -> ServiceResult<ReserveOutcome>;
}

async fn emit_reserved<R: OutboxRepository>(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    outbox: &Arc<R>,
    reservation: &InventoryReservation,
) -> ServiceResult<()> {
    let payload = InventoryReservedPayload {
        reservation_id: reservation.id,
        variant_id: reservation.variant_id,
        reserved_by: reservation.reserved_by.clone(),
        quantity: reservation.quantity,
        expires_at: reservation.expires_at,
    };
    publish_event!(
        tx,
        outbox,
        "inventory-engine",
        InventoryReservedPayload::TYPE,
        serde_json::to_value(&payload).map_err(|e| ServiceError::fatal(e.to_string()))?
    )
    .map_err(|e| ServiceError::fatal(e.to_string()))?;
    Ok(())
}

fn held_reservation(variant_id: Uuid, quantity: i32, reserved_by: &str, ttl_seconds: i64) -> InventoryReservation {
    let now = Utc::now();
    InventoryReservation {
        id: Uuid::new_v4(),
        variant_id,
        quantity,
        reserved_by: reserved_by.to_string(),
        state: ReservationState::Held,
        expires_at: now + ChronoDuration::seconds(ttl_seconds),
        created_at: now,
        committed_at: None,
        released_at: None,
    }
}

/// Compare-and-swap on `product_variants.version`. Reads outside the lock,
/// writes conditioned on the version unchanged since the read; a lost race
/// retries with a fresh read up to `cas_retries` times before giving up.
pub struct OptimisticStrategy<R: OutboxRepository> {
    pool: PgPool,
    variants: VariantRepository,
    outbox: Arc<R>,
    cas_retries: u32,
}

impl<R: OutboxRepository> OptimisticStrategy<R> {
    pub fn new(pool: PgPool, outbox: Arc<R>, cas_retries: u32) -> Self {
        Self {
            variants: VariantRepository::new(pool.clone()),
            pool,
            outbox,
            cas_retries,
        }
    }
}

#[async_trait]
impl<R: OutboxRepository> InventoryStrategy for OptimisticStrategy<R> {
    async fn reserve(
        &self,
        variant_id: Uuid,
        quantity: i32,
        reserved_by: &str,
        ttl_seconds: i64,
    ) -> ServiceResult<ReserveOutcome> {
        for attempt in 0..=self.cas_retries {
            let variant = self.variants.find_by_id(variant_id).await.map_err(to_service_error)?;
            let new_stock = variant.stock - quantity;
            if new_stock < 0 {
                return Err(ServiceError::InsufficientStock {
                    variant_id,
                    requested: quantity,
                    available: variant.stock,
                });
            }

            let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;
            let won = VariantRepository::cas_update_stock(&mut tx, variant_id, variant.version, new_stock)
                .await
                .map_err(to_service_error)?;

            if !won {
                // Lost the race: drop this transaction and retry with a fresh read.
                drop(tx);
                if attempt < self.cas_retries {
                    let jitter_ms = rand::thread_rng().gen_range(5..=25);
                    tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
                }
                continue;
            }

            let reservation = held_reservation(variant_id, quantity, reserved_by, ttl_seconds);
            InventoryRepository::create(&mut tx, &reservation)
                .await
                .map_err(to_service_error)?;
            emit_reserved(&mut tx, &self.outbox, &reservation).await?;
            tx.commit().await.map_err(ServiceError::from)?;

            return Ok(ReserveOutcome {
                reservation_id: reservation.id,
                available_after: new_stock,
            });
        }

        let variant = self.variants.find_by_id(variant_id).await.map_err(to_service_error)?;
        Err(ServiceError::InsufficientStock {
            variant_id,
            requested: quantity,
            available: variant.stock,
        })
    }
}

/// `SELECT ... FOR UPDATE` on the variant row for the lifetime of the
/// transaction; no CAS loop needed since the lock already serializes
/// concurrent reservations.
pub struct PessimisticStrategy<R: OutboxRepository> {
    pool: PgPool,
    outbox: Arc<R>,
}

impl<R: OutboxRepository> PessimisticStrategy<R> {
    pub fn new(pool: PgPool, outbox: Arc<R>) -> Self {
        Self { pool, outbox }
    }
}

#[async_trait]
impl<R: OutboxRepository> InventoryStrategy for PessimisticStrategy<R> {
    async fn reserve(
        &self,
        variant_id: Uuid,
        quantity: i32,
        reserved_by: &str,
        ttl_seconds: i64,
    ) -> ServiceResult<ReserveOutcome> {
        let mut tx = self.pool.begin().await.map_err(ServiceError::from)?;

        let variant = VariantRepository::lock_for_update(&mut tx, variant_id)
            .await
            .map_err(to_service_error)?;
        let new_stock = variant.stock - quantity;
        if new_stock < 0 {
            return Err(ServiceError::InsufficientStock {
                variant_id,
                requested: quantity,
                available: variant.stock,
            });
        }

        VariantRepository::update_stock_locked(&mut tx, variant_id, new_stock)
            .await
            .map_err(to_service_error)?;

        let reservation = held_reservation(variant_id, quantity, reserved_by, ttl_seconds);
        InventoryRepository::create(&mut tx, &reservation)
            .await
            .map_err(to_service_error)?;
        emit_reserved(&mut tx, &self.outbox, &reservation).await?;
        tx.commit().await.map_err(ServiceError::from)?;

        Ok(ReserveOutcome {
            reservation_id: reservation.id,
            available_after: new_stock,
        })
    }
}
