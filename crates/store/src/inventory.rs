use chrono::{DateTime, Utc};
use domain::{InventoryReservation, ReservationState};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<InventoryReservation> {
        sqlx::query_as::<_, InventoryReservation>(
            "SELECT * FROM inventory_reservations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    /// Reservations an order still holds open, for the cancellation
    /// consumer that releases them when the order moves to `CANCELLED`.
    pub async fn find_held_by_reserved_by(
        &self,
        reserved_by: &str,
    ) -> StoreResult<Vec<InventoryReservation>> {
        Ok(sqlx::query_as::<_, InventoryReservation>(
            "SELECT * FROM inventory_reservations WHERE reserved_by = $1 AND state = 'HELD'",
        )
        .bind(reserved_by)
        .fetch_all(&self.pool)
        .await?)
    }

    /// `HELD` reservations past `expires_at`, oldest first, for the sweep.
    pub async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<InventoryReservation>> {
        Ok(sqlx::query_as::<_, InventoryReservation>(
            r#"
            SELECT * FROM inventory_reservations
            WHERE state = 'HELD' AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        reservation: &InventoryReservation,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_reservations
                (id, variant_id, quantity, reserved_by, state, expires_at,
                 created_at, committed_at, released_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.variant_id)
        .bind(reservation.quantity)
        .bind(&reservation.reserved_by)
        .bind(reservation.state)
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .bind(reservation.committed_at)
        .bind(reservation.released_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Move a `HELD` reservation to a terminal state. `Committed` stamps
    /// `committed_at`, `Released`/`Expired` stamp `released_at`; the other
    /// timestamp column is left untouched.
    pub async fn mark_terminal(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        new_state: ReservationState,
    ) -> StoreResult<()> {
        let result = if new_state == ReservationState::Committed {
            sqlx::query(
                r#"
                UPDATE inventory_reservations
                SET state = $2, committed_at = NOW()
                WHERE id = $1 AND state = 'HELD'
                "#,
            )
            .bind(id)
            .bind(new_state)
            .execute(&mut **tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE inventory_reservations
                SET state = $2, released_at = NOW()
                WHERE id = $1 AND state = 'HELD'
                "#,
            )
            .bind(id)
            .bind(new_state)
            .execute(&mut **tx)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Row-lock a reservation for the lifetime of `tx`, used before
    /// `mark_terminal` to serialize concurrent commit/release/sweep calls
    /// on the same reservation.
    pub async fn lock_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> StoreResult<InventoryReservation> {
        sqlx::query_as::<_, InventoryReservation>(
            "SELECT * FROM inventory_reservations WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::NotFound(id))
    }
}
