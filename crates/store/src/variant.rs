use domain::ProductVariant;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub struct VariantRepository {
    pool: PgPool,
}

impl VariantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<ProductVariant> {
        sqlx::query_as::<_, ProductVariant>("SELECT * FROM product_variants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    pub async fn find_by_sku(&self, sku: &str) -> StoreResult<Option<ProductVariant>> {
        Ok(
            sqlx::query_as::<_, ProductVariant>("SELECT * FROM product_variants WHERE sku = $1")
                .bind(sku)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Fetch every variant referenced by `skus` in one query. Callers check
    /// the result length against `skus` to detect unknown SKUs.
    pub async fn find_by_skus(&self, skus: &[String]) -> StoreResult<Vec<ProductVariant>> {
        Ok(
            sqlx::query_as::<_, ProductVariant>("SELECT * FROM product_variants WHERE sku = ANY($1)")
                .bind(skus)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Row-lock a variant for the lifetime of `tx`. Used by the pessimistic
    /// reservation strategy, which serializes on this lock instead of a CAS
    /// loop.
    pub async fn lock_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> StoreResult<ProductVariant> {
        sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    /// Compare-and-swap stock update. Succeeds only if `version` still
    /// matches `expected_version`; the caller (optimistic strategy) treats a
    /// `false` return as a CAS loss and retries with a fresh read.
    pub async fn cas_update_stock(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        expected_version: i64,
        new_stock: i32,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE product_variants
            SET stock = $3, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(new_stock)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Unconditional stock update under an existing `lock_for_update` hold.
    pub async fn update_stock_locked(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        new_stock: i32,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE product_variants SET stock = $2, version = version + 1 WHERE id = $1",
        )
        .bind(id)
        .bind(new_stock)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
