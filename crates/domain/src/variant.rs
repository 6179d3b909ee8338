use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog product variant, read-only from this core's perspective — the
/// catalog service owns writes outside of `stock`/`version`, which the
/// inventory engine mutates directly.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: Uuid,
    pub sku: String,
    pub price: Decimal,
    pub currency: String,
    pub stock: i32,
    pub version: i64,
    pub attributes: serde_json::Value,
}
