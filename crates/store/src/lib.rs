//! # Relational Store
//!
//! Repository structs over the tables that make up the transactional core:
//! orders, payments, product variants, inventory reservations, and the
//! outbox. Read methods take a `&PgPool`; mutating methods take `&mut
//! Transaction<'_, Postgres>` so a caller composes several repository calls
//! plus an outbox write into one commit, the same contract
//! `transactional-outbox::OutboxRepository::write_event` uses.
//!
//! Migrations are embedded and run the way `analytics-service::main` runs
//! them against its pool:
//!
//! ```rust,no_run
//! # async fn example(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
//! store::MIGRATOR.run(pool).await
//! # }
//! ```

pub mod error;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod variant;

pub use error::{StoreError, StoreResult};
pub use inventory::InventoryRepository;
pub use order::OrderRepository;
pub use payment::PaymentRepository;
pub use variant::VariantRepository;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
