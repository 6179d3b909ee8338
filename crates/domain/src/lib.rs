//! Domain types shared by every crate that reads or writes commerce state:
//! orders, inventory reservations, payments, and task-queue jobs.
//!
//! These are plain data types. Lifecycle rules (which transitions are legal,
//! which fields get recomputed) live in `order-engine`, `inventory-engine`
//! and `payment-coordinator`; this crate only defines the shapes and the
//! invariants that can be checked without a database round trip.

pub mod inventory;
pub mod job;
pub mod order;
pub mod payment;
pub mod variant;

pub use inventory::{InventoryReservation, ReservationState};
pub use job::{Job, JobState};
pub use order::{Order, OrderItem, OrderStatus};
pub use payment::{Payment, PaymentStatus};
pub use variant::ProductVariant;
