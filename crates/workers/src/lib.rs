//! Background workers that drain the task queue, the outbox's downstream
//! topics and the inventory TTL clock. `commerce-server` is the only binary
//! that spawns these; every function here is a self-contained
//! claim-process-ack loop that can be unit-tested with the in-memory fakes
//! the collaborator crates already provide.

pub mod dlq;
pub mod monitoring;
pub mod order_cancellation_release;
pub mod reconciliation;
pub mod search_indexing;
pub mod webhook_retry;

pub use dlq::{DlqError, DlqHandler};
pub use monitoring::{AlwaysHealthyBroker, BrokerProbe, HealthMonitor, HealthReport};
pub use order_cancellation_release::OrderCancellationReleaseConsumer;
pub use search_indexing::{SearchIndex, SearchIndexingWorker};
