//! Convenience macros for writing an outbox event inside a transaction.

/// Build an [`event_schema::EventEnvelope`] and write it to the outbox.
///
/// # Usage
///
/// ```rust,no_run
/// use transactional_outbox::{publish_event, SqlxOutboxRepository};
/// use sqlx::PgPool;
/// use uuid::Uuid;
/// use serde_json::json;
///
/// # async fn example(pool: PgPool, repo: SqlxOutboxRepository) -> Result<(), Box<dyn std::error::Error>> {
/// let mut tx = pool.begin().await?;
/// let order_id = Uuid::new_v4();
///
/// sqlx::query("INSERT INTO orders (id) VALUES ($1)")
///     .bind(order_id)
///     .execute(&mut *tx)
///     .await?;
///
/// publish_event!(
///     &mut tx,
///     &repo,
///     "order-engine",
///     "order.created",
///     json!({ "order_id": order_id })
/// );
///
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
///
/// # Arguments
///
/// * `$tx` - Mutable reference to the active database transaction
/// * `$repo` - Reference to an [`OutboxRepository`](crate::OutboxRepository) implementation
/// * `$source` - Name of the component emitting the event
/// * `$event_type` - Fully qualified event type, e.g. `"order.created"`
/// * `$payload` - JSON-serializable payload
#[macro_export]
macro_rules! publish_event {
    ($tx:expr, $repo:expr, $source:expr, $event_type:expr, $payload:expr) => {{
        use $crate::OutboxRepository;

        let envelope = event_schema::EventEnvelope::new($event_type, $source, $payload);
        let topic = event_schema::topic_of($event_type);
        $repo.write_event($tx, topic, &envelope).await
    }};
}

#[cfg(test)]
mod tests {
    // Macro tests are compile-time checks; if this file compiles the macro
    // expands correctly.
}
