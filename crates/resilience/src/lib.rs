/// Resilience patterns shared by every outbound call the workers make:
/// stream broker writes, payment provider calls, and database access.
///
/// - **Circuit Breaker**: fails fast once an error threshold is reached
/// - **Timeout**: enforces a time limit on a future
/// - **Retry**: exponential backoff with jitter for transient failures
/// - **Preset Configurations**: pre-tuned bundles per call type
///
/// # Example
///
/// ```rust,no_run
/// use resilience::{presets, CircuitBreaker};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::stream_broker_config();
///     let circuit_breaker = CircuitBreaker::new(config.circuit_breaker);
///
///     let result = circuit_breaker.call(|| async {
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```

pub mod circuit_breaker;
pub mod metrics;
pub mod presets;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
pub use presets::{
    database_config, http_external_config, payment_provider_config, redis_config,
    stream_broker_config, ServiceConfig,
};
pub use retry::{RetryConfig, RetryError, with_retry};
pub use timeout::{TimeoutConfig, TimeoutError, with_timeout, with_timeout_result};
