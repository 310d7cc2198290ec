/// Resilience patterns for the session backend
///
/// This library provides the two primitives every store-facing path relies on:
/// - **Retry**: bounded attempts with exponential backoff and jitter, with a
///   predicate deciding which failures are transient
/// - **Timeout**: enforces a caller-supplied deadline on every external call
/// - **Preset Configurations**: pre-tuned settings for CAS loops and store calls
///
/// # Example: CAS loop with bounded retry
///
/// ```rust,no_run
/// use resilience::{presets, retry::with_retry_if};
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::cas_config();
///
///     let result = with_retry_if(
///         config.retry,
///         |e: &String| e == "conflict",
///         || async {
///             // read, decide, conditional write
///             Ok::<_, String>(())
///         },
///     )
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod presets;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use presets::{cas_config, store_config, ServiceConfig};
pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutConfig, TimeoutError};
