/// Preset configurations for store-facing call paths
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a call path
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub retry: RetryConfig,
}

/// Compare-and-swap loops (admission, ledger aggregates)
///
/// - Timeout: 2s per store call
/// - Retry: 5 attempts, 10ms doubling to 200ms, jittered so contending
///   writers spread out
pub fn cas_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig::from_millis(2_000),
        retry: RetryConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            jitter: true,
        },
    }
}

/// Plain store reads and idempotent writes
///
/// - Timeout: 2s
/// - Retry: 3 attempts, short backoff
pub fn store_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig::from_millis(2_000),
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: true,
        },
    }
}
