/// Configuration management for Session Service
///
/// Loads configuration from environment variables.
use anyhow::{bail, Context, Result};
use resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Store configuration
    pub store: StoreConfig,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Compare-and-swap retry budget
    pub cas: CasConfig,
    /// Domain defaults
    pub session: SessionConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port
    pub http_port: u16,
    /// Emit JSON logs
    pub json_logs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis URL for the redis backend
    pub redis_url: Option<String>,
    /// Key prefix for the redis backend
    pub key_prefix: String,
    /// Deadline for every store call
    pub timeout_ms: u64,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis URL; absent means local-only caching
    pub redis_url: Option<String>,
    pub ttl_secs: u64,
}

/// Compare-and-swap retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CasConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// Domain defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capacity used when a create request names none
    pub default_capacity: u32,
    /// TTL for cached resource snapshots and leaderboards
    pub cache_ttl_secs: u64,
}

// Default values
fn default_capacity() -> u32 {
    250
}

fn default_store_timeout_ms() -> u64 {
    resilience::presets::store_config().timeout.duration.as_millis() as u64
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for CasConfig {
    fn default() -> Self {
        let preset = resilience::presets::cas_config().retry;
        Self {
            max_attempts: preset.max_attempts,
            initial_backoff_ms: preset.initial_backoff.as_millis() as u64,
            max_backoff_ms: preset.max_backoff.as_millis() as u64,
        }
    }
}

impl CasConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..Default::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_capacity: default_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_parse("PORT").unwrap_or(8080),
            json_logs: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        let backend = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StoreBackend::Memory,
            "redis" => StoreBackend::Redis,
            other => bail!("unsupported STORE_BACKEND: {}", other),
        };

        let store = StoreConfig {
            backend,
            redis_url: std::env::var("STORE_REDIS_URL").ok(),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or_else(|_| "session".to_string()),
            timeout_ms: env_parse("STORE_TIMEOUT_MS").unwrap_or_else(default_store_timeout_ms),
        };

        if store.backend == StoreBackend::Redis && store.redis_url.is_none() {
            bail!("STORE_REDIS_URL environment variable not set");
        }

        let cache_ttl_secs = env_parse("CACHE_TTL_SECS").unwrap_or_else(default_cache_ttl_secs);
        let cache = CacheConfig {
            redis_url: std::env::var("REDIS_URL").ok(),
            ttl_secs: cache_ttl_secs,
        };

        let defaults = CasConfig::default();
        let cas = CasConfig {
            max_attempts: env_parse("CAS_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            initial_backoff_ms: env_parse("CAS_INITIAL_BACKOFF_MS")
                .unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: env_parse("CAS_MAX_BACKOFF_MS").unwrap_or(defaults.max_backoff_ms),
        };

        let default_capacity = env_parse("DEFAULT_CAPACITY").unwrap_or_else(default_capacity);
        if default_capacity == 0 {
            bail!("DEFAULT_CAPACITY must be greater than zero");
        }
        let session = SessionConfig {
            default_capacity,
            cache_ttl_secs,
        };

        let config = Config {
            app,
            store,
            cache,
            cas,
            session,
        };
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cas.max_attempts == 0 {
            bail!("CAS_MAX_ATTEMPTS must be at least 1");
        }
        if self.store.timeout_ms == 0 {
            bail!("STORE_TIMEOUT_MS must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        std::env::remove_var("STORE_BACKEND");
        std::env::remove_var("DEFAULT_CAPACITY");
        std::env::remove_var("CAS_MAX_ATTEMPTS");

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.host, "0.0.0.0");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.timeout(), Duration::from_millis(2000));
        assert_eq!(config.session.default_capacity, 250);
        assert_eq!(config.cas.max_attempts, 5);
    }

    #[test]
    fn test_cas_retry_config() {
        let retry = CasConfig::default().retry_config();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_backoff, Duration::from_millis(10));
        assert_eq!(retry.max_backoff, Duration::from_millis(200));
        assert!(retry.jitter);
    }
}
