//! Session cache-aside layer
//!
//! Read-through caching for hot session reads with:
//! - An optional external backend (Redis) behind the [`CacheBackend`] trait
//! - An in-process [`LocalCache`] that every write also populates, so a
//!   backend outage degrades to local hits instead of errors
//! - Versioned key schema and Prometheus metrics
//!
//! No operation here returns an error to callers: backend failures are logged,
//! counted and absorbed.

mod error;
mod keys;
mod local;
mod metrics;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};
pub use local::LocalCache;
pub use metrics::CacheMetrics;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// Default TTL values (seconds)
pub mod ttl {
    pub const RESOURCE: u64 = 300; // 5 minutes
    pub const ACTIVE_COUNT: u64 = 30;
    pub const LEADERBOARD: u64 = 60;
    /// Upper bound for entries held only in the local fallback
    pub const LOCAL_MAX: u64 = 30;
}

/// External cache backend contract
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set_raw(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()>;

    async fn del(&self, key: &str) -> CacheResult<()>;
}

/// Redis implementation of [`CacheBackend`]
#[derive(Clone)]
pub struct RedisCacheBackend {
    redis: SharedRedis,
}

impl RedisCacheBackend {
    pub fn new(redis: SharedRedis) -> Self {
        Self { redis }
    }

    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(Arc::new(Mutex::new(manager))))
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get_raw(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.redis.lock().await;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

/// Cache-aside facade used by the session services
#[derive(Clone)]
pub struct SessionCache {
    remote: Option<Arc<dyn CacheBackend>>,
    local: Arc<LocalCache>,
    local_max_ttl: Duration,
    metrics: CacheMetrics,
}

impl SessionCache {
    pub fn new(remote: Arc<dyn CacheBackend>) -> Self {
        Self {
            remote: Some(remote),
            local: Arc::new(LocalCache::new()),
            local_max_ttl: Duration::from_secs(ttl::LOCAL_MAX),
            metrics: CacheMetrics::new(),
        }
    }

    /// Cache with no external backend; every read is served locally
    pub fn local_only() -> Self {
        Self {
            remote: None,
            local: Arc::new(LocalCache::new()),
            local_max_ttl: Duration::from_secs(ttl::LOCAL_MAX),
            metrics: CacheMetrics::new(),
        }
    }

    /// Override the cap on local entry lifetime
    pub fn with_local_max_ttl(mut self, local_max_ttl: Duration) -> Self {
        self.local_max_ttl = local_max_ttl;
        self
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    /// Add jitter to TTL to prevent thundering herd
    fn add_jitter(ttl_secs: u64) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (ttl_secs as f64 * jitter_percent).round() as u64;
        ttl_secs + jitter
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, data: &str) -> Option<T> {
        match serde_json::from_str::<T>(data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache deserialization failed");
                self.metrics.record_error(key, "deserialize");
                None
            }
        }
    }

    /// Read a value from the external backend, or from the local fallback
    /// when the backend cannot be reached
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(remote) = &self.remote {
            match remote.get_raw(key).await {
                Ok(Some(data)) => match self.decode(key, &data) {
                    Some(value) => {
                        debug!(key = %key, "Cache hit");
                        self.metrics.record_hit(key);
                        return Some(value);
                    }
                    None => {
                        // Corrupted entry, drop it everywhere
                        if let Err(e) = remote.del(key).await {
                            warn!(key = %key, error = %e, "Failed to drop corrupted cache entry");
                            self.metrics.record_error(key, "backend");
                        }
                        self.local.remove(key);
                        return None;
                    }
                },
                Ok(None) => {
                    // Another process may have invalidated the key; the local
                    // copy is only trusted while the backend is unreachable
                    self.local.remove(key);
                    debug!(key = %key, "Cache miss");
                    self.metrics.record_miss(key);
                    return None;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache backend read failed, using local fallback");
                    self.metrics.record_error(key, "backend");
                }
            }
        }

        match self.local.get(key) {
            Some(data) => {
                let value = self.decode(key, &data);
                if value.is_some() {
                    debug!(key = %key, "Local cache hit");
                    self.metrics.record_fallback_hit(key);
                } else {
                    self.local.remove(key);
                }
                value
            }
            None => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss(key);
                None
            }
        }
    }

    /// Store a value in the local fallback and, best effort, in the backend
    pub async fn write<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache serialization failed");
                self.metrics.record_error(key, "serialize");
                return;
            }
        };

        let local_ttl = Duration::from_secs(ttl_secs).min(self.local_max_ttl);
        self.local.set(key, data.clone(), local_ttl);

        if let Some(remote) = &self.remote {
            let ttl_with_jitter = Self::add_jitter(ttl_secs);
            if let Err(e) = remote.set_raw(key, &data, ttl_with_jitter).await {
                warn!(key = %key, error = %e, "Cache backend write failed");
                self.metrics.record_error(key, "backend");
                return;
            }
            debug!(key = %key, ttl = ttl_with_jitter, "Cache set");
        }
        self.metrics.record_write(key);
    }

    /// Drop a key from both tiers
    pub async fn invalidate(&self, key: &str) {
        self.local.remove(key);
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.del(key).await {
                warn!(key = %key, error = %e, "Cache backend invalidation failed");
                self.metrics.record_error(key, "backend");
            }
        }
        debug!(key = %key, "Cache invalidate");
        self.metrics.record_invalidation(key);
    }

    /// Cache-aside read: on miss, run `loader` and cache what it returns
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        loader: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(value) = self.read(key).await {
            return Ok(Some(value));
        }

        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.write(key, value, ttl_secs).await;
        }
        Ok(loaded)
    }
}
